use std::fmt;

/// One catalog item as a store reported it during a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    /// Unique within its source only.
    pub id: String,
    pub name: String,
    /// Free-form, e.g. "₹349". Empty when the store did not report one.
    pub price: String,
    pub in_stock: bool,
    pub url: String,
}

impl Product {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price: String::new(),
            in_stock: false,
            url: String::new(),
        }
    }

    pub fn with_price(mut self, price: impl Into<String>) -> Self {
        self.price = price.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn in_stock(mut self, in_stock: bool) -> Self {
        self.in_stock = in_stock;
        self
    }
}

/// `"{source}:{id}"`: globally unique where the bare product id is not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn new(source: &str, product_id: &str) -> Self {
        Self(format!("{source}:{product_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DedupKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_key_prefixes_source() {
        let key = DedupKey::new("Blinkit", "sku-1");
        assert_eq!(key.as_str(), "Blinkit:sku-1");
        assert_ne!(key, DedupKey::new("Zepto", "sku-1"));
    }

    #[test]
    fn product_builder_defaults_out_of_stock() {
        let p = Product::new("1", "Hot Wheels Bone Shaker");
        assert!(!p.in_stock);
        assert!(p.price.is_empty());
        let p = p.in_stock(true).with_price("₹179").with_url("https://x.test/p/1");
        assert!(p.in_stock);
        assert_eq!(p.price, "₹179");
    }
}
