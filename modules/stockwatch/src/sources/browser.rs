//! Storefront scraping through a headless browser (Browserless).
//!
//! The search page is rendered remotely and the returned DOM is parsed with CSS
//! selectors. Delivery location (pincode) is not applied in this mode; the
//! storefront serves its default location.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use browserless_client::{BrowserlessClient, BrowserlessError, ContentRequest};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use stockwatch_common::{Product, SourceError};

use super::ProductSource;

const RENDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a store's search page lives and how its product cards look by default.
#[derive(Debug, Clone, Copy)]
pub struct BrowserProfile {
    pub store: &'static str,
    pub origin: &'static str,
    /// Search page with a `{QUERY}` placeholder.
    pub search_url: &'static str,
    pub default_selectors: &'static [(&'static str, &'static str)],
}

const BLINKIT: BrowserProfile = BrowserProfile {
    store: "Blinkit",
    origin: "https://blinkit.com",
    search_url: "https://blinkit.com/s/?q={QUERY}",
    default_selectors: &[
        ("product_card", "div[data-testid='plp-product'], a[data-testid='plp-product']"),
        ("product_title", "div[class*='Product__ProductName'], div[class*='product-name']"),
        ("add_button", "div[class*='AddToCart'], button[class*='add']"),
        ("out_of_stock_badge", "div[class*='OutOfStock'], div[class*='out-of-stock']"),
        ("link", "a[href]"),
    ],
};

const SWIGGY: BrowserProfile = BrowserProfile {
    store: "Swiggy",
    origin: "https://www.swiggy.com",
    search_url: "https://www.swiggy.com/instamart/search?query={QUERY}",
    default_selectors: &[
        ("product_card", "div[data-testid='default_container_ux4'], div[data-testid='item-card']"),
        ("product_title", "div[class*='novMV'], div[class*='item-name']"),
        ("add_button", "button[data-testid='add-button'], div[class*='AddButton']"),
        ("out_of_stock_badge", "div[class*='sold-out'], div[class*='SoldOut']"),
        ("link", "a[href]"),
    ],
};

impl BrowserProfile {
    pub fn for_store(name: &str) -> Option<Self> {
        [BLINKIT, SWIGGY].into_iter().find(|p| p.store == name)
    }

    fn search_page(&self, term: &str) -> String {
        let query: String = url::form_urlencoded::byte_serialize(term.as_bytes()).collect();
        self.search_url.replace("{QUERY}", &query)
    }
}

/// Compiled card selectors. `price` and `out_of_stock_badge` are optional roles.
#[derive(Debug)]
pub struct Selectors {
    card: Selector,
    title: Selector,
    add_button: Selector,
    out_of_stock: Option<Selector>,
    price: Option<Selector>,
    link: Selector,
}

impl Selectors {
    /// Merge `overrides` over `defaults` and compile every role.
    pub fn build(
        defaults: &[(&str, &str)],
        overrides: &BTreeMap<String, String>,
    ) -> Result<Self, SourceError> {
        let mut roles: BTreeMap<&str, &str> = defaults.iter().copied().collect();
        for (role, css) in overrides {
            roles.insert(role.as_str(), css.as_str());
        }

        let required = |role: &str| -> Result<Selector, SourceError> {
            let css = roles
                .get(role)
                .ok_or_else(|| SourceError::Browser(format!("missing '{role}' selector")))?;
            compile(role, css)
        };
        let optional = |role: &str| -> Result<Option<Selector>, SourceError> {
            roles.get(role).map(|css| compile(role, css)).transpose()
        };

        Ok(Self {
            card: required("product_card")?,
            title: required("product_title")?,
            add_button: required("add_button")?,
            out_of_stock: optional("out_of_stock_badge")?,
            price: optional("price")?,
            link: optional("link")?.map_or_else(|| compile("link", "a[href]"), Ok)?,
        })
    }
}

fn compile(role: &str, css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css)
        .map_err(|e| SourceError::Browser(format!("invalid '{role}' selector '{css}': {e:?}")))
}

pub struct BrowserSource {
    profile: BrowserProfile,
    selectors: Selectors,
    origin: Url,
    client: BrowserlessClient,
}

impl BrowserSource {
    pub fn new(
        profile: BrowserProfile,
        browserless_url: &str,
        browserless_token: Option<&str>,
        selector_overrides: &BTreeMap<String, String>,
    ) -> Result<Self, SourceError> {
        let selectors = Selectors::build(profile.default_selectors, selector_overrides)?;
        let origin = Url::parse(profile.origin)
            .map_err(|e| SourceError::Parse(format!("invalid origin {}: {e}", profile.origin)))?;
        let client =
            BrowserlessClient::with_timeout(browserless_url, browserless_token, RENDER_TIMEOUT)
                .map_err(map_browserless)?;

        Ok(Self {
            profile,
            selectors,
            origin,
            client,
        })
    }
}

#[async_trait]
impl ProductSource for BrowserSource {
    async fn search(&self, terms: &[String]) -> Result<Vec<Product>, SourceError> {
        let mut products = Vec::new();
        for term in terms {
            let request =
                ContentRequest::new(&self.profile.search_page(term)).wait_until("networkidle2");
            let html = self.client.render(&request).await.map_err(map_browserless)?;

            let found = parse_cards(&html, term, &self.selectors, &self.origin);
            debug!(
                store = self.profile.store,
                term = term.as_str(),
                count = found.len(),
                "Parsed product cards"
            );
            products.extend(found);
        }
        Ok(products)
    }

    fn kind(&self) -> &'static str {
        "browser"
    }
}

fn map_browserless(err: BrowserlessError) -> SourceError {
    match err {
        BrowserlessError::Timeout => SourceError::Timeout(RENDER_TIMEOUT.as_secs()),
        other => SourceError::Browser(other.to_string()),
    }
}

/// Parse product cards from rendered HTML, keeping cards whose title contains
/// every word of `term`.
pub fn parse_cards(html: &str, term: &str, selectors: &Selectors, origin: &Url) -> Vec<Product> {
    let document = Html::parse_document(html);
    let words: Vec<String> = term.to_lowercase().split_whitespace().map(String::from).collect();

    let mut products = Vec::new();
    for card in document.select(&selectors.card) {
        let title = card
            .select(&selectors.title)
            .next()
            .map(element_text)
            .unwrap_or_default();
        let lower = title.to_lowercase();
        if title.is_empty() || !words.iter().all(|w| lower.contains(w.as_str())) {
            continue;
        }

        let has_add = card.select(&selectors.add_button).next().is_some();
        let sold_out = selectors
            .out_of_stock
            .as_ref()
            .is_some_and(|s| card.select(s).next().is_some());

        let href = card
            .select(&selectors.link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(|h| origin.join(h).map(|u| u.to_string()).unwrap_or_else(|_| h.to_string()))
            .unwrap_or_default();

        let price = selectors
            .price
            .as_ref()
            .and_then(|s| card.select(s).next())
            .map(element_text)
            .filter(|p| !p.is_empty())
            .or_else(|| {
                card.text()
                    .map(str::trim)
                    .find(|t| t.contains('₹'))
                    .map(String::from)
            })
            .unwrap_or_default();

        let id = if href.is_empty() { title.clone() } else { href.clone() };
        products.push(
            Product::new(id, title)
                .with_price(price)
                .with_url(href)
                .in_stock(has_add && !sold_out),
        );
    }
    products
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}
