//! Generic JSON search endpoint adapter.
//!
//! The endpoint is a URL template with `{PINCODE}` and `{QUERY}` placeholders.
//! Response shapes differ between stores, so product fields are pulled out
//! defensively from a handful of common key names.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use stockwatch_common::{Product, SourceError, StoreConfig};

use super::user_agent::random_user_agent;
use super::ProductSource;

const BODY_SNIPPET_CHARS: usize = 400;

pub struct HttpApiSource {
    name: String,
    url_template: String,
    pincode: String,
    headers: HeaderMap,
    timeout: Duration,
    http: reqwest::Client,
}

impl HttpApiSource {
    pub fn new(
        name: &str,
        url_template: &str,
        pincode: &str,
        headers: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        // Catch a broken template at startup rather than on every poll.
        Url::parse(&expand(url_template, pincode, "probe"))
            .map_err(|e| SourceError::Parse(format!("invalid API URL template for {name}: {e}")))?;

        let mut header_map = HeaderMap::new();
        for (key, value) in headers {
            let header_name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| SourceError::Parse(format!("invalid header name '{key}': {e}")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| SourceError::Parse(format!("invalid value for header '{key}': {e}")))?;
            header_map.insert(header_name, header_value);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            url_template: url_template.to_string(),
            pincode: pincode.to_string(),
            headers: header_map,
            timeout,
            http,
        })
    }

    pub fn from_store(
        store: &StoreConfig,
        pincode: &str,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let template = store.api_url.as_deref().ok_or_else(|| {
            SourceError::Parse(format!("{} has no API URL configured", store.name))
        })?;
        Self::new(&store.name, template, pincode, &store.headers, timeout)
    }

    async fn search_term(&self, term: &str) -> Result<Vec<Product>, SourceError> {
        let url = expand(&self.url_template, &self.pincode, term);

        let mut request = self.http.get(&url).headers(self.headers.clone());
        if !self.headers.contains_key(USER_AGENT) {
            request = request.header(USER_AGENT, random_user_agent());
        }

        let resp = request.send().await.map_err(|e| self.map_err(e))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| self.map_err(e))?;

        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                body: snippet(&text),
            });
        }

        let body: Value = serde_json::from_str(&text).map_err(|_| {
            SourceError::Parse(format!(
                "Failed parsing JSON. Status={}, Body={}",
                status.as_u16(),
                snippet(&text)
            ))
        })?;

        let base = Url::parse(&url).ok();
        let products = extract_products(&body, base.as_ref());
        debug!(store = self.name.as_str(), term, count = products.len(), "API search complete");
        Ok(products)
    }

    fn map_err(&self, err: reqwest::Error) -> SourceError {
        if err.is_timeout() {
            SourceError::Timeout(self.timeout.as_secs())
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl ProductSource for HttpApiSource {
    async fn search(&self, terms: &[String]) -> Result<Vec<Product>, SourceError> {
        let mut products = Vec::new();
        for term in terms {
            match self.search_term(term).await {
                Ok(found) => products.extend(found),
                Err(e) => {
                    warn!(
                        store = self.name.as_str(),
                        term = term.as_str(),
                        error = %e,
                        "API search failed"
                    );
                    return Err(e);
                }
            }
        }
        Ok(products)
    }

    fn kind(&self) -> &'static str {
        "api"
    }
}

fn expand(template: &str, pincode: &str, query: &str) -> String {
    let encode = |s: &str| url::form_urlencoded::byte_serialize(s.as_bytes()).collect::<String>();
    template
        .replace("{PINCODE}", &encode(pincode))
        .replace("{QUERY}", &encode(query))
}

fn snippet(text: &str) -> String {
    text.chars().take(BODY_SNIPPET_CHARS).collect()
}

/// Pull products out of an arbitrary search response.
pub fn extract_products(body: &Value, base: Option<&Url>) -> Vec<Product> {
    let items = match body {
        Value::Array(items) => items.as_slice(),
        Value::Object(_) => ["products", "data", "items"]
            .iter()
            .filter_map(|key| body.get(key))
            .find(|v| truthy(v))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };

    items.iter().filter_map(|item| extract_product(item, base)).collect()
}

fn extract_product(item: &Value, base: Option<&Url>) -> Option<Product> {
    if !item.is_object() {
        return None;
    }

    let title = first_truthy(item, &["name", "title"]).and_then(text)?;

    let in_stock = first_truthy(item, &["in_stock", "available", "is_available"])
        .or_else(|| {
            item.get("inventory")
                .and_then(|inv| inv.get("available"))
                .filter(|v| truthy(v))
        })
        .is_some();

    let price = first_truthy(item, &["price", "mrp", "final_price"])
        .and_then(text)
        .unwrap_or_default();

    let id = first_truthy(item, &["id", "sku"])
        .and_then(text)
        .unwrap_or_else(|| title.clone());

    let url = first_truthy(item, &["url", "product_url"])
        .and_then(Value::as_str)
        .map(|raw| resolve(raw, base))
        .unwrap_or_default();

    Some(
        Product::new(id, title)
            .with_price(price)
            .with_url(url)
            .in_stock(in_stock),
    )
}

fn first_truthy<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|key| item.get(key)).find(|v| truthy(v))
}

/// Loose truthiness: null, false, zero and empty values count as absent.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn resolve(raw: &str, base: Option<&Url>) -> String {
    match Url::parse(raw) {
        Ok(url) => url.to_string(),
        Err(_) => base
            .and_then(|b| b.join(raw).ok())
            .map(|u| u.to_string())
            .unwrap_or_else(|| raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(server: &MockServer, headers: &[(&str, &str)]) -> HttpApiSource {
        let headers = headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        HttpApiSource::new(
            "Zepto",
            &format!("{}/search?q={{QUERY}}&pin={{PINCODE}}", server.uri()),
            "560001",
            &headers,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn extracts_from_alternate_keys() {
        let body = json!({
            "data": [
                { "title": "Bone Shaker", "sku": "HW-1", "available": true, "mrp": 179, "product_url": "/p/hw-1" },
                { "name": "Twin Mill", "inventory": { "available": 1 }, "final_price": "₹199" },
                { "price": 10 },
                "not an object"
            ]
        });
        let base = Url::parse("https://shop.test/api/search?q=x").unwrap();
        let products = extract_products(&body, Some(&base));

        assert_eq!(products.len(), 2, "untitled and non-object items are skipped");
        assert_eq!(products[0].id, "HW-1");
        assert_eq!(products[0].price, "179");
        assert_eq!(products[0].url, "https://shop.test/p/hw-1");
        assert!(products[0].in_stock);

        assert_eq!(products[1].id, "Twin Mill", "id falls back to title");
        assert_eq!(products[1].price, "₹199");
        assert!(products[1].in_stock);
        assert!(products[1].url.is_empty());
    }

    #[test]
    fn empty_products_key_falls_through_to_items() {
        let body = json!({ "products": [], "items": [{ "name": "Deora", "in_stock": false }] });
        let products = extract_products(&body, None);
        assert_eq!(products.len(), 1);
        assert!(!products[0].in_stock);
    }

    #[test]
    fn top_level_array_and_scalars() {
        assert_eq!(extract_products(&json!([{ "name": "A", "id": 7 }]), None)[0].id, "7");
        assert!(extract_products(&json!("nope"), None).is_empty());
        assert!(extract_products(&json!({ "products": { "not": "a list" } }), None).is_empty());
    }

    #[test]
    fn rejects_unparseable_template() {
        let err = HttpApiSource::new(
            "X",
            "not a url {QUERY}",
            "",
            &BTreeMap::new(),
            Duration::from_secs(1),
        );
        assert!(matches!(err, Err(SourceError::Parse(_))));
    }

    #[tokio::test]
    async fn queries_each_term_with_encoded_placeholders() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "hot wheels"))
            .and(query_param("pin", "560001"))
            .and(header_exists("user-agent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "products": [{ "id": "1", "name": "Hot Wheels Bone Shaker", "in_stock": true, "price": "₹179" }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "matchbox"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{ "sku": "m-2", "title": "Matchbox Jeep", "is_available": false }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let products = source(&server, &[])
            .search(&["hot wheels".to_string(), "matchbox".to_string()])
            .await
            .unwrap();

        assert_eq!(products.len(), 2);
        assert_eq!(products[0].name, "Hot Wheels Bone Shaker");
        assert!(products[0].in_stock);
        assert_eq!(products[1].id, "m-2");
        assert!(!products[1].in_stock);
    }

    #[tokio::test]
    async fn configured_headers_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("x-store-id", "42"))
            .and(header("user-agent", "stockwatch-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "products": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let products = source(&server, &[("X-Store-Id", "42"), ("User-Agent", "stockwatch-test")])
            .search(&["cars".to_string()])
            .await
            .unwrap();
        assert!(products.is_empty());
    }

    #[tokio::test]
    async fn non_json_body_is_parse_error_with_snippet() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>captcha</html>"))
            .mount(&server)
            .await;

        match source(&server, &[]).search(&["cars".to_string()]).await {
            Err(SourceError::Parse(msg)) => {
                assert!(msg.contains("Status=200"));
                assert!(msg.contains("<html>captcha</html>"));
            }
            other => panic!("expected Parse error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_status_is_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("x".repeat(1000)))
            .mount(&server)
            .await;

        match source(&server, &[]).search(&["cars".to_string()]).await {
            Err(SourceError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body.len(), BODY_SNIPPET_CHARS);
            }
            other => panic!("expected Status error, got {other:?}"),
        }
    }
}
