pub mod error;

pub use error::{BrowserlessError, Result};

use std::time::Duration;

use serde::Serialize;

/// Default request timeout. Rendering a JS-heavy storefront is slow.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

/// Body for the `/content` endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRequest {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_for_selector: Option<WaitForSelector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goto_options: Option<GotoOptions>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaitForSelector {
    pub selector: String,
    /// Milliseconds.
    pub timeout: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GotoOptions {
    pub wait_until: String,
}

impl ContentRequest {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            wait_for_selector: None,
            goto_options: Some(GotoOptions {
                wait_until: "domcontentloaded".to_string(),
            }),
        }
    }

    /// Navigation event to wait for (`load`, `domcontentloaded`, `networkidle0`, `networkidle2`).
    pub fn wait_until(mut self, event: &str) -> Self {
        self.goto_options = Some(GotoOptions {
            wait_until: event.to_string(),
        });
        self
    }

    /// Wait until `selector` matches before capturing the DOM.
    pub fn wait_for(mut self, selector: &str, timeout: Duration) -> Self {
        self.wait_for_selector = Some(WaitForSelector {
            selector: selector.to_string(),
            timeout: timeout.as_millis() as u64,
        });
        self
    }
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        Self::with_timeout(base_url, token, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        })
    }

    /// Fetch fully-rendered HTML content for a URL via Browserless /content endpoint.
    pub async fn content(&self, url: &str) -> Result<String> {
        self.render(&ContentRequest::new(url)).await
    }

    /// Render a page with explicit wait/goto options.
    pub async fn render(&self, request: &ContentRequest) -> Result<String> {
        let endpoint = format!("{}/content", self.base_url);

        tracing::debug!(url = %request.url, "Rendering page via Browserless");

        let mut builder = self.client.post(&endpoint);
        if let Some(ref token) = self.token {
            builder = builder.query(&[("token", token)]);
        }
        let resp = builder
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }
}
