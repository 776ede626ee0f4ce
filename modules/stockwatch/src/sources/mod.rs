pub mod browser;
pub mod http_api;
pub mod user_agent;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use stockwatch_common::{Config, Product, RunMode, SourceError};

pub use browser::{BrowserProfile, BrowserSource, Selectors};
pub use http_api::HttpApiSource;

/// A store adapter: given search terms, return the store's current product list.
#[async_trait]
pub trait ProductSource: Send + Sync {
    async fn search(&self, terms: &[String]) -> Result<Vec<Product>, SourceError>;

    /// Short adapter label for logs ("api", "browser").
    fn kind(&self) -> &'static str;
}

#[async_trait]
impl<S: ProductSource + ?Sized> ProductSource for Arc<S> {
    async fn search(&self, terms: &[String]) -> Result<Vec<Product>, SourceError> {
        (**self).search(terms).await
    }

    fn kind(&self) -> &'static str {
        (**self).kind()
    }
}

/// Ordered name-to-adapter mapping, built once at startup and immutable afterwards.
/// Iteration order is the per-cycle polling order.
#[derive(Default, Clone)]
pub struct SourceRegistry {
    entries: Vec<(String, Arc<dyn ProductSource>)>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `source` under `name`. A repeated name replaces the earlier adapter in place.
    pub fn register(&mut self, name: impl Into<String>, source: Arc<dyn ProductSource>) {
        let name = name.into();
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = source;
        } else {
            self.entries.push((name, source));
        }
    }

    pub fn with(mut self, name: impl Into<String>, source: impl ProductSource + 'static) -> Self {
        self.register(name, Arc::new(source));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn ProductSource>)> {
        self.entries.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build the registry from configuration.
///
/// Stores with a browser profile (Blinkit, Swiggy) use their API adapter when
/// `RUN_MODE=api` and an endpoint is configured, otherwise the browser adapter.
/// The rest are API-only: registered in `api` mode when an endpoint is configured.
pub fn build_registry(config: &Config) -> SourceRegistry {
    let mut registry = SourceRegistry::new();

    for store in &config.stores {
        let profile = BrowserProfile::for_store(&store.name);
        if config.run_mode == RunMode::Api && store.api_enabled() {
            match HttpApiSource::from_store(store, &config.pincode, config.source_http_timeout) {
                Ok(source) => {
                    info!(store = store.name.as_str(), "Registered API source");
                    registry.register(store.name.clone(), Arc::new(source));
                }
                Err(e) => warn!(store = store.name.as_str(), error = %e, "Skipping API source"),
            }
            continue;
        }

        let Some(profile) = profile else {
            info!(
                store = store.name.as_str(),
                mode = %config.run_mode,
                "No usable adapter, skipping"
            );
            continue;
        };

        let Some(browserless_url) = config.browserless_url.as_deref() else {
            warn!(
                store = store.name.as_str(),
                "Browser adapter needs BROWSERLESS_URL, skipping"
            );
            continue;
        };

        match BrowserSource::new(
            profile,
            browserless_url,
            config.browserless_token.as_deref(),
            &store.selectors,
        ) {
            Ok(source) => {
                info!(store = store.name.as_str(), "Registered browser source");
                registry.register(store.name.clone(), Arc::new(source));
            }
            Err(e) => warn!(store = store.name.as_str(), error = %e, "Skipping browser source"),
        }
    }

    registry
}
