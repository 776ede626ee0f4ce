//! One poll-and-notify pass across every registered source.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use stockwatch_common::{DedupKey, Product, SourceError, StockwatchError};

use crate::notify::Notifier;
use crate::sources::{ProductSource, SourceRegistry};
use crate::store::SeenStore;

const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(120);

/// Something the scheduler can drive. An `Err` is a bug-class failure and
/// costs one missed cycle; expected source failures never surface here.
#[async_trait]
pub trait Cycle: Send + Sync {
    async fn run_cycle(&self) -> Result<CycleStats>;
}

/// How a single source poll ended.
#[derive(Debug)]
pub enum SourceOutcome {
    Products(Vec<Product>),
    Failed(SourceError),
    TimedOut(Duration),
}

impl SourceOutcome {
    /// Human-readable failure reason, `None` on success.
    pub fn failure(&self) -> Option<String> {
        match self {
            Self::Products(_) => None,
            Self::Failed(e) => Some(e.to_string()),
            Self::TimedOut(after) => Some(format!("no response within {}s", after.as_secs())),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub sources_polled: u32,
    pub sources_failed: u32,
    /// Products returned across all sources.
    pub hits: u32,
    pub in_stock: u32,
    pub fresh: u32,
    pub messages_sent: u32,
    pub messages_failed: u32,
}

impl fmt::Display for CycleStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sources {} ({} failed), hits {}, in stock {}, fresh {}, messages {} ({} failed)",
            self.sources_polled,
            self.sources_failed,
            self.hits,
            self.in_stock,
            self.fresh,
            self.messages_sent,
            self.messages_failed
        )
    }
}

pub struct StockMonitor {
    sources: SourceRegistry,
    seen: Arc<dyn SeenStore>,
    notifier: Arc<Notifier>,
    terms: Vec<String>,
    source_timeout: Duration,
}

impl StockMonitor {
    pub fn new(
        sources: SourceRegistry,
        seen: Arc<dyn SeenStore>,
        notifier: Arc<Notifier>,
        terms: Vec<String>,
    ) -> std::result::Result<Self, StockwatchError> {
        if terms.iter().all(|t| t.trim().is_empty()) {
            return Err(StockwatchError::Config(
                "at least one search term is required".into(),
            ));
        }
        Ok(Self {
            sources,
            seen,
            notifier,
            terms,
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
        })
    }

    /// Upper bound on one source's whole `search` call.
    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    async fn poll(&self, source: &dyn ProductSource) -> SourceOutcome {
        match tokio::time::timeout(self.source_timeout, source.search(&self.terms)).await {
            Ok(Ok(products)) => SourceOutcome::Products(products),
            Ok(Err(e)) => SourceOutcome::Failed(e),
            Err(_) => SourceOutcome::TimedOut(self.source_timeout),
        }
    }

    /// Keep in-stock items not seen before, marking each as seen.
    async fn fresh_items(&self, name: &str, in_stock: Vec<Product>) -> Result<Vec<Product>> {
        let mut fresh = Vec::new();
        for item in in_stock {
            let key = DedupKey::new(name, &item.id);
            if self.seen.already_seen(&key).await? {
                continue;
            }
            self.seen.mark_seen(&key).await?;
            fresh.push(item);
        }
        Ok(fresh)
    }
}

#[async_trait]
impl Cycle for StockMonitor {
    async fn run_cycle(&self) -> Result<CycleStats> {
        let mut stats = CycleStats::default();

        for (name, source) in self.sources.iter() {
            stats.sources_polled += 1;

            let outcome = self.poll(source.as_ref()).await;
            let products = match outcome {
                SourceOutcome::Products(products) => products,
                failed => {
                    stats.sources_failed += 1;
                    let reason = failed.failure().unwrap_or_default();
                    warn!(
                        source = name,
                        kind = source.kind(),
                        error = %reason,
                        "Source check failed"
                    );
                    self.notifier.send_source_error(name, &reason).await;
                    continue;
                }
            };

            let hits = products.len() as u32;
            let in_stock: Vec<Product> = products.into_iter().filter(|p| p.in_stock).collect();
            let in_stock_count = in_stock.len() as u32;
            stats.hits += hits;
            stats.in_stock += in_stock_count;

            let fresh = self.fresh_items(name, in_stock).await?;
            stats.fresh += fresh.len() as u32;
            info!(
                source = name,
                hits,
                in_stock = in_stock_count,
                new = fresh.len(),
                "Source checked"
            );

            if !fresh.is_empty() {
                let delivery = self.notifier.send_products(name, &fresh).await;
                stats.messages_sent += delivery.sent;
                stats.messages_failed += delivery.failed;
            }
        }

        info!(%stats, "Cycle complete");
        Ok(stats)
    }
}
