use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};

use stockwatch_common::{Config, StockwatchError};

use crate::cycle::StockMonitor;
use crate::notify::format::{truncate, FATAL_ERROR_CHARS};
use crate::notify::{LogBackend, Notifier, NotifyBackend, TelegramBackend};
use crate::scheduler::{Scheduler, SchedulerStats};
use crate::sources::build_registry;
use crate::store::SqliteSeenStore;

/// Pick the outbound transport. `dry_run` logs instead of sending.
pub fn build_backend(
    config: &Config,
    dry_run: bool,
) -> Result<Box<dyn NotifyBackend>, StockwatchError> {
    if dry_run {
        info!("Dry run: messages will be logged, not sent");
        return Ok(Box::new(LogBackend));
    }
    Ok(Box::new(TelegramBackend::from_config(config)?))
}

/// Fully wired monitor: transport, seen-store, sources, scheduler.
pub struct App {
    notifier: Arc<Notifier>,
    monitor: StockMonitor,
    scheduler: Scheduler,
}

impl App {
    /// Wire everything from `config`. A transport that cannot be built is fatal
    /// before anything else happens; later startup failures are also reported
    /// through the transport.
    pub async fn build(config: &Config, dry_run: bool) -> Result<Self> {
        let notifier = Arc::new(Notifier::new(build_backend(config, dry_run)?));
        Self::with_notifier(config, notifier).await
    }

    pub async fn with_notifier(config: &Config, notifier: Arc<Notifier>) -> Result<Self> {
        match Self::wire(config, notifier.clone()).await {
            Ok(app) => Ok(app),
            Err(e) => {
                error!(error = format!("{e:#}"), "Startup failed");
                notifier
                    .send_error(&truncate(&format!("Fatal error: {e:#}"), FATAL_ERROR_CHARS))
                    .await;
                Err(e)
            }
        }
    }

    async fn wire(config: &Config, notifier: Arc<Notifier>) -> Result<Self> {
        let seen = SqliteSeenStore::open(&config.seen_db_path, config.seen_ttl).await?;

        let registry = build_registry(config);
        if registry.is_empty() {
            warn!("No sources registered; configure <STORE>_API_URL or BROWSERLESS_URL");
        } else {
            info!(sources = ?registry.names(), "Sources registered");
        }

        let monitor = StockMonitor::new(
            registry,
            Arc::new(seen),
            notifier.clone(),
            config.search_terms.clone(),
        )?
        .with_source_timeout(config.source_timeout);

        Ok(Self {
            notifier,
            monitor,
            scheduler: Scheduler::new(config.poll_interval),
        })
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn monitor(&self) -> &StockMonitor {
        &self.monitor
    }

    /// Announce startup, poll until `shutdown` resolves, announce the stop.
    pub async fn run_until<F>(&self, shutdown: F) -> SchedulerStats
    where
        F: Future<Output = ()>,
    {
        self.notifier.send_startup().await;
        info!(
            interval_secs = self.scheduler.interval().as_secs(),
            sources = self.monitor.sources().len(),
            "Monitor started"
        );

        let stats = self.scheduler.run_until(&self.monitor, shutdown).await;

        self.notifier.send_stopped().await;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingBackend;
    use std::collections::HashMap;
    use std::time::Duration;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(move |key: &str| map.get(key).cloned()).unwrap()
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_anything_runs() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("seen.db");
        let db_str = db.to_string_lossy().to_string();

        let result = App::build(&config(&[("SEEN_DB_PATH", db_str.as_str())]), false).await;
        assert!(result.is_err());
        assert!(!db.exists(), "store must not be opened when the transport is missing");
    }

    #[tokio::test]
    async fn dry_run_needs_no_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("seen.db");
        let db_str = db.to_string_lossy().to_string();

        let app = App::build(&config(&[("SEEN_DB_PATH", db_str.as_str())]), true).await.unwrap();
        assert!(app.monitor().sources().is_empty());
        assert!(db.exists());
    }

    #[tokio::test]
    async fn store_failure_is_reported_and_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("missing-dir").join("seen.db");
        let db_str = db.to_string_lossy().to_string();
        let backend = RecordingBackend::new();
        let notifier = Arc::new(Notifier::new(Box::new(backend.clone())));

        let settings = config(&[("SEEN_DB_PATH", db_str.as_str())]);
        let result = App::with_notifier(&settings, notifier).await;
        assert!(result.is_err());

        let sent = backend.messages();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("⚠️ <b>Bot Error</b>\nFatal error:"));
    }

    #[tokio::test]
    async fn run_announces_start_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        let db_str = dir.path().join("seen.db").to_string_lossy().to_string();
        let backend = RecordingBackend::new();
        let notifier = Arc::new(Notifier::new(Box::new(backend.clone())));

        let app = App::with_notifier(&config(&[("SEEN_DB_PATH", db_str.as_str())]), notifier)
            .await
            .unwrap();
        let stats = app.run_until(tokio::time::sleep(Duration::from_millis(50))).await;

        assert_eq!(stats.completed, 1);
        let sent = backend.messages();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].contains("Stock Monitor Bot Started"));
        assert!(sent[1].contains("Bot Stopped"));
    }
}
