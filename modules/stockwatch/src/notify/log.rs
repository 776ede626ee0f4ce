use async_trait::async_trait;
use tracing::info;

use super::backend::NotifyBackend;

/// Writes messages to the log instead of sending them. Used by `--dry-run`.
pub struct LogBackend;

#[async_trait]
impl NotifyBackend for LogBackend {
    async fn send(&self, text: &str) -> anyhow::Result<()> {
        info!(chars = text.chars().count(), "Dry-run message:\n{text}");
        Ok(())
    }
}
