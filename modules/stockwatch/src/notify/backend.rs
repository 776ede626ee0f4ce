use std::sync::Arc;

use async_trait::async_trait;

/// Pluggable outbound message transport.
#[async_trait]
pub trait NotifyBackend: Send + Sync {
    /// Deliver one already-formatted message.
    async fn send(&self, text: &str) -> anyhow::Result<()>;
}

#[async_trait]
impl<B: NotifyBackend + ?Sized> NotifyBackend for Arc<B> {
    async fn send(&self, text: &str) -> anyhow::Result<()> {
        (**self).send(text).await
    }
}
