use std::fmt;

use tracing::{info, warn};

use stockwatch_common::Product;

use super::backend::NotifyBackend;
use super::format::{self, MESSAGE_LIMIT, SOURCE_ERROR_CHARS};

/// Result of dispatching one batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub sent: u32,
    pub failed: u32,
}

impl Delivery {
    fn record(&mut self, ok: bool) {
        if ok {
            self.sent += 1;
        } else {
            self.failed += 1;
        }
    }
}

impl fmt::Display for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sent, {} failed", self.sent, self.failed)
    }
}

/// Formats, chunks and sends messages. Transport failures are logged and
/// swallowed here; nothing the transport does can fail the caller.
pub struct Notifier {
    backend: Box<dyn NotifyBackend>,
    limit: usize,
}

impl Notifier {
    pub fn new(backend: Box<dyn NotifyBackend>) -> Self {
        Self {
            backend,
            limit: MESSAGE_LIMIT,
        }
    }

    /// Override the chunk limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Send one message. Returns whether the transport accepted it.
    pub async fn send(&self, text: &str) -> bool {
        match self.backend.send(text).await {
            Ok(()) => {
                let preview: String = text.chars().take(50).collect();
                info!(preview = %preview, "Message sent");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to send message");
                false
            }
        }
    }

    /// Send a restock batch for `store`, split into as many messages as needed.
    pub async fn send_products(&self, store: &str, items: &[Product]) -> Delivery {
        let mut delivery = Delivery::default();
        if items.is_empty() {
            return delivery;
        }

        let text = match format::format_products(store, items) {
            Ok(text) => text,
            Err(e) => {
                warn!(store, error = %e, "Falling back to plain restock message");
                delivery.record(self.send(&format::fallback_message(store)).await);
                return delivery;
            }
        };

        let chunks = format::split_message(&text, self.limit);
        if chunks.len() > 1 {
            info!(
                store,
                chunks = chunks.len(),
                products = items.len(),
                "Splitting restock message"
            );
        }
        for chunk in &chunks {
            delivery.record(self.send(chunk).await);
        }
        delivery
    }

    /// Report a failed source poll. The reason is cut to a short summary.
    pub async fn send_source_error(&self, store: &str, reason: &str) -> bool {
        let reason = format::truncate(reason, SOURCE_ERROR_CHARS);
        let detail = format!("Error checking {store}: {reason}");
        self.send_error(&detail).await
    }

    pub async fn send_error(&self, detail: &str) -> bool {
        self.send(&format::error_message(detail)).await
    }

    pub async fn send_startup(&self) -> bool {
        self.send(&format::startup_message()).await
    }

    pub async fn send_stopped(&self) -> bool {
        self.send(&format::stopped_message()).await
    }

    pub async fn send_test(&self) -> bool {
        self.send(&format::test_message()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::format::text_len;
    use crate::testing::{FailingBackend, RecordingBackend};

    fn product(i: usize) -> Product {
        Product::new(i.to_string(), format!("Hot Wheels Collector Series Car {i:02}"))
            .with_price("₹1,299")
            .with_url(format!("https://shop.test/products/hot-wheels-collector-series-car-{i:02}"))
            .in_stock(true)
    }

    #[tokio::test]
    async fn small_batch_is_one_message() {
        let backend = RecordingBackend::new();
        let notifier = Notifier::new(Box::new(backend.clone()));

        let delivery = notifier.send_products("Zepto", &[product(1), product(2)]).await;
        assert_eq!(delivery, Delivery { sent: 1, failed: 0 });

        let sent = backend.messages();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("🔔 <b>Restock Alert on Zepto</b>"));
    }

    #[tokio::test]
    async fn empty_batch_sends_nothing() {
        let backend = RecordingBackend::new();
        let notifier = Notifier::new(Box::new(backend.clone()));
        assert_eq!(notifier.send_products("Zepto", &[]).await, Delivery::default());
        assert!(backend.messages().is_empty());
    }

    #[tokio::test]
    async fn format_error_sends_fallback() {
        let backend = RecordingBackend::new();
        let notifier = Notifier::new(Box::new(backend.clone()));
        let nameless = Product::new("1", "").with_url("ftp://nope").in_stock(true);

        let delivery = notifier.send_products("JioMart", &[nameless]).await;
        assert_eq!(delivery.sent, 1);
        assert_eq!(
            backend.messages(),
            vec!["🔔 New products available on JioMart".to_string()]
        );
    }

    #[tokio::test]
    async fn one_bad_link_keeps_the_rest_of_the_batch() {
        let backend = RecordingBackend::new();
        let notifier = Notifier::new(Box::new(backend.clone()));
        let mut items: Vec<Product> = (0..5).map(product).collect();
        items.push(Product::new("spa", "Hot Wheels Deora").with_url("javascript:void(0)"));

        let delivery = notifier.send_products("Blinkit", &items).await;
        assert_eq!(delivery, Delivery { sent: 1, failed: 0 });

        let sent = backend.messages();
        assert!(sent[0].starts_with("🔔 <b>Restock Alert on Blinkit</b>"));
        for i in 0..5 {
            assert!(sent[0].contains(&format!("hot-wheels-collector-series-car-{i:02}")));
        }
        assert!(sent[0].contains("<b>Hot Wheels Deora</b>"));
        assert!(!sent[0].contains("javascript"));
    }

    #[tokio::test]
    async fn transport_failures_do_not_stop_later_chunks() {
        let backend = FailingBackend::failing_first(1);
        let notifier = Notifier::new(Box::new(backend.clone())).with_limit(300);
        let items: Vec<Product> = (0..6).map(product).collect();

        let delivery = notifier.send_products("Blinkit", &items).await;
        assert!(delivery.sent + delivery.failed > 1);
        assert_eq!(delivery.failed, 1);
        assert_eq!(backend.attempts() as u32, delivery.sent + delivery.failed);
        for text in backend.delivered() {
            assert!(text_len(&text) <= 300);
        }
    }

    #[tokio::test]
    async fn source_error_is_truncated_and_escaped() {
        let backend = RecordingBackend::new();
        let notifier = Notifier::new(Box::new(backend.clone()));
        let reason = format!("<html>{}", "e".repeat(300));

        assert!(notifier.send_source_error("Swiggy", &reason).await);
        let sent = backend.messages();
        let expected_detail = format!("&lt;html&gt;{}", "e".repeat(94));
        assert_eq!(
            sent[0],
            format!("⚠️ <b>Bot Error</b>\nError checking Swiggy: {expected_detail}")
        );
    }
}
