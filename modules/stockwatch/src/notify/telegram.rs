use async_trait::async_trait;
use telegram_client::{BotUser, TelegramClient};
use tracing::debug;

use stockwatch_common::{Config, StockwatchError};

use super::backend::NotifyBackend;

/// Telegram Bot API backend. Messages go out as HTML with link previews disabled.
pub struct TelegramBackend {
    client: TelegramClient,
}

impl TelegramBackend {
    pub fn new(client: TelegramClient) -> Self {
        Self { client }
    }

    /// Build from configuration. Missing or malformed credentials are fatal.
    pub fn from_config(config: &Config) -> Result<Self, StockwatchError> {
        let (Some(token), Some(chat_id)) = (
            config.telegram_bot_token.as_deref(),
            config.telegram_chat_id.as_deref(),
        ) else {
            return Err(StockwatchError::Config(
                "Please set TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID".into(),
            ));
        };

        let chat_id: i64 = chat_id.parse().map_err(|_| {
            StockwatchError::Config(format!("TELEGRAM_CHAT_ID must be an integer, got '{chat_id}'"))
        })?;

        let client = TelegramClient::new(token, chat_id)
            .map_err(|e| StockwatchError::Config(e.to_string()))?;
        Ok(Self::new(client))
    }

    /// Check the token against the API.
    pub async fn verify(&self) -> anyhow::Result<BotUser> {
        Ok(self.client.get_me().await?)
    }
}

#[async_trait]
impl NotifyBackend for TelegramBackend {
    async fn send(&self, text: &str) -> anyhow::Result<()> {
        let message = self.client.send_html(text).await?;
        debug!(
            message_id = message.message_id,
            chat_id = self.client.chat_id(),
            "Telegram message sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(move |key: &str| map.get(key).cloned()).unwrap()
    }

    #[test]
    fn missing_credentials_are_fatal() {
        assert!(matches!(
            TelegramBackend::from_config(&config(&[("TELEGRAM_BOT_TOKEN", "1:a")])),
            Err(StockwatchError::Config(_))
        ));
        assert!(matches!(
            TelegramBackend::from_config(&config(&[
                ("TELEGRAM_BOT_TOKEN", "1:a"),
                ("TELEGRAM_CHAT_ID", "@channel")
            ])),
            Err(StockwatchError::Config(_))
        ));
        assert!(TelegramBackend::from_config(&config(&[
            ("TELEGRAM_BOT_TOKEN", "1:a"),
            ("TELEGRAM_CHAT_ID", "-1001234")
        ]))
        .is_ok());
    }

    #[tokio::test]
    async fn send_failure_surfaces_as_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot1:a/sendMessage"))
            .and(body_partial_json(serde_json::json!({ "chat_id": 5, "text": "hello" })))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "ok": false, "error_code": 403, "description": "Forbidden: bot was blocked by the user"
            })))
            .mount(&server)
            .await;

        let client = TelegramClient::with_base_url(&server.uri(), "1:a", 5).unwrap();
        let backend = TelegramBackend::new(client);
        let err = backend.send("hello").await.unwrap_err();
        assert!(err.to_string().contains("blocked"));
    }
}
