pub mod error;
pub mod types;

pub use error::{Result, TelegramError};
pub use types::{BotUser, Message};

use std::time::Duration;

use serde::de::DeserializeOwned;
use types::{ApiResponse, SendMessageRequest};

const BASE_URL: &str = "https://api.telegram.org";

/// Hard limit the Bot API enforces on a single message, in UTF-16 code units.
pub const MAX_MESSAGE_LEN: usize = 4096;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    chat_id: i64,
}

impl TelegramClient {
    pub fn new(token: &str, chat_id: i64) -> Result<Self> {
        Self::with_base_url(BASE_URL, token, chat_id)
    }

    /// Point the client at a different API host (self-hosted Bot API server, tests).
    pub fn with_base_url(base_url: &str, token: &str, chat_id: i64) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TelegramError::Credentials("bot token is empty".into()));
        }
        if !token.contains(':') {
            return Err(TelegramError::Credentials(
                "bot token must look like <id>:<secret>".into(),
            ));
        }

        let client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            chat_id,
        })
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    /// Send an HTML-formatted message to the configured chat with link previews disabled.
    pub async fn send_html(&self, text: &str) -> Result<Message> {
        let body = SendMessageRequest {
            chat_id: self.chat_id,
            text,
            parse_mode: Some("HTML"),
            disable_web_page_preview: true,
        };
        self.call("sendMessage", &body).await
    }

    /// Validate the token. Returns the bot's own user record.
    pub async fn get_me(&self) -> Result<BotUser> {
        self.call("getMe", &serde_json::json!({})).await
    }

    async fn call<B: serde::Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}/bot{}/{}", self.base_url, self.token, method);
        let resp = self.client.post(&url).json(body).send().await?;

        let status = resp.status();
        let text = resp.text().await?;

        // The Bot API answers errors with a JSON envelope too; fall back to the raw body
        // when a proxy or outage returns something else.
        let envelope: ApiResponse<T> = match serde_json::from_str(&text) {
            Ok(env) => env,
            Err(e) if status.is_success() => return Err(e.into()),
            Err(_) => {
                return Err(TelegramError::Api {
                    code: status.as_u16(),
                    description: text.chars().take(200).collect(),
                })
            }
        };

        if !envelope.ok {
            let code = envelope.error_code.unwrap_or(status.as_u16());
            let description = envelope.description.unwrap_or_default();
            tracing::debug!(method, code, %description, "Telegram API rejected request");
            return Err(TelegramError::Api { code, description });
        }

        envelope
            .result
            .ok_or_else(|| TelegramError::Parse(format!("{method}: ok response without result")))
    }
}
