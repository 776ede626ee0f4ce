use thiserror::Error;

pub type Result<T> = std::result::Result<T, TelegramError>;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("API error (code {code}): {description}")]
    Api { code: u16, description: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid credentials: {0}")]
    Credentials(String),
}

impl From<reqwest::Error> for TelegramError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return TelegramError::Timeout;
        }
        if err.is_decode() {
            return TelegramError::Parse(err.without_url().to_string());
        }
        // The request URL embeds the bot token; never let it reach the logs.
        TelegramError::Network(err.without_url().to_string())
    }
}

impl From<serde_json::Error> for TelegramError {
    fn from(err: serde_json::Error) -> Self {
        TelegramError::Parse(err.to_string())
    }
}
