use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserlessError>;

#[derive(Debug, Error)]
pub enum BrowserlessError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out waiting for rendered page")]
    Timeout,

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl From<reqwest::Error> for BrowserlessError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return BrowserlessError::Timeout;
        }
        // Strip the request URL, which carries the API token as a query parameter.
        BrowserlessError::Network(err.without_url().to_string())
    }
}
