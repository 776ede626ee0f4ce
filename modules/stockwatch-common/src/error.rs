use thiserror::Error;

#[derive(Error, Debug)]
pub enum StockwatchError {
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failure of a single source poll. Never fatal to the process.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed parsing response: {0}")]
    Parse(String),

    #[error("Browser rendering failed: {0}")]
    Browser(String),
}
