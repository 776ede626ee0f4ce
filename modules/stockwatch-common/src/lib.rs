pub mod config;
pub mod error;
pub mod types;

pub use config::{mask, Config, RunMode, StoreConfig, STORES};
pub use error::{SourceError, StockwatchError};
pub use types::*;
