use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::StockwatchError;

/// Stores the monitor knows about: (display name, env var prefix).
/// Order here is the per-cycle polling order.
pub const STORES: &[(&str, &str)] = &[
    ("Blinkit", "BLINKIT"),
    ("Swiggy", "SWIGGY"),
    ("Zepto", "ZEPTO"),
    ("JioMart", "JIOMART"),
    ("BigBasket", "BIGBASKET"),
];

const DEFAULT_SEARCH_TERMS: &str = "hot wheels";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
const DEFAULT_SEEN_TTL_SECS: u64 = 6 * 3600;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;
const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 120;

/// Which adapter family to prefer for stores that support both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Api,
    Browser,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api => write!(f, "api"),
            Self::Browser => write!(f, "browser"),
        }
    }
}

/// Per-store endpoint settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub name: String,
    /// URL template containing `{PINCODE}` and `{QUERY}` placeholders.
    pub api_url: Option<String>,
    pub headers: BTreeMap<String, String>,
    /// CSS selector overrides for browser mode, keyed by role (`product_card`, ...).
    pub selectors: BTreeMap<String, String>,
}

impl StoreConfig {
    pub fn api_enabled(&self) -> bool {
        self.api_url.is_some()
    }
}

/// Process configuration. Built once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    pub pincode: String,
    pub search_terms: Vec<String>,
    pub poll_interval: Duration,
    pub run_mode: RunMode,

    // Messaging transport
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,

    // Seen-store
    pub seen_db_path: PathBuf,
    pub seen_ttl: Duration,

    // Sources
    pub source_http_timeout: Duration,
    pub source_timeout: Duration,
    pub stores: Vec<StoreConfig>,
    pub browserless_url: Option<String>,
    pub browserless_token: Option<String>,
}

impl Config {
    /// Load `.env` (if present) and read configuration from the environment.
    pub fn from_env() -> Result<Self, StockwatchError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, StockwatchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let search_terms: Vec<String> = get("SEARCH_TERMS")
            .unwrap_or_else(|| DEFAULT_SEARCH_TERMS.to_string())
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if search_terms.is_empty() {
            return Err(StockwatchError::Config(
                "SEARCH_TERMS must contain at least one non-empty term".into(),
            ));
        }

        let poll_interval = parse_secs(&get, "POLL_INTERVAL", DEFAULT_POLL_INTERVAL_SECS)?;
        let seen_ttl = parse_secs(&get, "SEEN_TTL_SECS", DEFAULT_SEEN_TTL_SECS)?;
        let source_http_timeout =
            parse_secs(&get, "SOURCE_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?;
        let source_timeout = parse_secs(&get, "SOURCE_TIMEOUT_SECS", DEFAULT_SOURCE_TIMEOUT_SECS)?;

        let run_mode = match get("RUN_MODE").map(|m| m.to_lowercase()).as_deref() {
            None | Some("api") => RunMode::Api,
            Some("browser") => RunMode::Browser,
            Some(other) => {
                return Err(StockwatchError::Config(format!(
                    "RUN_MODE must be 'api' or 'browser', got '{other}'"
                )))
            }
        };

        let stores = STORES
            .iter()
            .map(|(name, prefix)| StoreConfig {
                name: name.to_string(),
                api_url: get(&format!("{prefix}_API_URL")),
                headers: json_map(&get, &format!("{prefix}_API_HEADERS_JSON")),
                selectors: json_map(&get, &format!("{prefix}_SELECTORS_JSON")),
            })
            .collect();

        Ok(Self {
            pincode: get("PINCODE").unwrap_or_default(),
            search_terms,
            poll_interval,
            run_mode,
            telegram_bot_token: get("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: get("TELEGRAM_CHAT_ID"),
            seen_db_path: get("SEEN_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("seen.db")),
            seen_ttl,
            source_http_timeout,
            source_timeout,
            stores,
            browserless_url: get("BROWSERLESS_URL"),
            browserless_token: get("BROWSERLESS_TOKEN"),
        })
    }

    pub fn store(&self, name: &str) -> Option<&StoreConfig> {
        self.stores.iter().find(|s| s.name == name)
    }

    /// Log the effective configuration with secrets masked.
    pub fn log_redacted(&self) {
        info!(
            pincode = self.pincode.as_str(),
            terms = ?self.search_terms,
            interval_secs = self.poll_interval.as_secs(),
            run_mode = %self.run_mode,
            "Monitor configuration"
        );
        info!(
            bot_token = %mask(self.telegram_bot_token.as_deref()),
            chat_id = %mask(self.telegram_chat_id.as_deref()),
            "Telegram configuration"
        );
        info!(
            path = %self.seen_db_path.display(),
            ttl_secs = self.seen_ttl.as_secs(),
            "Seen-store configuration"
        );
        for store in &self.stores {
            info!(
                store = store.name.as_str(),
                api = store.api_enabled(),
                headers = store.headers.len(),
                selector_overrides = store.selectors.len(),
                "Store configuration"
            );
        }
        if let Some(url) = &self.browserless_url {
            info!(
                url = url.as_str(),
                token = %mask(self.browserless_token.as_deref()),
                "Browserless configured"
            );
        }
    }
}

/// Replace every character with `*`, keeping the length visible.
pub fn mask(value: Option<&str>) -> String {
    match value {
        Some(v) => "*".repeat(v.chars().count()),
        None => "Not set".to_string(),
    }
}

fn parse_secs<G>(get: &G, key: &str, default: u64) -> Result<Duration, StockwatchError>
where
    G: Fn(&str) -> Option<String>,
{
    let secs = match get(key) {
        None => default,
        Some(raw) => raw.parse::<u64>().map_err(|_| {
            StockwatchError::Config(format!(
                "{key} must be a whole number of seconds, got '{raw}'"
            ))
        })?,
    };
    if secs == 0 {
        return Err(StockwatchError::Config(format!("{key} must be positive")));
    }
    Ok(Duration::from_secs(secs))
}

/// Parse a JSON object of string values. Malformed input is logged and ignored.
fn json_map<G>(get: &G, key: &str) -> BTreeMap<String, String>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return BTreeMap::new();
    };
    match serde_json::from_str::<BTreeMap<String, serde_json::Value>>(&raw) {
        Ok(map) => map
            .into_iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => (k, s),
                other => (k, other.to_string()),
            })
            .collect(),
        Err(e) => {
            warn!(key, error = %e, "Ignoring malformed JSON object");
            BTreeMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.search_terms, vec!["hot wheels".to_string()]);
        assert_eq!(config.poll_interval, Duration::from_secs(300));
        assert_eq!(config.seen_ttl, Duration::from_secs(21_600));
        assert_eq!(config.source_http_timeout, Duration::from_secs(15));
        assert_eq!(config.run_mode, RunMode::Api);
        assert_eq!(config.seen_db_path, PathBuf::from("seen.db"));
        assert_eq!(config.stores.len(), STORES.len());
        assert!(config.telegram_bot_token.is_none());
    }

    #[test]
    fn search_terms_are_trimmed_and_blank_entries_dropped() {
        let config =
            Config::from_lookup(lookup(&[("SEARCH_TERMS", " hot wheels , ,matchbox ")])).unwrap();
        assert_eq!(config.search_terms, vec!["hot wheels", "matchbox"]);
    }

    #[test]
    fn only_separators_is_a_config_error() {
        let err = Config::from_lookup(lookup(&[("SEARCH_TERMS", " , ,")])).unwrap_err();
        assert!(matches!(err, StockwatchError::Config(_)));
    }

    #[test]
    fn zero_or_garbage_interval_rejected() {
        assert!(Config::from_lookup(lookup(&[("POLL_INTERVAL", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("POLL_INTERVAL", "5m")])).is_err());
    }

    #[test]
    fn run_mode_is_case_insensitive() {
        let config = Config::from_lookup(lookup(&[("RUN_MODE", "Browser")])).unwrap();
        assert_eq!(config.run_mode, RunMode::Browser);
        assert!(Config::from_lookup(lookup(&[("RUN_MODE", "scrape")])).is_err());
    }

    #[test]
    fn store_settings_read_by_prefix() {
        let config = Config::from_lookup(lookup(&[
            ("ZEPTO_API_URL", "https://zepto.test/s?q={QUERY}&pin={PINCODE}"),
            ("ZEPTO_API_HEADERS_JSON", r#"{"X-Store": "7", "X-Retry": 2}"#),
            ("BLINKIT_API_HEADERS_JSON", "not json"),
        ]))
        .unwrap();

        let zepto = config.store("Zepto").unwrap();
        assert!(zepto.api_enabled());
        assert_eq!(zepto.headers.get("X-Store").map(String::as_str), Some("7"));
        assert_eq!(zepto.headers.get("X-Retry").map(String::as_str), Some("2"));

        let blinkit = config.store("Blinkit").unwrap();
        assert!(!blinkit.api_enabled());
        assert!(blinkit.headers.is_empty());
    }

    #[test]
    fn mask_hides_secret_but_keeps_length() {
        assert_eq!(mask(Some("abc")), "***");
        assert_eq!(mask(None), "Not set");
    }
}
