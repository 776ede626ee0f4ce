//! Operator-facing diagnostics for the `check` and `config` commands.

use std::fmt;
use std::fmt::Write as _;

use tracing::info;

use stockwatch_common::{mask, Config};

use crate::notify::{Notifier, TelegramBackend};
use crate::sources::BrowserProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    Api,
    /// No endpoint, but the store can be scraped in browser mode.
    BrowserOnly,
    NotConfigured,
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api => write!(f, "API configured"),
            Self::BrowserOnly => write!(f, "not configured (browser mode)"),
            Self::NotConfigured => write!(f, "not configured"),
        }
    }
}

#[derive(Debug)]
pub struct CheckReport {
    /// Required variable name and whether it is set.
    pub env: Vec<(&'static str, bool)>,
    pub stores: Vec<(String, StoreStatus)>,
    pub transport: Result<(), String>,
}

impl CheckReport {
    pub fn env_ok(&self) -> bool {
        self.env.iter().all(|(_, set)| *set)
    }

    pub fn stores_ok(&self) -> bool {
        self.stores.iter().any(|(_, s)| *s == StoreStatus::Api)
    }

    pub fn transport_ok(&self) -> bool {
        self.transport.is_ok()
    }

    /// Stores are advisory; env and transport are required.
    pub fn passed(&self) -> bool {
        self.env_ok() && self.transport_ok()
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Environment:")?;
        for (name, set) in &self.env {
            writeln!(f, "  {} {name}", if *set { "✅" } else { "❌" })?;
        }
        writeln!(f, "\nStores:")?;
        for (name, status) in &self.stores {
            writeln!(f, "  {name}: {status}")?;
        }
        let configured = self.stores.iter().filter(|(_, s)| *s == StoreStatus::Api).count();
        writeln!(f, "  Total configured: {configured}/{}", self.stores.len())?;

        writeln!(f, "\n=== Check Summary ===")?;
        writeln!(f, "Environment variables: {}", pass(self.env_ok(), "❌ FAIL"))?;
        writeln!(f, "Store configuration:   {}", pass(self.stores_ok(), "⚠️  PARTIAL"))?;
        writeln!(f, "Telegram connection:   {}", pass(self.transport_ok(), "❌ FAIL"))?;
        if let Err(reason) = &self.transport {
            writeln!(f, "  {reason}")?;
        }
        Ok(())
    }
}

fn pass(ok: bool, otherwise: &'static str) -> &'static str {
    if ok {
        "✅ PASS"
    } else {
        otherwise
    }
}

pub fn env_checks(config: &Config) -> Vec<(&'static str, bool)> {
    vec![
        ("TELEGRAM_BOT_TOKEN", config.telegram_bot_token.is_some()),
        ("TELEGRAM_CHAT_ID", config.telegram_chat_id.is_some()),
        ("PINCODE", !config.pincode.is_empty()),
        ("SEARCH_TERMS", !config.search_terms.is_empty()),
    ]
}

pub fn store_checks(config: &Config) -> Vec<(String, StoreStatus)> {
    config
        .stores
        .iter()
        .map(|store| {
            let status = if store.api_enabled() {
                StoreStatus::Api
            } else if BrowserProfile::for_store(&store.name).is_some() {
                StoreStatus::BrowserOnly
            } else {
                StoreStatus::NotConfigured
            };
            (store.name.clone(), status)
        })
        .collect()
}

/// Validate the token and deliver a test message.
pub async fn check_transport(backend: TelegramBackend) -> Result<(), String> {
    let me = backend
        .verify()
        .await
        .map_err(|e| format!("token rejected: {e}"))?;
    info!(bot = me.username.as_deref().unwrap_or(&me.first_name), "Telegram token valid");

    let notifier = Notifier::new(Box::new(backend));
    if notifier.send_test().await {
        Ok(())
    } else {
        Err("test message was not delivered".to_string())
    }
}

pub async fn run_checks(config: &Config) -> CheckReport {
    let env = env_checks(config);
    let stores = store_checks(config);

    let transport = if env.iter().all(|(_, set)| *set) {
        match TelegramBackend::from_config(config) {
            Ok(backend) => check_transport(backend).await,
            Err(e) => Err(e.to_string()),
        }
    } else {
        Err("skipped: required environment variables are missing".to_string())
    };

    CheckReport { env, stores, transport }
}

/// Effective configuration for display, secrets masked.
pub fn config_summary(config: &Config) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "PINCODE:            {}", or_not_set(&config.pincode));
    let _ = writeln!(out, "SEARCH_TERMS:       {}", config.search_terms.join(", "));
    let _ = writeln!(out, "POLL_INTERVAL:      {}s", config.poll_interval.as_secs());
    let _ = writeln!(out, "RUN_MODE:           {}", config.run_mode);
    let _ = writeln!(out, "TELEGRAM_BOT_TOKEN: {}", mask(config.telegram_bot_token.as_deref()));
    let _ = writeln!(out, "TELEGRAM_CHAT_ID:   {}", mask(config.telegram_chat_id.as_deref()));
    let _ = writeln!(out, "SEEN_DB_PATH:       {}", config.seen_db_path.display());
    let _ = writeln!(out, "SEEN_TTL_SECS:      {}", config.seen_ttl.as_secs());
    let _ = writeln!(
        out,
        "BROWSERLESS_URL:    {}",
        config.browserless_url.as_deref().unwrap_or("Not set")
    );
    let _ = writeln!(out, "\nStores:");
    for (name, status) in store_checks(config) {
        let _ = writeln!(out, "  {name}: {status}");
    }
    out
}

fn or_not_set(value: &str) -> &str {
    if value.is_empty() {
        "Not set"
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use telegram_client::TelegramClient;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(move |key: &str| map.get(key).cloned()).unwrap()
    }

    #[test]
    fn missing_env_is_reported() {
        let config = config(&[("PINCODE", "560001")]);
        let env = env_checks(&config);
        assert!(env.contains(&("PINCODE", true)));
        assert!(env.contains(&("TELEGRAM_BOT_TOKEN", false)));
    }

    #[test]
    fn store_status_reflects_mode_support() {
        let stores = store_checks(&config(&[("ZEPTO_API_URL", "https://z.test/?q={QUERY}")]));
        let lookup: HashMap<_, _> = stores.into_iter().collect();
        assert_eq!(lookup["Zepto"], StoreStatus::Api);
        assert_eq!(lookup["Blinkit"], StoreStatus::BrowserOnly);
        assert_eq!(lookup["JioMart"], StoreStatus::NotConfigured);
    }

    #[tokio::test]
    async fn transport_check_is_skipped_without_env() {
        let report = run_checks(&config(&[])).await;
        assert!(!report.passed());
        assert!(report.to_string().contains("Telegram connection:   ❌ FAIL"));
    }

    #[test]
    fn summary_masks_secrets() {
        let summary = config_summary(&config(&[
            ("TELEGRAM_BOT_TOKEN", "123:secret"),
            ("PINCODE", "560001"),
        ]));
        assert!(summary.contains("TELEGRAM_BOT_TOKEN: **********"));
        assert!(!summary.contains("secret"));
        assert!(summary.contains("TELEGRAM_CHAT_ID:   Not set"));
    }

    #[tokio::test]
    async fn transport_check_sends_test_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot1:a/getMe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true, "result": { "id": 1, "is_bot": true, "first_name": "Stock" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bot1:a/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true, "result": { "message_id": 3 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = TelegramClient::with_base_url(&server.uri(), "1:a", 9).unwrap();
        let backend = TelegramBackend::new(client);
        assert_eq!(check_transport(backend).await, Ok(()));
    }

    #[tokio::test]
    async fn rejected_token_fails_transport_check() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot1:a/getMe"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "ok": false, "error_code": 401, "description": "Unauthorized"
            })))
            .mount(&server)
            .await;

        let client = TelegramClient::with_base_url(&server.uri(), "1:a", 9).unwrap();
        let backend = TelegramBackend::new(client);
        let err = check_transport(backend).await.unwrap_err();
        assert!(err.contains("Unauthorized"));
    }
}
