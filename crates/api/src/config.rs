//! Application configuration loaded from environment variables.

use std::time::Duration;

use cart_service::ServiceConfig;
use domain::RetryPolicy;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL URL; unset means the in-memory store
/// - `CATALOG_URL`: product catalog base URL (default: `"http://localhost:4000"`)
/// - `CART_MAX_RETRIES`: attempts per command on version conflicts (default: `3`)
/// - `CART_RETRY_BASE_MS`: backoff unit in milliseconds (default: `50`)
/// - `CART_VERIFY_PRICES`: re-check prices at checkout (default: `true`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub catalog_url: String,
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub verify_prices: bool,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    ///
    /// Unparseable values fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => defaults.log_format,
            },
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            catalog_url: lookup("CATALOG_URL").unwrap_or(defaults.catalog_url),
            max_retries: lookup("CART_MAX_RETRIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_retries),
            retry_base_ms: lookup("CART_RETRY_BASE_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.retry_base_ms),
            verify_prices: lookup("CART_VERIFY_PRICES")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.verify_prices),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            retry_policy: RetryPolicy::new(
                self.max_retries,
                Duration::from_millis(self.retry_base_ms),
            ),
            verify_prices_on_checkout: self.verify_prices,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            catalog_url: "http://localhost:4000".to_string(),
            max_retries: 3,
            retry_base_ms: 50,
            verify_prices: true,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
