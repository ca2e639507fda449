//! Worker configuration loaded from environment variables.

use std::time::Duration;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Worker configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset keeps everything in memory
/// - `ACCOUNT_CONFIRMATION_GRACE_HOURS`: (default: `24`)
/// - `ABANDONED_CART_DAYS`: (default: `3`)
/// - `ACCOUNT_SWEEP_INTERVAL_SECS`: (default: `3600`)
/// - `CART_SWEEP_INTERVAL_SECS`: (default: `86400`)
/// - `STOREFRONT_URL`: base of links in buyer emails (default: `"http://localhost:8080"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub account_confirmation_grace: chrono::Duration,
    pub abandoned_cart_after: chrono::Duration,
    pub account_sweep_interval: Duration,
    pub cart_sweep_interval: Duration,
    pub storefront_url: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Values that fail to parse fall back to their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

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
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            account_confirmation_grace: number("ACCOUNT_CONFIRMATION_GRACE_HOURS")
                .map_or(defaults.account_confirmation_grace, |h| {
                    chrono::Duration::hours(h as i64)
                }),
            abandoned_cart_after: number("ABANDONED_CART_DAYS")
                .map_or(defaults.abandoned_cart_after, |d| chrono::Duration::days(d as i64)),
            account_sweep_interval: number("ACCOUNT_SWEEP_INTERVAL_SECS")
                .filter(|s| *s > 0)
                .map_or(defaults.account_sweep_interval, Duration::from_secs),
            cart_sweep_interval: number("CART_SWEEP_INTERVAL_SECS")
                .filter(|s| *s > 0)
                .map_or(defaults.cart_sweep_interval, Duration::from_secs),
            storefront_url: lookup("STOREFRONT_URL").unwrap_or(defaults.storefront_url),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
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
            account_confirmation_grace: chrono::Duration::hours(24),
            abandoned_cart_after: chrono::Duration::days(3),
            account_sweep_interval: Duration::from_secs(3600),
            cart_sweep_interval: Duration::from_secs(86400),
            storefront_url: "http://localhost:8080".to_string(),
        }
    }
}
