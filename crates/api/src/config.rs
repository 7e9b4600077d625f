//! Application configuration loaded from environment variables.

use std::time::Duration;

use checkout::{CallTimeouts, CheckoutConfig, RetryPolicy};
use thiserror::Error;

/// Start-up configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid CHECKOUT_CURRENCY {0:?}: expected a three-letter ISO 4217 code")]
    InvalidCurrency(String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` (default `"0.0.0.0"`) and `PORT` (default `3000`)
/// - `RUST_LOG` tracing filter directive (default `"info"`)
/// - `LOG_FORMAT` `text` or `json` (default `text`)
/// - `DATABASE_URL` PostgreSQL URL; the in-memory store is used when unset
/// - `CHECKOUT_CURRENCY` (default `USD`)
/// - `PRICING_TIMEOUT_MS`, `COUPON_TIMEOUT_MS`, `PAYMENT_TIMEOUT_MS`, `STORAGE_TIMEOUT_MS`
/// - `RETRY_MAX_ATTEMPTS`, `RETRY_INITIAL_BACKOFF_MS`, `RETRY_MAX_BACKOFF_MS`
/// - `STALE_ATTEMPT_AFTER_MS`, `SWEEP_INTERVAL_MS` for releasing payments of
///   attempts stuck at the payment step
///
/// Malformed numbers fall back to their defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub checkout: CheckoutConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = CheckoutConfig::default();
        let millis = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        let currency = lookup("CHECKOUT_CURRENCY").unwrap_or(defaults.currency);
        if !CheckoutConfig::is_valid_currency(&currency) {
            return Err(ConfigError::InvalidCurrency(currency));
        }

        let timeouts = CallTimeouts {
            pricing: millis("PRICING_TIMEOUT_MS", defaults.timeouts.pricing),
            coupon: millis("COUPON_TIMEOUT_MS", defaults.timeouts.coupon),
            payment: millis("PAYMENT_TIMEOUT_MS", defaults.timeouts.payment),
            storage: millis("STORAGE_TIMEOUT_MS", defaults.timeouts.storage),
        };

        let retry = RetryPolicy {
            max_attempts: lookup("RETRY_MAX_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .filter(|attempts| *attempts > 0)
                .unwrap_or(defaults.retry.max_attempts),
            initial_backoff: millis("RETRY_INITIAL_BACKOFF_MS", defaults.retry.initial_backoff),
            max_backoff: millis("RETRY_MAX_BACKOFF_MS", defaults.retry.max_backoff),
            backoff_factor: defaults.retry.backoff_factor,
        };

        let sweep_interval = match millis("SWEEP_INTERVAL_MS", defaults.sweep_interval) {
            interval if interval.is_zero() => defaults.sweep_interval,
            interval => interval,
        };

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            checkout: CheckoutConfig {
                currency,
                timeouts,
                retry,
                stale_attempt_after: millis("STALE_ATTEMPT_AFTER_MS", defaults.stale_attempt_after),
                sweep_interval,
            },
        })
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
            checkout: CheckoutConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert_eq!(config.checkout, CheckoutConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("LOG_FORMAT", "json"),
            ("DATABASE_URL", "postgres://localhost/checkout"),
            ("CHECKOUT_CURRENCY", "EUR"),
            ("PAYMENT_TIMEOUT_MS", "2500"),
            ("RETRY_MAX_ATTEMPTS", "5"),
            ("STALE_ATTEMPT_AFTER_MS", "60000"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/checkout")
        );
        assert_eq!(config.checkout.currency, "EUR");
        assert_eq!(config.checkout.timeouts.payment, Duration::from_millis(2500));
        assert_eq!(config.checkout.retry.max_attempts, 5);
        assert_eq!(config.checkout.stale_attempt_after, Duration::from_secs(60));
    }

    #[test]
    fn test_malformed_numbers_fall_back() {
        let config = config_from(&[
            ("PORT", "eighty"),
            ("STORAGE_TIMEOUT_MS", "-1"),
            ("RETRY_MAX_ATTEMPTS", "0"),
            ("SWEEP_INTERVAL_MS", "0"),
        ])
        .unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.checkout.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.checkout.timeouts.storage, Duration::from_secs(5));
        assert_eq!(config.checkout.retry.max_attempts, 3);
    }

    #[test]
    fn test_invalid_currency_is_an_error() {
        assert!(matches!(
            config_from(&[("CHECKOUT_CURRENCY", "usd")]),
            Err(ConfigError::InvalidCurrency(_))
        ));
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }
}
