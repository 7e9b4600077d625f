//! Configuration injected into the checkout collaborators.

use std::time::Duration;

use crate::retry::RetryPolicy;

/// Per-collaborator call timeouts.
#[derive(Debug, Clone, PartialEq)]
pub struct CallTimeouts {
    pub pricing: Duration,
    pub coupon: Duration,
    pub payment: Duration,
    pub storage: Duration,
}

impl Default for CallTimeouts {
    fn default() -> Self {
        Self {
            pricing: Duration::from_secs(2),
            coupon: Duration::from_secs(2),
            payment: Duration::from_secs(10),
            storage: Duration::from_secs(5),
        }
    }
}

/// Everything the checkout core needs to know about its environment.
///
/// Built once at start-up and passed to constructors; nothing in the core
/// reads process configuration on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutConfig {
    /// ISO 4217 code sent to the payment gateway and stored on orders.
    pub currency: String,
    pub timeouts: CallTimeouts,
    pub retry: RetryPolicy,
    /// How long an attempt may sit at the payment step before its
    /// authorization is released.
    pub stale_attempt_after: Duration,
    /// How often stalled attempts are looked for.
    pub sweep_interval: Duration,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            timeouts: CallTimeouts::default(),
            retry: RetryPolicy::default(),
            stale_attempt_after: Duration::from_secs(15 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl CheckoutConfig {
    /// Returns true if `code` looks like an ISO 4217 currency code.
    pub fn is_valid_currency(code: &str) -> bool {
        code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_validation() {
        assert!(CheckoutConfig::is_valid_currency("USD"));
        assert!(CheckoutConfig::is_valid_currency("EUR"));
        assert!(!CheckoutConfig::is_valid_currency("usd"));
        assert!(!CheckoutConfig::is_valid_currency("US"));
        assert!(!CheckoutConfig::is_valid_currency("US$"));
    }

    #[test]
    fn test_defaults() {
        let config = CheckoutConfig::default();
        assert_eq!(config.currency, "USD");
        assert_eq!(config.timeouts.payment, Duration::from_secs(10));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.stale_attempt_after, Duration::from_secs(900));
    }
}
