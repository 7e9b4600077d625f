//! Domain error types.

use thiserror::Error;

/// Errors raised when constructing or combining domain values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Quantities must be at least one.
    #[error("Invalid quantity: {quantity} (must be between 1 and {max})", max = crate::Quantity::MAX)]
    InvalidQuantity { quantity: i64 },

    /// Discount percentages must lie in 0..=100.
    #[error("Invalid discount percent: {percent} (must be between 0 and 100)")]
    InvalidDiscountPercent { percent: i64 },

    /// A money computation overflowed or produced an impossible value.
    #[error("Malformed money value: {0}")]
    MalformedMoney(String),

    /// A persisted order status could not be recognised.
    #[error("Unknown order status: {0}")]
    UnknownOrderStatus(String),
}
