//! Checkout error types.

use common::{AttemptId, CartItemId};
use domain::{DomainError, ProductId, VariantId};
use serde::Serialize;
use store::StoreError;
use thiserror::Error;

/// Coarse classification of a failure, telling the caller how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request itself is unacceptable; do not retry unchanged.
    Validation,
    /// A collaborator refused; the caller must change something (instrument, cart).
    Declined,
    /// Infrastructure was unavailable; retrying later may succeed.
    Transient,
    /// A concurrent operation got there first; retry after a short delay.
    Conflict,
    /// A bug or misconfiguration.
    Fatal,
}

impl ErrorKind {
    /// Returns the kind name as exposed to callers.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Declined => "declined",
            ErrorKind::Transient => "transient",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Fatal => "fatal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors returned by a checkout attempt.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Only authenticated users can place orders.
    #[error("Guests cannot check out; sign in first")]
    GuestCheckout,

    /// The cart does not exist or has no lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// A cart line's product or variant is no longer in the catalog.
    #[error("Product {product_id} is no longer available; refresh the cart")]
    PricingFailed {
        product_id: ProductId,
        variant_id: Option<VariantId>,
    },

    /// No coupon exists with the supplied code.
    #[error("Invalid coupon code: {code}")]
    InvalidCoupon { code: String },

    /// The coupon exists but has expired.
    #[error("Coupon expired: {code}")]
    CouponExpired { code: String },

    /// The payment gateway declined the instrument.
    #[error("Payment declined: {reason}")]
    PaymentDeclined { reason: String },

    /// The payment gateway failed permanently.
    #[error("Payment could not be processed")]
    PaymentGatewayError,

    /// A collaborator stayed unavailable after retries.
    #[error("Checkout temporarily unavailable during {step}")]
    CheckoutUnavailable { step: &'static str },

    /// Another operation holds this cart.
    #[error("Cart is busy with another operation")]
    CartBusy,

    /// The attempt ID belongs to another user.
    #[error("Checkout attempt {attempt_id} belongs to another user")]
    AttemptConflict { attempt_id: AttemptId },

    /// The attempt failed earlier and cannot be restarted.
    #[error("Checkout attempt {attempt_id} failed: {reason}")]
    AttemptFailed {
        attempt_id: AttemptId,
        reason: String,
    },

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CheckoutError {
    /// Returns the error's classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckoutError::GuestCheckout
            | CheckoutError::EmptyCart
            | CheckoutError::InvalidCoupon { .. }
            | CheckoutError::CouponExpired { .. } => ErrorKind::Validation,
            CheckoutError::PricingFailed { .. }
            | CheckoutError::PaymentDeclined { .. }
            | CheckoutError::PaymentGatewayError => ErrorKind::Declined,
            CheckoutError::CheckoutUnavailable { .. } => ErrorKind::Transient,
            CheckoutError::CartBusy
            | CheckoutError::AttemptConflict { .. }
            | CheckoutError::AttemptFailed { .. } => ErrorKind::Conflict,
            CheckoutError::Internal(_) => ErrorKind::Fatal,
        }
    }

    /// Returns a stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            CheckoutError::GuestCheckout => "guest_checkout",
            CheckoutError::EmptyCart => "empty_cart",
            CheckoutError::PricingFailed { .. } => "pricing_failed",
            CheckoutError::InvalidCoupon { .. } => "invalid_coupon",
            CheckoutError::CouponExpired { .. } => "coupon_expired",
            CheckoutError::PaymentDeclined { .. } => "payment_declined",
            CheckoutError::PaymentGatewayError => "payment_gateway_error",
            CheckoutError::CheckoutUnavailable { .. } => "checkout_unavailable",
            CheckoutError::CartBusy => "cart_busy",
            CheckoutError::AttemptConflict { .. } => "attempt_conflict",
            CheckoutError::AttemptFailed { .. } => "attempt_failed",
            CheckoutError::Internal(_) => "internal",
        }
    }

    /// Returns the request field the error points at, if any.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            CheckoutError::PricingFailed { .. } => Some("items"),
            CheckoutError::InvalidCoupon { .. } | CheckoutError::CouponExpired { .. } => {
                Some("coupon_code")
            }
            CheckoutError::PaymentDeclined { .. } | CheckoutError::PaymentGatewayError => {
                Some("payment_instrument")
            }
            CheckoutError::AttemptConflict { .. } | CheckoutError::AttemptFailed { .. } => {
                Some("attempt_id")
            }
            _ => None,
        }
    }

    /// Maps a storage failure during `step`.
    pub(crate) fn from_store(step: &'static str, err: StoreError) -> Self {
        match err {
            err if err.is_transient() => CheckoutError::CheckoutUnavailable { step },
            StoreError::JournalConflict { .. } | StoreError::Conflict(_) => CheckoutError::CartBusy,
            other => CheckoutError::Internal(other.to_string()),
        }
    }
}

impl From<DomainError> for CheckoutError {
    fn from(err: DomainError) -> Self {
        CheckoutError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for CheckoutError {
    fn from(err: serde_json::Error) -> Self {
        CheckoutError::Internal(format!("journal serialization: {err}"))
    }
}

/// Errors returned by cart mutations.
#[derive(Debug, Error)]
pub enum CartError {
    /// The quantity is outside the storable range.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(DomainError),

    /// The item does not exist in the caller's cart.
    #[error("Cart item not found: {item_id}")]
    ItemNotFound { item_id: CartItemId },

    /// A checkout or consolidation holds this cart.
    #[error("Cart is busy with another operation")]
    CartBusy,

    /// Storage was unavailable.
    #[error("Cart storage temporarily unavailable")]
    Unavailable,

    /// Storage failed permanently.
    #[error("Cart storage error: {0}")]
    Storage(String),
}

impl CartError {
    /// Returns the error's classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CartError::InvalidQuantity(_) | CartError::ItemNotFound { .. } => {
                ErrorKind::Validation
            }
            CartError::CartBusy => ErrorKind::Conflict,
            CartError::Unavailable => ErrorKind::Transient,
            CartError::Storage(_) => ErrorKind::Fatal,
        }
    }

    /// Returns a stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            CartError::InvalidQuantity(_) => "invalid_quantity",
            CartError::ItemNotFound { .. } => "item_not_found",
            CartError::CartBusy => "cart_busy",
            CartError::Unavailable => "cart_unavailable",
            CartError::Storage(_) => "internal",
        }
    }
}

impl From<StoreError> for CartError {
    fn from(err: StoreError) -> Self {
        match err {
            err if err.is_transient() => CartError::Unavailable,
            StoreError::Domain(domain) => CartError::InvalidQuantity(domain),
            StoreError::Conflict(_) => CartError::CartBusy,
            other => CartError::Storage(other.to_string()),
        }
    }
}

/// Errors returned when consolidating a guest cart into a user's cart.
#[derive(Debug, Error)]
pub enum ConsolidationError {
    /// One of the two carts is held by another operation.
    #[error("Cart is busy with another operation")]
    CartBusy,

    /// Merged quantities would exceed the storable range.
    #[error("Merged quantity out of range: {0}")]
    QuantityOverflow(DomainError),

    /// Storage was unavailable.
    #[error("Cart storage temporarily unavailable")]
    Unavailable,

    /// Storage failed permanently.
    #[error("Cart storage error: {0}")]
    Storage(String),
}

impl ConsolidationError {
    /// Returns the error's classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConsolidationError::CartBusy => ErrorKind::Conflict,
            ConsolidationError::QuantityOverflow(_) => ErrorKind::Validation,
            ConsolidationError::Unavailable => ErrorKind::Transient,
            ConsolidationError::Storage(_) => ErrorKind::Fatal,
        }
    }

    /// Returns a stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ConsolidationError::CartBusy => "cart_busy",
            ConsolidationError::QuantityOverflow(_) => "invalid_quantity",
            ConsolidationError::Unavailable => "cart_unavailable",
            ConsolidationError::Storage(_) => "internal",
        }
    }
}

impl From<StoreError> for ConsolidationError {
    fn from(err: StoreError) -> Self {
        match err {
            err if err.is_transient() => ConsolidationError::Unavailable,
            StoreError::Domain(domain) => ConsolidationError::QuantityOverflow(domain),
            StoreError::Conflict(_) => ConsolidationError::CartBusy,
            other => ConsolidationError::Storage(other.to_string()),
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
