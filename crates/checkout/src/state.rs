//! Checkout attempt state machine.

use serde::{Deserialize, Serialize};

/// The state of a checkout attempt.
///
/// State transitions:
/// ```text
/// Start ──► CartLoaded ──► Priced ──► Discounted ──┬──► AuthorizationPending ──► Authorized
///                                                  └──────────────────────────► Authorized (no payment)
/// Authorized ──► Persisted ──► CartCleared ──► Done
///
/// any non-terminal state ──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CheckoutState {
    /// Attempt recorded; nothing read yet.
    #[default]
    Start,

    /// The cart was loaded and is not empty.
    CartLoaded,

    /// Every line has a captured unit price.
    Priced,

    /// The coupon (if any) has been applied and the total fixed.
    Discounted,

    /// An authorization request was sent and its outcome is not yet recorded.
    AuthorizationPending,

    /// Payment was captured, or skipped for an order without an instrument.
    Authorized,

    /// The order and its lines were written.
    Persisted,

    /// The source cart was emptied.
    CartCleared,

    /// The attempt finished successfully (terminal state).
    Done,

    /// The attempt failed (terminal state).
    Failed,
}

impl CheckoutState {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckoutState::Done | CheckoutState::Failed)
    }

    /// Returns true if payment is settled and the attempt can resume at persistence.
    pub fn is_past_payment(&self) -> bool {
        matches!(
            self,
            CheckoutState::Authorized | CheckoutState::Persisted | CheckoutState::CartCleared
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutState::Start => "Start",
            CheckoutState::CartLoaded => "CartLoaded",
            CheckoutState::Priced => "Priced",
            CheckoutState::Discounted => "Discounted",
            CheckoutState::AuthorizationPending => "AuthorizationPending",
            CheckoutState::Authorized => "Authorized",
            CheckoutState::Persisted => "Persisted",
            CheckoutState::CartCleared => "CartCleared",
            CheckoutState::Done => "Done",
            CheckoutState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
