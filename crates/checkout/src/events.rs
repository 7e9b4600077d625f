//! Checkout attempt journal events.

use chrono::{DateTime, Utc};
use common::{CartId, OrderId, UserId};
use domain::{Money, PricedLine};
use serde::{Deserialize, Serialize};

/// Events recorded while a checkout attempt runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CheckoutEvent {
    /// A new generation of the attempt started.
    AttemptStarted {
        user_id: UserId,
        cart_id: CartId,
        coupon_code: Option<String>,
        payment_instrument: Option<String>,
        started_at: DateTime<Utc>,
    },

    /// The cart was loaded and had lines.
    CartLoaded { line_count: usize },

    /// Every line was priced.
    LinesPriced {
        lines: Vec<PricedLine>,
        subtotal: Money,
    },

    /// The total was fixed, with or without a coupon.
    DiscountApplied {
        coupon_code: Option<String>,
        discount: Money,
        total: Money,
    },

    /// An authorization request is about to be sent.
    PaymentRequested {
        idempotency_key: String,
        amount: Money,
        currency: String,
    },

    /// The gateway captured the payment.
    PaymentAuthorized { reference: String },

    /// No payment instrument was supplied.
    PaymentSkipped,

    /// The order and its lines were written.
    OrderPersisted { order_id: OrderId },

    /// The source cart was emptied.
    CartCleared,

    /// The attempt completed.
    AttemptCompleted {
        order_id: OrderId,
        completed_at: DateTime<Utc>,
    },

    /// The attempt failed. `reason` is the stable code of the error that
    /// ended it; details stay in the logs.
    AttemptFailed {
        reason: String,
        failed_at: DateTime<Utc>,
    },

    /// A captured payment was voided after a later failure.
    PaymentVoided { reference: String },

    /// Voiding a captured payment failed; the authorization may still be held.
    PaymentVoidFailed { reference: String, error: String },
}

impl CheckoutEvent {
    /// Returns the event type name as stored in the journal.
    pub fn event_type(&self) -> &'static str {
        match self {
            CheckoutEvent::AttemptStarted { .. } => "AttemptStarted",
            CheckoutEvent::CartLoaded { .. } => "CartLoaded",
            CheckoutEvent::LinesPriced { .. } => "LinesPriced",
            CheckoutEvent::DiscountApplied { .. } => "DiscountApplied",
            CheckoutEvent::PaymentRequested { .. } => "PaymentRequested",
            CheckoutEvent::PaymentAuthorized { .. } => "PaymentAuthorized",
            CheckoutEvent::PaymentSkipped => "PaymentSkipped",
            CheckoutEvent::OrderPersisted { .. } => "OrderPersisted",
            CheckoutEvent::CartCleared => "CartCleared",
            CheckoutEvent::AttemptCompleted { .. } => "AttemptCompleted",
            CheckoutEvent::AttemptFailed { .. } => "AttemptFailed",
            CheckoutEvent::PaymentVoided { .. } => "PaymentVoided",
            CheckoutEvent::PaymentVoidFailed { .. } => "PaymentVoidFailed",
        }
    }
}

// Constructor helpers
impl CheckoutEvent {
    pub fn attempt_started(
        user_id: UserId,
        cart_id: CartId,
        coupon_code: Option<String>,
        payment_instrument: Option<String>,
    ) -> Self {
        CheckoutEvent::AttemptStarted {
            user_id,
            cart_id,
            coupon_code,
            payment_instrument,
            started_at: Utc::now(),
        }
    }

    pub fn attempt_completed(order_id: OrderId) -> Self {
        CheckoutEvent::AttemptCompleted {
            order_id,
            completed_at: Utc::now(),
        }
    }

    pub fn attempt_failed(reason: impl Into<String>) -> Self {
        CheckoutEvent::AttemptFailed {
            reason: reason.into(),
            failed_at: Utc::now(),
        }
    }
}
