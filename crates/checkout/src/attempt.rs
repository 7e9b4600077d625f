//! Checkout attempt, folded from its journal.

use common::{AttemptId, CartId, OrderId, UserId};
use domain::{Money, NewOrder, PricedLine};
use store::{JournalEntry, Sequence};

use crate::error::CheckoutError;
use crate::events::CheckoutEvent;
use crate::state::CheckoutState;

/// An event-sourced checkout attempt.
///
/// Rebuilt from the journal on every call with the same attempt ID, which
/// is what lets a retried request resume instead of starting over.
#[derive(Debug, Clone)]
pub struct CheckoutAttempt {
    id: AttemptId,
    sequence: Sequence,
    generation: u32,
    state: CheckoutState,
    user_id: Option<UserId>,
    cart_id: Option<CartId>,
    coupon_code: Option<String>,
    payment_instrument: Option<String>,
    lines: Vec<PricedLine>,
    subtotal: Money,
    discount: Money,
    total: Money,
    payment_reference: Option<String>,
    payment_voided: bool,
    order_id: Option<OrderId>,
    failure_reason: Option<String>,
}

impl CheckoutAttempt {
    /// Creates an attempt with an empty journal.
    pub fn new(id: AttemptId) -> Self {
        Self {
            id,
            sequence: Sequence::initial(),
            generation: 0,
            state: CheckoutState::Start,
            user_id: None,
            cart_id: None,
            coupon_code: None,
            payment_instrument: None,
            lines: Vec::new(),
            subtotal: Money::zero(),
            discount: Money::zero(),
            total: Money::zero(),
            payment_reference: None,
            payment_voided: false,
            order_id: None,
            failure_reason: None,
        }
    }

    /// Rebuilds an attempt from its journal entries.
    pub fn from_journal(id: AttemptId, entries: Vec<JournalEntry>) -> Result<Self, CheckoutError> {
        let mut attempt = Self::new(id);
        for entry in entries {
            let event: CheckoutEvent = serde_json::from_value(entry.payload)?;
            attempt.apply(event);
            attempt.sequence = entry.sequence;
        }
        Ok(attempt)
    }

    /// Applies one event.
    pub fn apply(&mut self, event: CheckoutEvent) {
        match event {
            CheckoutEvent::AttemptStarted {
                user_id,
                cart_id,
                coupon_code,
                payment_instrument,
                ..
            } => {
                let sequence = self.sequence;
                let generation = self.generation + 1;
                *self = Self::new(self.id);
                self.sequence = sequence;
                self.generation = generation;
                self.user_id = Some(user_id);
                self.cart_id = Some(cart_id);
                self.coupon_code = coupon_code;
                self.payment_instrument = payment_instrument;
            }
            CheckoutEvent::CartLoaded { .. } => {
                self.state = CheckoutState::CartLoaded;
            }
            CheckoutEvent::LinesPriced { lines, subtotal } => {
                self.lines = lines;
                self.subtotal = subtotal;
                self.state = CheckoutState::Priced;
            }
            CheckoutEvent::DiscountApplied {
                coupon_code,
                discount,
                total,
            } => {
                self.coupon_code = coupon_code;
                self.discount = discount;
                self.total = total;
                self.state = CheckoutState::Discounted;
            }
            CheckoutEvent::PaymentRequested { .. } => {
                self.state = CheckoutState::AuthorizationPending;
            }
            CheckoutEvent::PaymentAuthorized { reference } => {
                self.payment_reference = Some(reference);
                self.state = CheckoutState::Authorized;
            }
            CheckoutEvent::PaymentSkipped => {
                self.state = CheckoutState::Authorized;
            }
            CheckoutEvent::OrderPersisted { order_id } => {
                self.order_id = Some(order_id);
                self.state = CheckoutState::Persisted;
            }
            CheckoutEvent::CartCleared => {
                self.state = CheckoutState::CartCleared;
            }
            CheckoutEvent::AttemptCompleted { order_id, .. } => {
                self.order_id = Some(order_id);
                self.state = CheckoutState::Done;
            }
            CheckoutEvent::AttemptFailed { reason, .. } => {
                self.failure_reason = Some(reason);
                self.state = CheckoutState::Failed;
            }
            CheckoutEvent::PaymentVoided { .. } => {
                self.payment_voided = true;
            }
            CheckoutEvent::PaymentVoidFailed { .. } => {
                // The authorization is still held; nothing else changes.
            }
        }
    }

    /// Records that `event` was appended at `sequence`.
    pub(crate) fn record(&mut self, event: CheckoutEvent, sequence: Sequence) {
        self.apply(event);
        self.sequence = sequence;
    }

    /// Returns the write model for the order this attempt produces.
    pub fn new_order(&self, currency: &str) -> Result<NewOrder, CheckoutError> {
        let user_id = self
            .user_id
            .ok_or_else(|| CheckoutError::Internal("attempt has no user".to_string()))?;
        Ok(NewOrder {
            attempt_id: self.id,
            user_id,
            lines: self.lines.clone(),
            subtotal: self.subtotal,
            discount: self.discount,
            coupon_code: self.coupon_code.clone(),
            total: self.total,
            currency: currency.to_string(),
            payment_reference: self.payment_reference.clone(),
        })
    }
}

// Query methods
impl CheckoutAttempt {
    pub fn id(&self) -> AttemptId {
        self.id
    }

    /// Returns the sequence of the last journaled event.
    pub fn sequence(&self) -> Sequence {
        self.sequence
    }

    /// Returns how many times the attempt has been (re)started.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn state(&self) -> CheckoutState {
        self.state
    }

    /// Returns true if nothing was ever journaled for this attempt.
    pub fn is_new(&self) -> bool {
        self.generation == 0
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn cart_id(&self) -> Option<CartId> {
        self.cart_id
    }

    pub fn coupon_code(&self) -> Option<&str> {
        self.coupon_code.as_deref()
    }

    pub fn payment_instrument(&self) -> Option<&str> {
        self.payment_instrument.as_deref()
    }

    pub fn lines(&self) -> &[PricedLine] {
        &self.lines
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn discount(&self) -> Money {
        self.discount
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn payment_reference(&self) -> Option<&str> {
        self.payment_reference.as_deref()
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Returns true if a captured payment has not been voided.
    pub fn holds_authorization(&self) -> bool {
        self.payment_reference.is_some() && !self.payment_voided
    }

    /// Returns the gateway idempotency key for the current generation.
    pub fn idempotency_key(&self) -> String {
        format!("checkout-{}-{}", self.id, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{ProductId, Quantity};

    fn started(user_id: UserId) -> CheckoutEvent {
        CheckoutEvent::attempt_started(user_id, CartId::new(), None, Some("tok".to_string()))
    }

    fn priced() -> CheckoutEvent {
        CheckoutEvent::LinesPriced {
            lines: vec![PricedLine {
                product_id: ProductId::new("SKU-001"),
                variant_id: None,
                quantity: Quantity::new(2).unwrap(),
                unit_price: Money::from_cents(1000),
            }],
            subtotal: Money::from_cents(2000),
        }
    }

    #[test]
    fn test_new_attempt() {
        let attempt = CheckoutAttempt::new(AttemptId::new());
        assert!(attempt.is_new());
        assert_eq!(attempt.state(), CheckoutState::Start);
        assert_eq!(attempt.sequence(), Sequence::initial());
    }

    #[test]
    fn test_happy_path_fold() {
        let user_id = UserId::new();
        let mut attempt = CheckoutAttempt::new(AttemptId::new());

        attempt.apply(started(user_id));
        attempt.apply(CheckoutEvent::CartLoaded { line_count: 1 });
        attempt.apply(priced());
        attempt.apply(CheckoutEvent::DiscountApplied {
            coupon_code: Some("SAVE10".to_string()),
            discount: Money::from_cents(200),
            total: Money::from_cents(1800),
        });
        attempt.apply(CheckoutEvent::PaymentRequested {
            idempotency_key: attempt.idempotency_key(),
            amount: Money::from_cents(1800),
            currency: "USD".to_string(),
        });
        assert_eq!(attempt.state(), CheckoutState::AuthorizationPending);

        attempt.apply(CheckoutEvent::PaymentAuthorized {
            reference: "PAY-0001".to_string(),
        });
        assert!(attempt.holds_authorization());

        let order = attempt.new_order("USD").unwrap();
        assert_eq!(order.user_id, user_id);
        assert_eq!(order.total, Money::from_cents(1800));
        assert_eq!(order.payment_reference.as_deref(), Some("PAY-0001"));

        let order_id = OrderId::new();
        attempt.apply(CheckoutEvent::OrderPersisted { order_id });
        attempt.apply(CheckoutEvent::CartCleared);
        attempt.apply(CheckoutEvent::attempt_completed(order_id));
        assert_eq!(attempt.state(), CheckoutState::Done);
        assert_eq!(attempt.order_id(), Some(order_id));
    }

    #[test]
    fn test_void_releases_authorization() {
        let mut attempt = CheckoutAttempt::new(AttemptId::new());
        attempt.apply(started(UserId::new()));
        attempt.apply(CheckoutEvent::PaymentAuthorized {
            reference: "PAY-0001".to_string(),
        });
        attempt.apply(CheckoutEvent::PaymentVoidFailed {
            reference: "PAY-0001".to_string(),
            error: "timeout".to_string(),
        });
        assert!(attempt.holds_authorization());

        attempt.apply(CheckoutEvent::PaymentVoided {
            reference: "PAY-0001".to_string(),
        });
        assert!(!attempt.holds_authorization());
    }

    #[test]
    fn test_restart_bumps_generation_and_key() {
        let user_id = UserId::new();
        let mut attempt = CheckoutAttempt::new(AttemptId::new());

        attempt.apply(started(user_id));
        attempt.apply(priced());
        attempt.apply(CheckoutEvent::attempt_failed("payment_declined"));
        let first_key = attempt.idempotency_key();
        assert_eq!(attempt.state(), CheckoutState::Failed);

        attempt.apply(started(user_id));
        assert_eq!(attempt.generation(), 2);
        assert_eq!(attempt.state(), CheckoutState::Start);
        assert!(attempt.lines().is_empty());
        assert!(attempt.failure_reason().is_none());
        assert_ne!(attempt.idempotency_key(), first_key);
        assert!(attempt.idempotency_key().ends_with("-2"));
    }

    #[test]
    fn test_from_journal_tracks_sequence() {
        let id = AttemptId::new();
        let entries: Vec<JournalEntry> = [started(UserId::new()), priced()]
            .iter()
            .enumerate()
            .map(|(i, event)| {
                JournalEntry::builder()
                    .attempt_id(id)
                    .sequence(Sequence::new(i as i64 + 1))
                    .event_type(event.event_type())
                    .payload(event)
                    .unwrap()
                    .try_build()
                    .unwrap()
            })
            .collect();

        let attempt = CheckoutAttempt::from_journal(id, entries).unwrap();
        assert_eq!(attempt.sequence(), Sequence::new(2));
        assert_eq!(attempt.state(), CheckoutState::Priced);
        assert_eq!(attempt.subtotal(), Money::from_cents(2000));
    }
}
