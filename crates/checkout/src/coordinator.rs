//! Checkout coordinator: drives a cart through pricing, discount, payment and
//! persistence, and consolidates guest carts on sign-in.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use common::{AttemptId, GuestId, OrderId, UserId};
use domain::{Cart, CartOwner, CouponRejection, Money, Order, PricedLine};
use store::{
    CartStore, CheckoutJournal, ConsolidationOutcome, CouponStore, JournalEntry, OrderLedger,
    StoreError,
};
use tracing::Instrument;

use crate::attempt::CheckoutAttempt;
use crate::carts::CartService;
use crate::config::CheckoutConfig;
use crate::error::{CheckoutError, ConsolidationError, Result};
use crate::events::CheckoutEvent;
use crate::locks::{CartGuard, CartLocks};
use crate::retry::{with_retry, within};
use crate::services::{
    AuthorizationOutcome, Catalog, CouponError, CouponValidator, DiscountOutcome, GatewayFailure,
    PaymentAuthorizer, PaymentGateway, PriceResolver, PricingError,
};
use crate::state::CheckoutState;

/// Journal events after which an attempt is waiting on the payment step.
const PAYMENT_STEP_EVENTS: &[&str] = &["PaymentRequested", "PaymentAuthorized"];

/// Journal failure code for an attempt released by the stalled-attempt sweep.
const ABANDONED: &str = "abandoned";

/// Everything the coordinator needs from storage.
pub trait CheckoutStore:
    CartStore + OrderLedger + CouponStore + CheckoutJournal + Clone + 'static
{
}

impl<T> CheckoutStore for T where
    T: CartStore + OrderLedger + CouponStore + CheckoutJournal + Clone + 'static
{
}

/// A validated checkout request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    /// Client-chosen identifier; retrying with the same ID resumes the attempt.
    pub attempt_id: AttemptId,
    /// Whose cart is checked out. Must be a user.
    pub owner: CartOwner,
    pub coupon_code: Option<String>,
    /// Payment instrument reference; `None` places a manual/invoice order.
    pub payment_instrument: Option<String>,
}

impl CheckoutRequest {
    /// Creates a request for a user's cart without coupon or payment.
    pub fn new(attempt_id: AttemptId, user_id: UserId) -> Self {
        Self {
            attempt_id,
            owner: CartOwner::User(user_id),
            coupon_code: None,
            payment_instrument: None,
        }
    }

    pub fn with_coupon(mut self, code: impl Into<String>) -> Self {
        self.coupon_code = Some(code.into());
        self
    }

    pub fn with_payment(mut self, instrument: impl Into<String>) -> Self {
        self.payment_instrument = Some(instrument.into());
        self
    }
}

/// Orchestrates checkout attempts.
///
/// Each attempt is event-sourced into the checkout journal. Steps up to the
/// payment call run in the caller's future and can be cancelled freely; from
/// the payment call on, the attempt runs in its own task so that dropping
/// the caller cannot strand an authorization without an order or a void.
pub struct CheckoutCoordinator<S, C, G> {
    inner: Arc<Inner<S, C, G>>,
}

impl<S, C, G> Clone for CheckoutCoordinator<S, C, G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<S, C, G> {
    store: S,
    prices: PriceResolver<C>,
    coupons: CouponValidator<S>,
    payments: PaymentAuthorizer<G>,
    locks: CartLocks,
    config: CheckoutConfig,
}

impl<S, C, G> CheckoutCoordinator<S, C, G>
where
    S: CheckoutStore,
    C: Catalog + 'static,
    G: PaymentGateway + 'static,
{
    /// Creates a new checkout coordinator.
    pub fn new(store: S, catalog: C, gateway: G, config: CheckoutConfig) -> Self {
        let timeouts = &config.timeouts;
        let prices = PriceResolver::new(catalog, timeouts.pricing, config.retry.clone());
        let coupons = CouponValidator::new(store.clone(), timeouts.coupon, config.retry.clone());
        let payments = PaymentAuthorizer::new(gateway, timeouts.payment, config.retry.clone());

        Self {
            inner: Arc::new(Inner {
                store,
                prices,
                coupons,
                payments,
                locks: CartLocks::new(),
                config,
            }),
        }
    }

    /// Returns a cart service sharing this coordinator's cart locks.
    pub fn cart_service(&self) -> CartService<S> {
        CartService::new(self.inner.store.clone(), self.inner.locks.clone())
    }

    pub fn config(&self) -> &CheckoutConfig {
        &self.inner.config
    }

    /// Runs (or resumes) a checkout attempt and returns the placed order.
    #[tracing::instrument(
        skip(self, request),
        fields(attempt_id = %request.attempt_id, owner = %request.owner)
    )]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<Order> {
        metrics::counter!("checkout_attempts_total").increment(1);
        let started = Instant::now();

        let result = self.run(request).await;

        let duration = started.elapsed().as_secs_f64();
        metrics::histogram!("checkout_duration_seconds").record(duration);
        match &result {
            Ok(order) => {
                metrics::counter!("checkout_completed_total").increment(1);
                tracing::info!(order_id = %order.id, total = %order.total, duration, "checkout completed");
            }
            Err(err) => {
                metrics::counter!("checkout_failed_total", "reason" => err.code()).increment(1);
                tracing::warn!(code = err.code(), kind = %err.kind(), error = %err, "checkout failed");
            }
        }
        result
    }

    async fn run(&self, request: CheckoutRequest) -> Result<Order> {
        let CartOwner::User(user_id) = request.owner else {
            return Err(CheckoutError::GuestCheckout);
        };

        let guard = self.inner.locks.try_acquire(request.owner).ok_or_else(|| {
            metrics::counter!("cart_busy_total", "operation" => "checkout").increment(1);
            CheckoutError::CartBusy
        })?;

        let mut attempt = self.inner.load_attempt(request.attempt_id).await?;
        if let Some(owner) = attempt.user_id()
            && owner != user_id
        {
            return Err(CheckoutError::AttemptConflict {
                attempt_id: request.attempt_id,
            });
        }

        match attempt.state() {
            CheckoutState::Done => return self.inner.completed_order(&attempt).await,
            CheckoutState::Failed if attempt.holds_authorization() => {
                return Err(CheckoutError::AttemptFailed {
                    attempt_id: attempt.id(),
                    reason: attempt.failure_reason().unwrap_or("unknown").to_string(),
                });
            }
            state if state.is_past_payment() || state == CheckoutState::AuthorizationPending => {
                metrics::counter!("checkout_resumed_total").increment(1);
                tracing::info!(%state, generation = attempt.generation(), "resuming checkout attempt");
                return self.finish_detached(attempt, guard).await;
            }
            _ => {}
        }

        self.inner.prepare(&mut attempt, user_id, &request).await?;
        self.finish_detached(attempt, guard).await
    }

    /// Runs payment and persistence in a task that owns the cart lock.
    async fn finish_detached(&self, attempt: CheckoutAttempt, guard: CartGuard) -> Result<Order> {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(
            async move {
                let _guard = guard;
                inner.finish(attempt).await
            }
            .in_current_span(),
        );

        task.await
            .map_err(|err| CheckoutError::Internal(format!("checkout task failed: {err}")))?
    }

    /// Merges a guest's cart into a user's cart after sign-in.
    ///
    /// Both carts are locked for the duration; either being busy fails fast.
    #[tracing::instrument(skip(self))]
    pub async fn consolidate_cart(
        &self,
        guest_id: GuestId,
        user_id: UserId,
    ) -> std::result::Result<ConsolidationOutcome, ConsolidationError> {
        let Some(_guards) = self
            .inner
            .locks
            .try_acquire_pair(CartOwner::Guest(guest_id), CartOwner::User(user_id))
        else {
            metrics::counter!("cart_busy_total", "operation" => "consolidate").increment(1);
            metrics::counter!("cart_consolidations_total", "outcome" => "busy").increment(1);
            return Err(ConsolidationError::CartBusy);
        };

        let outcome = self
            .inner
            .call_store("consolidate", || self.inner.store.consolidate(guest_id, user_id))
            .await?;

        let label = match outcome {
            ConsolidationOutcome::NoGuestCart => "no_guest_cart",
            ConsolidationOutcome::Transferred { .. } => "transferred",
            ConsolidationOutcome::Merged { .. } => "merged",
        };
        metrics::counter!("cart_consolidations_total", "outcome" => label).increment(1);
        tracing::info!(?outcome, "guest cart consolidated");
        Ok(outcome)
    }

    /// Settles attempts that have waited on the payment step for longer than
    /// `older_than` and returns how many were settled.
    ///
    /// A pending authorization is resolved by re-sending its idempotency key.
    /// An attempt whose order already exists is completed; any other held
    /// authorization is voided and the attempt failed as abandoned. Attempts
    /// whose cart is busy are left for the next sweep.
    #[tracing::instrument(skip(self))]
    pub async fn release_stalled_attempts(&self, older_than: Duration) -> Result<usize> {
        let age = chrono::Duration::from_std(older_than)
            .map_err(|err| CheckoutError::Internal(format!("stale age out of range: {err}")))?;
        let cutoff = Utc::now() - age;
        let stalled = self
            .inner
            .storage("find_stalled", || {
                self.inner.store.stalled_attempts(PAYMENT_STEP_EVENTS, cutoff)
            })
            .await?;

        let mut settled = 0;
        for attempt_id in stalled {
            match self.inner.settle_stalled(attempt_id).await {
                Ok(Some(outcome)) => {
                    metrics::counter!("checkout_stalled_attempts_total", "outcome" => outcome)
                        .increment(1);
                    tracing::info!(%attempt_id, outcome, "stalled checkout attempt settled");
                    settled += 1;
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(%attempt_id, code = err.code(), error = %err, "could not settle stalled attempt");
                }
            }
        }
        Ok(settled)
    }

    /// Returns the journaled state of an attempt, if it was ever started.
    pub async fn attempt(&self, attempt_id: AttemptId) -> Result<Option<CheckoutAttempt>> {
        let attempt = self.inner.load_attempt(attempt_id).await?;
        Ok((!attempt.is_new()).then_some(attempt))
    }

    /// Returns an order if it belongs to `user_id`.
    pub async fn order_for_user(&self, user_id: UserId, order_id: OrderId) -> Result<Option<Order>> {
        let order = self
            .inner
            .storage("load_order", || self.inner.store.get_order(order_id))
            .await?;
        Ok(order.filter(|order| order.user_id == user_id))
    }

    /// Returns a user's orders, newest first.
    pub async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        self.inner
            .storage("load_orders", || self.inner.store.orders_for_user(user_id))
            .await
    }
}

impl<S, C, G> Inner<S, C, G>
where
    S: CheckoutStore,
    C: Catalog + 'static,
    G: PaymentGateway + 'static,
{
    async fn load_attempt(&self, attempt_id: AttemptId) -> Result<CheckoutAttempt> {
        let entries = self
            .storage("load_attempt", || self.store.entries(attempt_id))
            .await?;
        CheckoutAttempt::from_journal(attempt_id, entries)
    }

    async fn completed_order(&self, attempt: &CheckoutAttempt) -> Result<Order> {
        let order_id = attempt.order_id().ok_or_else(|| {
            CheckoutError::Internal("completed attempt has no order".to_string())
        })?;
        tracing::debug!(%order_id, "attempt already completed");
        self.storage("load_order", || self.store.get_order(order_id))
            .await?
            .ok_or_else(|| CheckoutError::Internal(format!("order {order_id} is missing")))
    }

    /// Steps 1 to 3: load the cart, price every line, apply the coupon.
    async fn prepare(
        &self,
        attempt: &mut CheckoutAttempt,
        user_id: UserId,
        request: &CheckoutRequest,
    ) -> Result<()> {
        tracing::info!(step = "load_cart", "checkout step started");
        let owner = request.owner;
        let cart = self
            .storage("load_cart", || self.store.find_cart(owner))
            .await?;
        let Some(cart) = cart.filter(|cart| !cart.is_empty()) else {
            return Err(CheckoutError::EmptyCart);
        };

        let coupon_code = request
            .coupon_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_string);
        self.record(
            attempt,
            vec![
                CheckoutEvent::attempt_started(
                    user_id,
                    cart.id,
                    coupon_code,
                    request.payment_instrument.clone(),
                ),
                CheckoutEvent::CartLoaded {
                    line_count: cart.items.len(),
                },
            ],
        )
        .await?;

        if let Err(err) = self.price_and_discount(attempt, &cart).await {
            self.fail(attempt, err.code()).await;
            return Err(err);
        }
        Ok(())
    }

    async fn price_and_discount(&self, attempt: &mut CheckoutAttempt, cart: &Cart) -> Result<()> {
        tracing::info!(step = "price_lines", lines = cart.items.len(), "checkout step started");
        let mut lines = Vec::with_capacity(cart.items.len());
        let mut subtotal = Money::zero();
        for item in &cart.items {
            let unit_price = self
                .prices
                .resolve_unit_price(&item.product_id, item.variant_id.as_ref())
                .await
                .map_err(|err| match err {
                    PricingError::ProductNotFound {
                        product_id,
                        variant_id,
                    } => CheckoutError::PricingFailed {
                        product_id,
                        variant_id,
                    },
                    PricingError::Unavailable(detail) => {
                        tracing::warn!(%detail, "catalog unavailable");
                        CheckoutError::CheckoutUnavailable { step: "pricing" }
                    }
                    PricingError::Malformed(err) => err.into(),
                })?;

            let line = PricedLine {
                product_id: item.product_id.clone(),
                variant_id: item.variant_id.clone(),
                quantity: item.quantity,
                unit_price,
            };
            subtotal = subtotal.checked_add(line.line_total()?)?;
            lines.push(line);
        }
        self.record(attempt, vec![CheckoutEvent::LinesPriced { lines, subtotal }])
            .await?;

        let (coupon_code, discount) = match attempt.coupon_code().map(str::to_string) {
            None => (None, Money::zero()),
            Some(code) => {
                tracing::info!(step = "apply_coupon", "checkout step started");
                match self.coupons.validate(&code, subtotal).await {
                    Ok(DiscountOutcome::Applied { code, discount, .. }) => (Some(code), discount),
                    Ok(DiscountOutcome::Rejected(CouponRejection::InvalidCode)) => {
                        return Err(CheckoutError::InvalidCoupon { code });
                    }
                    Ok(DiscountOutcome::Rejected(CouponRejection::Expired)) => {
                        return Err(CheckoutError::CouponExpired { code });
                    }
                    Err(CouponError::Unavailable(detail)) => {
                        tracing::warn!(%detail, "coupon store unavailable");
                        return Err(CheckoutError::CheckoutUnavailable { step: "coupon" });
                    }
                    Err(err) => return Err(CheckoutError::Internal(err.to_string())),
                }
            }
        };

        let total = subtotal.checked_sub(discount)?;
        self.record(
            attempt,
            vec![CheckoutEvent::DiscountApplied {
                coupon_code,
                discount,
                total,
            }],
        )
        .await
    }

    /// Steps 4 to 7. Runs to completion once started.
    async fn finish(&self, mut attempt: CheckoutAttempt) -> Result<Order> {
        if matches!(
            attempt.state(),
            CheckoutState::Discounted | CheckoutState::AuthorizationPending
        ) {
            self.authorize(&mut attempt).await?;
        }
        self.persist(&mut attempt).await
    }

    async fn authorize(&self, attempt: &mut CheckoutAttempt) -> Result<()> {
        let instrument = match attempt.payment_instrument() {
            Some(instrument) if !attempt.total().is_zero() => instrument.to_string(),
            _ => {
                tracing::info!(step = "authorize_payment", "no payment to authorize");
                return self.record(attempt, vec![CheckoutEvent::PaymentSkipped]).await;
            }
        };

        tracing::info!(step = "authorize_payment", "checkout step started");
        let currency = self.config.currency.clone();
        let idempotency_key = attempt.idempotency_key();
        if attempt.state() != CheckoutState::AuthorizationPending {
            self.record(
                attempt,
                vec![CheckoutEvent::PaymentRequested {
                    idempotency_key: idempotency_key.clone(),
                    amount: attempt.total(),
                    currency: currency.clone(),
                }],
            )
            .await?;
        }

        let outcome = self
            .payments
            .authorize(attempt.total(), &currency, &instrument, &idempotency_key)
            .await;

        match outcome {
            AuthorizationOutcome::Captured { reference } => {
                self.record(attempt, vec![CheckoutEvent::PaymentAuthorized { reference }])
                    .await
            }
            AuthorizationOutcome::Declined { reason } => {
                let err = CheckoutError::PaymentDeclined { reason };
                self.fail(attempt, err.code()).await;
                Err(err)
            }
            AuthorizationOutcome::GatewayError {
                failure: GatewayFailure::Permanent,
                ..
            } => {
                let err = CheckoutError::PaymentGatewayError;
                self.fail(attempt, err.code()).await;
                Err(err)
            }
            // Left pending: a retry re-sends the same idempotency key.
            AuthorizationOutcome::GatewayError {
                failure: GatewayFailure::Transient,
                ..
            } => Err(CheckoutError::CheckoutUnavailable { step: "payment" }),
        }
    }

    /// Steps 5 and 6 as one ledger transaction, replayable per attempt.
    async fn persist(&self, attempt: &mut CheckoutAttempt) -> Result<Order> {
        tracing::info!(step = "persist_order", "checkout step started");
        let cart_id = attempt
            .cart_id()
            .ok_or_else(|| CheckoutError::Internal("attempt has no cart".to_string()))?;
        let new_order = attempt.new_order(&self.config.currency)?;

        let placed = self
            .call_store("place_order", || {
                self.store.place_order(new_order.clone(), cart_id)
            })
            .await;

        let order = match placed {
            Ok(order) => order,
            Err(err) if err.is_transient() => {
                let unavailable = CheckoutError::CheckoutUnavailable { step: "persist" };
                // The last try may have committed before its answer was lost.
                match self.store.find_order_by_attempt(attempt.id()).await {
                    Ok(Some(order)) => order,
                    Ok(None) => {
                        tracing::warn!(error = %err, "order store unavailable; releasing payment");
                        self.release_payment(attempt).await;
                        self.fail(attempt, unavailable.code()).await;
                        return Err(unavailable);
                    }
                    Err(lookup) => {
                        // Outcome unknown; the stalled-attempt sweep settles it.
                        tracing::warn!(error = %err, %lookup, "order store unreachable; attempt left for the sweep");
                        return Err(unavailable);
                    }
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "order persistence failed");
                let mapped = match err {
                    StoreError::NotFound { .. } => CheckoutError::EmptyCart,
                    other => CheckoutError::from_store("persist", other),
                };
                self.release_payment(attempt).await;
                self.fail(attempt, mapped.code()).await;
                return Err(mapped);
            }
        };

        let mut events = Vec::with_capacity(3);
        if !matches!(
            attempt.state(),
            CheckoutState::Persisted | CheckoutState::CartCleared
        ) {
            events.push(CheckoutEvent::OrderPersisted { order_id: order.id });
        }
        if attempt.state() != CheckoutState::CartCleared {
            events.push(CheckoutEvent::CartCleared);
        }
        events.push(CheckoutEvent::attempt_completed(order.id));

        if let Err(err) = self.record(attempt, events).await {
            tracing::warn!(order_id = %order.id, error = %err, "order placed but attempt journal is behind");
        }
        Ok(order)
    }

    /// Settles one attempt found waiting on the payment step. Returns the
    /// outcome label, or `None` if the attempt was left alone.
    async fn settle_stalled(&self, attempt_id: AttemptId) -> Result<Option<&'static str>> {
        let Some(user_id) = self.load_attempt(attempt_id).await?.user_id() else {
            return Ok(None);
        };
        let Some(_guard) = self.locks.try_acquire(CartOwner::User(user_id)) else {
            tracing::debug!(%attempt_id, "cart busy; stalled attempt skipped");
            return Ok(None);
        };

        // Reload under the lock; a resumed request may have moved it on.
        let mut attempt = self.load_attempt(attempt_id).await?;
        match attempt.state() {
            CheckoutState::AuthorizationPending => {
                let instrument = attempt.payment_instrument().unwrap_or_default().to_string();
                let outcome = self
                    .payments
                    .authorize(
                        attempt.total(),
                        &self.config.currency,
                        &instrument,
                        &attempt.idempotency_key(),
                    )
                    .await;
                match outcome {
                    AuthorizationOutcome::Captured { reference } => {
                        let event = CheckoutEvent::PaymentAuthorized { reference };
                        self.record(&mut attempt, vec![event]).await?;
                    }
                    AuthorizationOutcome::GatewayError {
                        failure: GatewayFailure::Transient,
                        ..
                    } => return Ok(None),
                    AuthorizationOutcome::Declined { .. }
                    | AuthorizationOutcome::GatewayError { .. } => {}
                }
            }
            CheckoutState::Authorized => {
                let existing = self
                    .storage("find_order", || self.store.find_order_by_attempt(attempt_id))
                    .await?;
                if existing.is_some() {
                    self.persist(&mut attempt).await?;
                    return Ok(Some("completed"));
                }
            }
            _ => return Ok(None),
        }

        self.release_payment(&mut attempt).await;
        self.fail(&mut attempt, ABANDONED).await;
        Ok(Some("released"))
    }

    /// Voids a held authorization. A failed void is journaled and logged; the
    /// caller's error still wins.
    async fn release_payment(&self, attempt: &mut CheckoutAttempt) {
        if !attempt.holds_authorization() {
            return;
        }
        let reference = attempt.payment_reference().unwrap_or_default().to_string();

        tracing::info!(step = "void_payment", %reference, "checkout step started");
        let event = match self.payments.void(&reference).await {
            Ok(()) => CheckoutEvent::PaymentVoided { reference },
            Err(err) => {
                tracing::error!(%reference, error = %err, "void failed; authorization is still held");
                CheckoutEvent::PaymentVoidFailed {
                    reference,
                    error: err.to_string(),
                }
            }
        };

        if let Err(err) = self.record(attempt, vec![event]).await {
            tracing::error!(error = %err, "failed to journal void outcome");
        }
    }

    /// Journals the attempt as failed with a stable error code.
    async fn fail(&self, attempt: &mut CheckoutAttempt, code: &'static str) {
        if let Err(err) = self
            .record(attempt, vec![CheckoutEvent::attempt_failed(code)])
            .await
        {
            tracing::warn!(error = %err, "failed to journal checkout failure");
        }
    }

    /// Appends `events` after the attempt's last sequence and applies them.
    ///
    /// Appends are not retried: a lost answer would turn the retry into a
    /// sequence conflict.
    async fn record(&self, attempt: &mut CheckoutAttempt, events: Vec<CheckoutEvent>) -> Result<()> {
        let expected = attempt.sequence();
        let mut next = expected;
        let mut entries = Vec::with_capacity(events.len());
        for event in &events {
            next = next.next();
            let entry = JournalEntry::builder()
                .attempt_id(attempt.id())
                .sequence(next)
                .event_type(event.event_type())
                .payload(event)?
                .try_build()
                .ok_or_else(|| CheckoutError::Internal("incomplete journal entry".to_string()))?;
            entries.push(entry);
        }
        let sequences: Vec<_> = entries.iter().map(|entry| entry.sequence).collect();

        let limit = self.config.timeouts.storage;
        within(limit, self.store.append(entries, expected))
            .await
            .unwrap_or_else(|| Err(unanswered(limit)))
            .map_err(|err| CheckoutError::from_store("journal", err))?;

        for (event, sequence) in events.into_iter().zip(sequences) {
            attempt.record(event, sequence);
        }
        Ok(())
    }

    /// Runs a store call with the storage timeout and retry policy.
    async fn call_store<T, F, Fut>(&self, operation: &'static str, mut call: F) -> store::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = store::Result<T>>,
    {
        let limit = self.config.timeouts.storage;
        let result = with_retry(&self.config.retry, "storage", || {
            let pending = call();
            async move {
                within(limit, pending)
                    .await
                    .unwrap_or_else(|| Err(unanswered(limit)))
            }
        })
        .await;

        if let Err(err) = &result {
            tracing::debug!(operation, error = %err, "store call failed");
        }
        result
    }

    async fn storage<T, F, Fut>(&self, step: &'static str, call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = store::Result<T>>,
    {
        self.call_store(step, call)
            .await
            .map_err(|err| CheckoutError::from_store(step, err))
    }
}

fn unanswered(limit: Duration) -> StoreError {
    StoreError::Unavailable(format!("no answer within {limit:?}"))
}
