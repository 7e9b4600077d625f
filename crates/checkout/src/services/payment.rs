//! Payment gateway trait, in-memory implementation and the payment authorizer.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use domain::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::{RetryPolicy, Transient, with_retry, within};

/// Whether a gateway failure may clear up on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayFailure {
    Transient,
    Permanent,
}

/// A request to authorize (and capture) a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    /// Amount in the currency's minor unit.
    pub amount_minor: i64,
    pub currency: String,
    /// Client-presented reference to a payment instrument.
    pub instrument_ref: String,
    /// Repeating a request with the same key must not charge twice.
    pub idempotency_key: String,
}

/// Outcome of an authorization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    /// Funds were captured; `reference` identifies the authorization for voids.
    Captured { reference: String },
    /// The instrument was refused.
    Declined { reason: String },
    /// The gateway failed; `detail` is for logs only.
    GatewayError {
        failure: GatewayFailure,
        detail: String,
    },
}

impl AuthorizationOutcome {
    fn label(&self) -> &'static str {
        match self {
            AuthorizationOutcome::Captured { .. } => "captured",
            AuthorizationOutcome::Declined { .. } => "declined",
            AuthorizationOutcome::GatewayError {
                failure: GatewayFailure::Transient,
                ..
            } => "transient_error",
            AuthorizationOutcome::GatewayError {
                failure: GatewayFailure::Permanent,
                ..
            } => "permanent_error",
        }
    }
}

/// A void request failed.
#[derive(Debug, Clone, Error)]
#[error("Void failed ({failure:?}): {detail}")]
pub struct VoidError {
    pub failure: GatewayFailure,
    pub detail: String,
}

impl Transient for VoidError {
    fn is_transient(&self) -> bool {
        self.failure == GatewayFailure::Transient
    }
}

/// External payment gateway operations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Authorizes a payment.
    async fn authorize(&self, request: &AuthorizationRequest) -> AuthorizationOutcome;

    /// Releases a previous authorization.
    async fn void(&self, reference: &str) -> Result<(), VoidError>;
}

/// Transient gateway error carried through the retry loop.
#[derive(Debug)]
struct TransientGatewayError(String);

impl std::fmt::Display for TransientGatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Transient for TransientGatewayError {
    fn is_transient(&self) -> bool {
        true
    }
}

/// Calls the payment gateway with timeouts and bounded retries.
#[derive(Debug, Clone)]
pub struct PaymentAuthorizer<G> {
    gateway: G,
    timeout: Duration,
    retry: RetryPolicy,
}

impl<G: PaymentGateway> PaymentAuthorizer<G> {
    /// Creates a new payment authorizer.
    pub fn new(gateway: G, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            gateway,
            timeout,
            retry,
        }
    }

    /// Authorizes `amount`, retrying transient gateway errors and timeouts.
    ///
    /// Every try reuses `idempotency_key`, so a retry after a lost response
    /// cannot charge twice.
    #[tracing::instrument(skip(self, amount, instrument_ref), fields(amount = %amount))]
    pub async fn authorize(
        &self,
        amount: Money,
        currency: &str,
        instrument_ref: &str,
        idempotency_key: &str,
    ) -> AuthorizationOutcome {
        let request = AuthorizationRequest {
            amount_minor: amount.cents(),
            currency: currency.to_string(),
            instrument_ref: instrument_ref.to_string(),
            idempotency_key: idempotency_key.to_string(),
        };

        let result = with_retry(&self.retry, "payment_authorize", || async {
            match within(self.timeout, self.gateway.authorize(&request)).await {
                Some(AuthorizationOutcome::GatewayError {
                    failure: GatewayFailure::Transient,
                    detail,
                }) => Err(TransientGatewayError(detail)),
                Some(outcome) => Ok(outcome),
                None => Err(TransientGatewayError(format!(
                    "no answer within {:?}",
                    self.timeout
                ))),
            }
        })
        .await;

        let outcome = result.unwrap_or_else(|err| AuthorizationOutcome::GatewayError {
            failure: GatewayFailure::Transient,
            detail: err.0,
        });

        metrics::counter!("payment_authorizations_total", "outcome" => outcome.label())
            .increment(1);
        if let AuthorizationOutcome::GatewayError { detail, .. } = &outcome {
            tracing::warn!(%detail, "payment gateway error");
        }
        outcome
    }

    /// Voids an authorization, retrying transient failures.
    #[tracing::instrument(skip(self))]
    pub async fn void(&self, reference: &str) -> Result<(), VoidError> {
        let result = with_retry(&self.retry, "payment_void", || async {
            match within(self.timeout, self.gateway.void(reference)).await {
                Some(result) => result,
                None => Err(VoidError {
                    failure: GatewayFailure::Transient,
                    detail: format!("no answer within {:?}", self.timeout),
                }),
            }
        })
        .await;

        let label = if result.is_ok() { "voided" } else { "failed" };
        metrics::counter!("payment_voids_total", "outcome" => label).increment(1);
        result
    }
}

/// A scripted response for the in-memory gateway's next authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedAuthorization {
    Decline(String),
    TransientError,
    PermanentError,
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    by_key: HashMap<String, String>,
    amounts: HashMap<String, i64>,
    active: HashSet<String>,
    script: VecDeque<ScriptedAuthorization>,
    authorize_calls: usize,
    void_calls: usize,
    next_id: u32,
    fail_voids: bool,
    delay: Option<Duration>,
}

/// In-memory payment gateway for tests and the demo binary.
///
/// Deduplicates authorizations by idempotency key, the way real gateways do.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<Mutex<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory payment gateway.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryGatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a response for a future authorization that is not a replay.
    pub fn script(&self, response: ScriptedAuthorization) {
        self.state().script.push_back(response);
    }

    /// Makes every void call fail permanently.
    pub fn set_fail_voids(&self, fail: bool) {
        self.state().fail_voids = fail;
    }

    /// Delays every authorization, to exercise timeouts and cancellation.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state().delay = delay;
    }

    /// Returns how many times `authorize` was called.
    pub fn authorize_calls(&self) -> usize {
        self.state().authorize_calls
    }

    /// Returns how many times `void` was called.
    pub fn void_calls(&self) -> usize {
        self.state().void_calls
    }

    /// Returns the number of distinct captures ever made.
    pub fn capture_count(&self) -> usize {
        self.state().by_key.len()
    }

    /// Returns the number of captures not voided.
    pub fn active_authorizations(&self) -> usize {
        self.state().active.len()
    }

    /// Returns the captured amount for a reference.
    pub fn captured_amount(&self, reference: &str) -> Option<i64> {
        self.state().amounts.get(reference).copied()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn authorize(&self, request: &AuthorizationRequest) -> AuthorizationOutcome {
        let delay = {
            let mut state = self.state();
            state.authorize_calls += 1;
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if let Some(reference) = state.by_key.get(&request.idempotency_key) {
            return AuthorizationOutcome::Captured {
                reference: reference.clone(),
            };
        }

        match state.script.pop_front() {
            Some(ScriptedAuthorization::Decline(reason)) => {
                return AuthorizationOutcome::Declined { reason };
            }
            Some(ScriptedAuthorization::TransientError) => {
                return AuthorizationOutcome::GatewayError {
                    failure: GatewayFailure::Transient,
                    detail: "gateway timeout (503)".to_string(),
                };
            }
            Some(ScriptedAuthorization::PermanentError) => {
                return AuthorizationOutcome::GatewayError {
                    failure: GatewayFailure::Permanent,
                    detail: "merchant account disabled".to_string(),
                };
            }
            None => {}
        }

        state.next_id += 1;
        let reference = format!("PAY-{:04}", state.next_id);
        state
            .by_key
            .insert(request.idempotency_key.clone(), reference.clone());
        state
            .amounts
            .insert(reference.clone(), request.amount_minor);
        state.active.insert(reference.clone());

        AuthorizationOutcome::Captured { reference }
    }

    async fn void(&self, reference: &str) -> Result<(), VoidError> {
        let mut state = self.state();
        state.void_calls += 1;
        if state.fail_voids {
            return Err(VoidError {
                failure: GatewayFailure::Permanent,
                detail: "void rejected".to_string(),
            });
        }
        state.active.remove(reference);
        Ok(())
    }
}
