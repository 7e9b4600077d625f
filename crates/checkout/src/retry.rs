//! Bounded retry with exponential backoff, and per-call timeouts.

use std::future::Future;
use std::time::Duration;

/// How many times, and how patiently, a transient failure is retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of tries, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Factor applied to the delay after each retry.
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        Duration::from_secs_f64(
            (current.as_secs_f64() * self.backoff_factor).min(self.max_backoff.as_secs_f64()),
        )
    }
}

/// Errors that can tell whether retrying may help.
pub trait Transient {
    /// Returns true if the same call may succeed later.
    fn is_transient(&self) -> bool;
}

impl Transient for store::StoreError {
    fn is_transient(&self) -> bool {
        store::StoreError::is_transient(self)
    }
}

/// Runs `operation` until it succeeds, fails permanently, or the policy is exhausted.
///
/// `operation_name` labels the `collaborator_retries_total` counter.
pub async fn with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &'static str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + std::fmt::Display,
{
    let mut delay = policy.initial_backoff;
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(operation = operation_name, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                if attempt >= policy.max_attempts || !err.is_transient() {
                    return Err(err);
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    error = %err,
                    ?delay,
                    "transient failure, retrying"
                );
                metrics::counter!("collaborator_retries_total", "operation" => operation_name)
                    .increment(1);

                tokio::time::sleep(delay).await;
                delay = policy.next_backoff(delay);
            }
        }
    }
}

/// Awaits `future`, returning `None` if `limit` elapses first.
pub async fn within<F: Future>(limit: Duration, future: F) -> Option<F::Output> {
    tokio::time::timeout(limit, future).await.ok()
}
