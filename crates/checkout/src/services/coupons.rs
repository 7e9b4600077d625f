//! Coupon validation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use domain::{CouponRejection, DiscountPercent, DomainError, Money};
use store::{CouponStore, StoreError};
use thiserror::Error;

use crate::retry::{RetryPolicy, Transient, with_retry, within};

/// Result of validating a coupon against a subtotal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscountOutcome {
    /// The coupon applies; `discount` is already rounded to minor units.
    Applied {
        code: String,
        percent: DiscountPercent,
        discount: Money,
    },
    /// The coupon cannot be applied.
    Rejected(CouponRejection),
}

/// The coupon store failed to answer.
#[derive(Debug, Error)]
pub enum CouponError {
    #[error("Coupon store unavailable: {0}")]
    Unavailable(String),

    #[error("Coupon store error: {0}")]
    Storage(String),

    #[error("Malformed discount: {0}")]
    Malformed(DomainError),
}

impl Transient for CouponError {
    fn is_transient(&self) -> bool {
        matches!(self, CouponError::Unavailable(_))
    }
}

impl From<StoreError> for CouponError {
    fn from(err: StoreError) -> Self {
        if err.is_transient() {
            CouponError::Unavailable(err.to_string())
        } else {
            CouponError::Storage(err.to_string())
        }
    }
}

/// Validates coupon codes and computes discounts.
#[derive(Debug, Clone)]
pub struct CouponValidator<S> {
    store: S,
    timeout: Duration,
    retry: RetryPolicy,
}

impl<S: CouponStore> CouponValidator<S> {
    /// Creates a new coupon validator.
    pub fn new(store: S, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            store,
            timeout,
            retry,
        }
    }

    /// Validates `code` against `subtotal` as of now.
    pub async fn validate(&self, code: &str, subtotal: Money) -> Result<DiscountOutcome, CouponError> {
        self.validate_at(code, subtotal, Utc::now()).await
    }

    /// Validates `code` against `subtotal` as of `now`.
    ///
    /// The coupon is read once and both the expiry check and the discount use
    /// that single snapshot.
    #[tracing::instrument(skip(self))]
    pub async fn validate_at(
        &self,
        code: &str,
        subtotal: Money,
        now: DateTime<Utc>,
    ) -> Result<DiscountOutcome, CouponError> {
        let coupon = with_retry(&self.retry, "coupon", || async {
            match within(self.timeout, self.store.find_coupon(code)).await {
                Some(result) => result.map_err(CouponError::from),
                None => Err(CouponError::Unavailable(format!(
                    "no answer within {:?}",
                    self.timeout
                ))),
            }
        })
        .await?;

        let Some(coupon) = coupon else {
            return Ok(DiscountOutcome::Rejected(CouponRejection::InvalidCode));
        };

        if coupon.is_expired_at(now) {
            return Ok(DiscountOutcome::Rejected(CouponRejection::Expired));
        }

        let discount = coupon
            .discount_for(subtotal)
            .map_err(CouponError::Malformed)?;

        Ok(DiscountOutcome::Applied {
            code: coupon.code,
            percent: coupon.discount_percent,
            discount,
        })
    }
}
