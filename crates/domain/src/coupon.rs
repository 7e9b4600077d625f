//! Coupons and their validity rules.

use chrono::{DateTime, Utc};
use common::CouponId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::money::{DiscountPercent, Money};

/// Why a coupon code cannot be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponRejection {
    /// No coupon exists with that code.
    InvalidCode,
    /// The coupon's expiry is in the past.
    Expired,
}

impl std::fmt::Display for CouponRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CouponRejection::InvalidCode => write!(f, "invalid coupon code"),
            CouponRejection::Expired => write!(f, "coupon expired"),
        }
    }
}

/// A percentage-off coupon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: CouponId,
    pub code: String,
    pub discount_percent: DiscountPercent,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Coupon {
    /// Creates a coupon with no expiry.
    pub fn new(code: impl Into<String>, discount_percent: DiscountPercent) -> Self {
        Self {
            id: CouponId::new(),
            code: code.into(),
            discount_percent,
            expires_at: None,
        }
    }

    /// Sets the expiry instant.
    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Returns true if the coupon has an expiry at or before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Returns the discount this coupon grants on `subtotal`.
    pub fn discount_for(&self, subtotal: Money) -> Result<Money, DomainError> {
        subtotal.percent(self.discount_percent)
    }
}
