//! Money amounts and percentage discounts.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::Quantity;

/// Money amount in the currency's minor unit (cents) to avoid floating point issues.
///
/// All arithmetic used on the checkout path is checked; an overflow is a
/// malformed value, never a silent wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in cents (e.g., 1000 = $10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the major-unit portion (whole number).
    pub fn dollars(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the minor-unit remainder.
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Adds another amount.
    pub fn checked_add(&self, other: Money) -> Result<Money, DomainError> {
        self.cents
            .checked_add(other.cents)
            .map(Money::from_cents)
            .ok_or_else(|| DomainError::MalformedMoney(format!("{self} + {other} overflows")))
    }

    /// Subtracts another amount.
    pub fn checked_sub(&self, other: Money) -> Result<Money, DomainError> {
        self.cents
            .checked_sub(other.cents)
            .map(Money::from_cents)
            .ok_or_else(|| DomainError::MalformedMoney(format!("{self} - {other} overflows")))
    }

    /// Multiplies by a line quantity.
    pub fn checked_mul(&self, quantity: Quantity) -> Result<Money, DomainError> {
        self.cents
            .checked_mul(i64::from(quantity.get()))
            .map(Money::from_cents)
            .ok_or_else(|| DomainError::MalformedMoney(format!("{self} x {quantity} overflows")))
    }

    /// Returns `percent` of this amount, rounded half-up to the minor unit.
    ///
    /// `round_half_up(cents * percent / 100)`; a remainder of exactly half a
    /// cent rounds away from zero. Negative amounts are rejected.
    pub fn percent(&self, percent: DiscountPercent) -> Result<Money, DomainError> {
        if self.is_negative() {
            return Err(DomainError::MalformedMoney(format!(
                "cannot take a percentage of negative amount {self}"
            )));
        }
        let scaled = i128::from(self.cents) * i128::from(percent.get());
        let rounded = (scaled + 50) / 100;
        i64::try_from(rounded)
            .map(Money::from_cents)
            .map_err(|_| DomainError::MalformedMoney(format!("{percent} of {self} overflows")))
    }

    /// Sums amounts, failing on overflow.
    pub fn checked_sum<I>(amounts: I) -> Result<Money, DomainError>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, amount| acc.checked_add(amount))
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-{}.{:02}", self.dollars().abs(), self.cents_part())
        } else {
            write!(f, "{}.{:02}", self.dollars(), self.cents_part())
        }
    }
}

/// Whole-number discount percentage in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct DiscountPercent(u8);

impl DiscountPercent {
    /// Creates a percentage, rejecting values above 100.
    pub fn new(percent: u8) -> Result<Self, DomainError> {
        if percent > 100 {
            return Err(DomainError::InvalidDiscountPercent {
                percent: i64::from(percent),
            });
        }
        Ok(Self(percent))
    }

    /// Returns the raw percentage.
    pub fn get(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for DiscountPercent {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| DomainError::InvalidDiscountPercent { percent: value })
            .and_then(DiscountPercent::new)
    }
}

impl From<DiscountPercent> for i64 {
    fn from(percent: DiscountPercent) -> Self {
        i64::from(percent.0)
    }
}

impl std::fmt::Display for DiscountPercent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pct(p: u8) -> DiscountPercent {
        DiscountPercent::new(p).unwrap()
    }

    #[test]
    fn test_money_from_cents() {
        let money = Money::from_cents(1234);
        assert_eq!(money.cents(), 1234);
        assert_eq!(money.dollars(), 12);
        assert_eq!(money.cents_part(), 34);
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(1234).to_string(), "12.34");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-12.34");
    }

    #[test]
    fn test_checked_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(250);
        assert_eq!(a.checked_add(b).unwrap().cents(), 1250);
        assert_eq!(a.checked_sub(b).unwrap().cents(), 750);
        assert_eq!(
            a.checked_mul(Quantity::new(3).unwrap()).unwrap().cents(),
            3000
        );
        assert!(Money::from_cents(i64::MAX).checked_add(b).is_err());
        assert!(
            Money::from_cents(i64::MAX)
                .checked_mul(Quantity::new(2).unwrap())
                .is_err()
        );
    }

    #[test]
    fn test_checked_sum() {
        let total = Money::checked_sum([
            Money::from_cents(100),
            Money::from_cents(200),
            Money::from_cents(300),
        ])
        .unwrap();
        assert_eq!(total.cents(), 600);
        assert!(Money::checked_sum([Money::from_cents(i64::MAX), Money::from_cents(1)]).is_err());
    }

    #[test]
    fn test_percent_rounds_half_up() {
        // 15% of 1010 = 151.5 -> 152
        assert_eq!(Money::from_cents(1010).percent(pct(15)).unwrap().cents(), 152);
        // 15% of 1009 = 151.35 -> 151
        assert_eq!(Money::from_cents(1009).percent(pct(15)).unwrap().cents(), 151);
        // 10% of 1005 = 100.5 -> 101
        assert_eq!(Money::from_cents(1005).percent(pct(10)).unwrap().cents(), 101);
        // 10% of 1004 = 100.4 -> 100
        assert_eq!(Money::from_cents(1004).percent(pct(10)).unwrap().cents(), 100);
    }

    #[test]
    fn test_percent_bounds() {
        let amount = Money::from_cents(4599);
        assert_eq!(amount.percent(pct(0)).unwrap(), Money::zero());
        assert_eq!(amount.percent(pct(100)).unwrap(), amount);
        assert!(Money::from_cents(-1).percent(pct(10)).is_err());
    }

    #[test]
    fn test_discount_percent_validation() {
        assert!(DiscountPercent::new(100).is_ok());
        assert_eq!(
            DiscountPercent::new(101),
            Err(DomainError::InvalidDiscountPercent { percent: 101 })
        );
        assert!(DiscountPercent::try_from(-5).is_err());
        assert_eq!(pct(25).to_string(), "25%");
    }
}
