//! Value objects identifying catalog lines and their quantities.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Catalog product identifier (SKU).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Creates a new product ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the product ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProductId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a product variant (size, colour, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantId(String);

impl VariantId {
    /// Creates a new variant ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the variant ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VariantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VariantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VariantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A line quantity, always at least one.
///
/// The upper bound matches the `INTEGER` column the quantity is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Quantity(u32);

impl Quantity {
    /// Largest storable quantity.
    pub const MAX: u32 = i32::MAX as u32;

    /// A quantity of one.
    pub const ONE: Quantity = Quantity(1);

    /// Creates a quantity, rejecting zero and values above [`Quantity::MAX`].
    pub fn new(value: u32) -> Result<Self, DomainError> {
        if value == 0 || value > Self::MAX {
            return Err(DomainError::InvalidQuantity {
                quantity: i64::from(value),
            });
        }
        Ok(Self(value))
    }

    /// Returns the raw count.
    pub fn get(&self) -> u32 {
        self.0
    }

    /// Adds two quantities, failing if the sum is not storable.
    pub fn checked_add(&self, other: Quantity) -> Result<Quantity, DomainError> {
        let sum = u64::from(self.0) + u64::from(other.0);
        u32::try_from(sum)
            .ok()
            .filter(|v| *v <= Self::MAX)
            .map(Quantity)
            .ok_or(DomainError::InvalidQuantity {
                quantity: sum as i64,
            })
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Self::ONE
    }
}

impl TryFrom<i64> for Quantity {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u32::try_from(value)
            .map_err(|_| DomainError::InvalidQuantity { quantity: value })
            .and_then(Quantity::new)
    }
}

impl From<Quantity> for i64 {
    fn from(quantity: Quantity) -> Self {
        i64::from(quantity.0)
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_id_string_conversion() {
        let id = ProductId::new("SKU-001");
        assert_eq!(id.as_str(), "SKU-001");

        let id2: ProductId = "SKU-002".into();
        assert_eq!(id2.to_string(), "SKU-002");
    }

    #[test]
    fn test_quantity_rejects_zero_and_negative() {
        assert_eq!(
            Quantity::new(0),
            Err(DomainError::InvalidQuantity { quantity: 0 })
        );
        assert_eq!(
            Quantity::try_from(-3),
            Err(DomainError::InvalidQuantity { quantity: -3 })
        );
        assert_eq!(Quantity::try_from(4).unwrap().get(), 4);
    }

    #[test]
    fn test_quantity_upper_bound() {
        assert!(Quantity::new(Quantity::MAX).is_ok());
        assert!(Quantity::new(Quantity::MAX + 1).is_err());

        let max = Quantity::new(Quantity::MAX).unwrap();
        assert!(max.checked_add(Quantity::ONE).is_err());
    }

    #[test]
    fn test_quantity_checked_add() {
        let sum = Quantity::new(2).unwrap().checked_add(Quantity::ONE).unwrap();
        assert_eq!(sum.get(), 3);
    }

    #[test]
    fn test_quantity_deserialization_validates() {
        let q: Quantity = serde_json::from_str("5").unwrap();
        assert_eq!(q.get(), 5);
        assert!(serde_json::from_str::<Quantity>("0").is_err());
        assert!(serde_json::from_str::<Quantity>("-1").is_err());
    }
}
