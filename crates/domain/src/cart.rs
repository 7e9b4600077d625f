//! Carts, cart lines and cart ownership.

use chrono::{DateTime, Utc};
use common::{CartId, CartItemId, GuestId, UserId};
use serde::{Deserialize, Serialize};

use crate::value_objects::{ProductId, Quantity, VariantId};

/// Who a cart belongs to: exactly one of an authenticated user or a guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CartOwner {
    /// An authenticated user.
    User(UserId),
    /// An anonymous shopper.
    Guest(GuestId),
}

impl CartOwner {
    /// Returns the user ID if the owner is authenticated.
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            CartOwner::User(id) => Some(*id),
            CartOwner::Guest(_) => None,
        }
    }

    /// Returns the guest ID if the owner is anonymous.
    pub fn guest_id(&self) -> Option<GuestId> {
        match self {
            CartOwner::User(_) => None,
            CartOwner::Guest(id) => Some(*id),
        }
    }
}

impl std::fmt::Display for CartOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CartOwner::User(id) => write!(f, "user:{id}"),
            CartOwner::Guest(id) => write!(f, "guest:{id}"),
        }
    }
}

impl From<UserId> for CartOwner {
    fn from(id: UserId) -> Self {
        CartOwner::User(id)
    }
}

impl From<GuestId> for CartOwner {
    fn from(id: GuestId) -> Self {
        CartOwner::Guest(id)
    }
}

/// A single cart line.
///
/// At most one line exists per `(cart, product, variant)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: Quantity,
}

impl CartItem {
    /// Creates a new line with a generated ID.
    pub fn new(
        cart_id: CartId,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        quantity: Quantity,
    ) -> Self {
        Self {
            id: CartItemId::new(),
            cart_id,
            product_id,
            variant_id,
            quantity,
        }
    }

    /// Returns true if this line is for the given product and variant.
    pub fn is_line_for(&self, product_id: &ProductId, variant_id: Option<&VariantId>) -> bool {
        &self.product_id == product_id && self.variant_id.as_ref() == variant_id
    }
}

/// A shopping cart with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub owner: CartOwner,
    pub created_at: DateTime<Utc>,
    pub items: Vec<CartItem>,
}

impl Cart {
    /// Creates an empty cart for an owner.
    pub fn new(owner: CartOwner) -> Self {
        Self {
            id: CartId::new(),
            owner,
            created_at: Utc::now(),
            items: Vec::new(),
        }
    }

    /// Returns true if the cart has no lines.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the line for a product and variant, if present.
    pub fn line(&self, product_id: &ProductId, variant_id: Option<&VariantId>) -> Option<&CartItem> {
        self.items
            .iter()
            .find(|item| item.is_line_for(product_id, variant_id))
    }

    /// Returns the line with the given item ID, if present.
    pub fn item(&self, item_id: CartItemId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    /// Returns the total quantity across all lines.
    pub fn total_quantity(&self) -> u64 {
        self.items
            .iter()
            .map(|item| u64::from(item.quantity.get()))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qty(n: u32) -> Quantity {
        Quantity::new(n).unwrap()
    }

    #[test]
    fn test_owner_accessors_are_exclusive() {
        let user = CartOwner::User(UserId::new());
        assert!(user.user_id().is_some());
        assert!(user.guest_id().is_none());

        let guest = CartOwner::Guest(GuestId::new());
        assert!(guest.user_id().is_none());
        assert!(guest.guest_id().is_some());
    }

    #[test]
    fn test_owner_display() {
        let id = UserId::new();
        assert_eq!(CartOwner::User(id).to_string(), format!("user:{id}"));
    }

    #[test]
    fn test_line_lookup_distinguishes_variants() {
        let mut cart = Cart::new(CartOwner::Guest(GuestId::new()));
        let plain = CartItem::new(cart.id, "SKU-001".into(), None, qty(1));
        let large = CartItem::new(cart.id, "SKU-001".into(), Some("L".into()), qty(2));
        cart.items.push(plain.clone());
        cart.items.push(large.clone());

        let sku: ProductId = "SKU-001".into();
        assert_eq!(cart.line(&sku, None), Some(&plain));
        assert_eq!(cart.line(&sku, Some(&"L".into())), Some(&large));
        assert_eq!(cart.line(&sku, Some(&"XL".into())), None);
        assert_eq!(cart.item(large.id), Some(&large));
        assert_eq!(cart.total_quantity(), 3);
    }

    #[test]
    fn test_new_cart_is_empty() {
        let cart = Cart::new(CartOwner::User(UserId::new()));
        assert!(cart.is_empty());
        assert_eq!(cart.total_quantity(), 0);
    }

    #[test]
    fn test_owner_serialization() {
        let owner = CartOwner::Guest(GuestId::new());
        let json = serde_json::to_value(owner).unwrap();
        assert_eq!(json["kind"], "guest");
        let back: CartOwner = serde_json::from_value(json).unwrap();
        assert_eq!(back, owner);
    }
}
