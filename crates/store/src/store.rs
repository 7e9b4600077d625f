use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AttemptId, CartId, CartItemId, GuestId, OrderId, UserId};
use domain::{Cart, CartItem, CartOwner, Coupon, NewOrder, Order, ProductId, Quantity, VariantId};

use crate::{JournalEntry, Result, Sequence};

/// Effect of consolidating a guest cart into a user's cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsolidationOutcome {
    /// No cart exists for the guest; nothing changed.
    NoGuestCart,
    /// The user had no cart, so the guest cart now belongs to the user.
    Transferred { cart_id: CartId },
    /// Guest lines were merged into the user's existing cart and the guest cart deleted.
    Merged { cart_id: CartId, lines_merged: usize },
}

/// Owns the lifecycle of carts and their lines.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Returns the owner's cart, creating an empty one if none exists.
    async fn get_or_create_cart(&self, owner: CartOwner) -> Result<Cart>;

    /// Returns the owner's cart with its lines, if it exists.
    async fn find_cart(&self, owner: CartOwner) -> Result<Option<Cart>>;

    /// Adds `quantity` to the `(cart, product, variant)` line, inserting it if absent.
    ///
    /// Fails with `NotFound` if the cart does not exist.
    async fn upsert_item(
        &self,
        cart_id: CartId,
        product_id: &ProductId,
        variant_id: Option<&VariantId>,
        quantity: Quantity,
    ) -> Result<CartItem>;

    /// Sets a line's quantity. Fails with `NotFound` if the line does not exist.
    async fn set_item_quantity(&self, item_id: CartItemId, quantity: Quantity) -> Result<CartItem>;

    /// Deletes a line. Deleting a missing line is not an error.
    async fn remove_item(&self, item_id: CartItemId) -> Result<()>;

    /// Deletes every line of a cart, keeping the cart row. Idempotent.
    async fn clear_items(&self, cart_id: CartId) -> Result<()>;

    /// Moves a guest's cart to a user in one transaction.
    ///
    /// Transfers ownership when the user has no cart; otherwise merges the
    /// guest lines into the user's cart (summing quantities of matching
    /// lines) and deletes the guest cart.
    async fn consolidate(&self, guest_id: GuestId, user_id: UserId)
    -> Result<ConsolidationOutcome>;
}

/// The only writer of finalized orders.
#[async_trait]
pub trait OrderLedger: Send + Sync {
    /// Writes the order and its lines and takes the ordered quantities out of
    /// the source cart, atomically.
    ///
    /// Cart lines that were not ordered, and any quantity above what was
    /// ordered, stay in the cart. If an order already exists for
    /// `new_order.attempt_id` it is returned unchanged and nothing is written.
    /// Fails with `Conflict` if the source cart is empty or no longer holds
    /// every ordered line in at least the ordered quantity.
    async fn place_order(&self, new_order: NewOrder, source_cart: CartId) -> Result<Order>;

    /// Returns the order created by a checkout attempt, if any.
    async fn find_order_by_attempt(&self, attempt_id: AttemptId) -> Result<Option<Order>>;

    /// Returns an order by ID.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Returns a user's orders, newest first.
    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>>;
}

/// Read access to coupons.
#[async_trait]
pub trait CouponStore: Send + Sync {
    /// Returns the coupon with the given code, if any.
    async fn find_coupon(&self, code: &str) -> Result<Option<Coupon>>;

    /// Inserts or replaces a coupon by code.
    async fn save_coupon(&self, coupon: Coupon) -> Result<()>;
}

/// Append-only record of checkout attempt steps.
#[async_trait]
pub trait CheckoutJournal: Send + Sync {
    /// Appends entries, failing with `JournalConflict` unless the attempt's
    /// last recorded sequence equals `expected`.
    ///
    /// Returns the sequence of the last appended entry.
    async fn append(&self, entries: Vec<JournalEntry>, expected: Sequence) -> Result<Sequence>;

    /// Returns an attempt's entries in sequence order.
    async fn entries(&self, attempt_id: AttemptId) -> Result<Vec<JournalEntry>>;

    /// Returns attempts whose latest entry has one of `event_types` and was
    /// recorded at or before `recorded_before`.
    async fn stalled_attempts(
        &self,
        event_types: &[&str],
        recorded_before: DateTime<Utc>,
    ) -> Result<Vec<AttemptId>>;
}
