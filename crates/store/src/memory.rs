use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AttemptId, CartId, CartItemId, GuestId, OrderId, UserId};
use domain::{Cart, CartItem, CartOwner, Coupon, NewOrder, Order, ProductId, Quantity, VariantId};
use tokio::sync::RwLock;

use crate::journal::validate_entries_for_append;
use crate::{
    CartStore, CheckoutJournal, ConsolidationOutcome, CouponStore, JournalEntry, OrderLedger,
    Result, Sequence, StoreError,
};

/// A scripted failure for the next `place_order` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceOrderFailure {
    /// Fail transiently without writing anything.
    UnavailableBeforeCommit,
    /// Commit the write, then report a transient failure (a lost acknowledgement).
    UnavailableAfterCommit,
    /// Fail permanently without writing anything.
    Rejected,
}

#[derive(Debug, Default)]
struct InMemoryState {
    carts: HashMap<CartId, Cart>,
    coupons: HashMap<String, Coupon>,
    orders: HashMap<OrderId, Order>,
    journal: HashMap<AttemptId, Vec<JournalEntry>>,
    place_order_failures: VecDeque<PlaceOrderFailure>,
    place_order_calls: usize,
}

impl InMemoryState {
    fn cart_id_for(&self, owner: CartOwner) -> Option<CartId> {
        self.carts
            .values()
            .find(|cart| cart.owner == owner)
            .map(|cart| cart.id)
    }

    fn item_mut(&mut self, item_id: CartItemId) -> Option<&mut CartItem> {
        self.carts
            .values_mut()
            .flat_map(|cart| cart.items.iter_mut())
            .find(|item| item.id == item_id)
    }
}

/// In-memory implementation of every store trait.
///
/// One lock guards all tables, so each operation is atomic the same way a
/// PostgreSQL transaction is.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<InMemoryState>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a failure for a future `place_order` call.
    pub async fn fail_next_place_order(&self, failure: PlaceOrderFailure) {
        self.state
            .write()
            .await
            .place_order_failures
            .push_back(failure);
    }

    /// Returns how many times `place_order` has been called.
    pub async fn place_order_calls(&self) -> usize {
        self.state.read().await.place_order_calls
    }

    /// Returns the number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns the number of carts stored.
    pub async fn cart_count(&self) -> usize {
        self.state.read().await.carts.len()
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn get_or_create_cart(&self, owner: CartOwner) -> Result<Cart> {
        let mut state = self.state.write().await;
        if let Some(cart_id) = state.cart_id_for(owner) {
            return state
                .carts
                .get(&cart_id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("cart", cart_id));
        }

        let cart = Cart::new(owner);
        state.carts.insert(cart.id, cart.clone());
        Ok(cart)
    }

    async fn find_cart(&self, owner: CartOwner) -> Result<Option<Cart>> {
        let state = self.state.read().await;
        Ok(state.carts.values().find(|cart| cart.owner == owner).cloned())
    }

    async fn upsert_item(
        &self,
        cart_id: CartId,
        product_id: &ProductId,
        variant_id: Option<&VariantId>,
        quantity: Quantity,
    ) -> Result<CartItem> {
        let mut state = self.state.write().await;
        let cart = state
            .carts
            .get_mut(&cart_id)
            .ok_or_else(|| StoreError::not_found("cart", cart_id))?;

        if let Some(item) = cart
            .items
            .iter_mut()
            .find(|item| item.is_line_for(product_id, variant_id))
        {
            item.quantity = item.quantity.checked_add(quantity)?;
            return Ok(item.clone());
        }

        let item = CartItem::new(cart_id, product_id.clone(), variant_id.cloned(), quantity);
        cart.items.push(item.clone());
        Ok(item)
    }

    async fn set_item_quantity(&self, item_id: CartItemId, quantity: Quantity) -> Result<CartItem> {
        let mut state = self.state.write().await;
        let item = state
            .item_mut(item_id)
            .ok_or_else(|| StoreError::not_found("cart item", item_id))?;
        item.quantity = quantity;
        Ok(item.clone())
    }

    async fn remove_item(&self, item_id: CartItemId) -> Result<()> {
        let mut state = self.state.write().await;
        for cart in state.carts.values_mut() {
            cart.items.retain(|item| item.id != item_id);
        }
        Ok(())
    }

    async fn clear_items(&self, cart_id: CartId) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(cart) = state.carts.get_mut(&cart_id) {
            cart.items.clear();
        }
        Ok(())
    }

    async fn consolidate(
        &self,
        guest_id: GuestId,
        user_id: UserId,
    ) -> Result<ConsolidationOutcome> {
        let mut state = self.state.write().await;

        let Some(guest_cart_id) = state.cart_id_for(CartOwner::Guest(guest_id)) else {
            return Ok(ConsolidationOutcome::NoGuestCart);
        };

        let Some(user_cart_id) = state.cart_id_for(CartOwner::User(user_id)) else {
            let cart = state
                .carts
                .get_mut(&guest_cart_id)
                .ok_or_else(|| StoreError::not_found("cart", guest_cart_id))?;
            cart.owner = CartOwner::User(user_id);
            return Ok(ConsolidationOutcome::Transferred {
                cart_id: guest_cart_id,
            });
        };

        let guest_items = state
            .carts
            .get(&guest_cart_id)
            .map(|cart| cart.items.clone())
            .unwrap_or_default();

        // Merge into a copy so a quantity overflow leaves both carts untouched.
        let mut merged = state
            .carts
            .get(&user_cart_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("cart", user_cart_id))?;
        for guest_item in &guest_items {
            let existing = merged.items.iter_mut().find(|item| {
                item.is_line_for(&guest_item.product_id, guest_item.variant_id.as_ref())
            });
            match existing {
                Some(item) => item.quantity = item.quantity.checked_add(guest_item.quantity)?,
                None => merged.items.push(CartItem::new(
                    user_cart_id,
                    guest_item.product_id.clone(),
                    guest_item.variant_id.clone(),
                    guest_item.quantity,
                )),
            }
        }

        state.carts.insert(user_cart_id, merged);
        state.carts.remove(&guest_cart_id);

        Ok(ConsolidationOutcome::Merged {
            cart_id: user_cart_id,
            lines_merged: guest_items.len(),
        })
    }
}

#[async_trait]
impl OrderLedger for InMemoryStore {
    async fn place_order(&self, new_order: NewOrder, source_cart: CartId) -> Result<Order> {
        let mut state = self.state.write().await;
        state.place_order_calls += 1;
        let failure = state.place_order_failures.pop_front();

        match failure {
            Some(PlaceOrderFailure::UnavailableBeforeCommit) => {
                return Err(StoreError::Unavailable("injected timeout".to_string()));
            }
            Some(PlaceOrderFailure::Rejected) => {
                return Err(StoreError::Conflict("injected rejection".to_string()));
            }
            _ => {}
        }

        if let Some(existing) = state
            .orders
            .values()
            .find(|order| order.attempt_id == new_order.attempt_id)
        {
            return Ok(existing.clone());
        }

        let cart = state
            .carts
            .get_mut(&source_cart)
            .ok_or_else(|| StoreError::not_found("cart", source_cart))?;
        if cart.is_empty() {
            return Err(StoreError::Conflict(format!(
                "cart {source_cart} has no lines to order"
            )));
        }

        // Check every ordered line before touching the cart.
        let mut remaining = Vec::with_capacity(new_order.lines.len());
        for line in &new_order.lines {
            let held = cart
                .line(&line.product_id, line.variant_id.as_ref())
                .map(|item| item.quantity.get())
                .unwrap_or(0);
            if held < line.quantity.get() {
                return Err(StoreError::Conflict(format!(
                    "cart {source_cart} no longer holds {} x{}",
                    line.product_id, line.quantity
                )));
            }
            remaining.push(held - line.quantity.get());
        }
        for (line, left) in new_order.lines.iter().zip(remaining) {
            match Quantity::new(left) {
                Ok(quantity) => {
                    if let Some(item) = cart
                        .items
                        .iter_mut()
                        .find(|item| item.is_line_for(&line.product_id, line.variant_id.as_ref()))
                    {
                        item.quantity = quantity;
                    }
                }
                Err(_) => cart
                    .items
                    .retain(|item| !item.is_line_for(&line.product_id, line.variant_id.as_ref())),
            }
        }

        let order = Order::place(new_order, Utc::now());
        state.orders.insert(order.id, order.clone());

        if failure == Some(PlaceOrderFailure::UnavailableAfterCommit) {
            return Err(StoreError::Unavailable(
                "injected timeout after commit".to_string(),
            ));
        }

        Ok(order)
    }

    async fn find_order_by_attempt(&self, attempt_id: AttemptId) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .find(|order| order.attempt_id == attempt_id)
            .cloned())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|order| order.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }
}

#[async_trait]
impl CouponStore for InMemoryStore {
    async fn find_coupon(&self, code: &str) -> Result<Option<Coupon>> {
        Ok(self.state.read().await.coupons.get(code).cloned())
    }

    async fn save_coupon(&self, coupon: Coupon) -> Result<()> {
        self.state
            .write()
            .await
            .coupons
            .insert(coupon.code.clone(), coupon);
        Ok(())
    }
}

#[async_trait]
impl CheckoutJournal for InMemoryStore {
    async fn append(&self, entries: Vec<JournalEntry>, expected: Sequence) -> Result<Sequence> {
        validate_entries_for_append(&entries, expected).map_err(StoreError::Conflict)?;

        let mut state = self.state.write().await;
        let Some(first) = entries.first() else {
            return Ok(expected);
        };
        let attempt_id = first.attempt_id;
        let journal = state.journal.entry(attempt_id).or_default();

        let actual = journal
            .last()
            .map(|entry| entry.sequence)
            .unwrap_or_else(Sequence::initial);
        if actual != expected {
            return Err(StoreError::JournalConflict {
                attempt_id,
                expected,
                actual,
            });
        }

        let last = entries
            .last()
            .map(|entry| entry.sequence)
            .unwrap_or(expected);
        journal.extend(entries);
        Ok(last)
    }

    async fn entries(&self, attempt_id: AttemptId) -> Result<Vec<JournalEntry>> {
        let state = self.state.read().await;
        Ok(state.journal.get(&attempt_id).cloned().unwrap_or_default())
    }

    async fn stalled_attempts(
        &self,
        event_types: &[&str],
        recorded_before: DateTime<Utc>,
    ) -> Result<Vec<AttemptId>> {
        let state = self.state.read().await;
        Ok(state
            .journal
            .iter()
            .filter_map(|(attempt_id, entries)| {
                let last = entries.last()?;
                (event_types.contains(&last.event_type.as_str())
                    && last.recorded_at <= recorded_before)
                    .then_some(*attempt_id)
            })
            .collect())
    }
}
