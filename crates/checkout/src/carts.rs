//! Cart mutations under the per-cart lock.

use common::CartItemId;
use domain::{Cart, CartItem, CartOwner, ProductId, Quantity, VariantId};
use store::{CartStore, StoreError};

use crate::error::CartError;
use crate::locks::{CartGuard, CartLocks};

/// Adds, changes and removes cart lines.
///
/// Every mutation takes the cart's lock, so a line cannot change while a
/// checkout of the same cart is pricing or persisting it.
#[derive(Debug, Clone)]
pub struct CartService<S> {
    store: S,
    locks: CartLocks,
}

impl<S: CartStore> CartService<S> {
    /// Creates a new cart service sharing `locks` with checkout.
    pub fn new(store: S, locks: CartLocks) -> Self {
        Self { store, locks }
    }

    fn lock(&self, owner: CartOwner) -> Result<CartGuard, CartError> {
        self.locks.try_acquire(owner).ok_or_else(|| {
            metrics::counter!("cart_busy_total", "operation" => "cart").increment(1);
            CartError::CartBusy
        })
    }

    /// Returns the owner's cart, if one exists.
    pub async fn get_cart(&self, owner: CartOwner) -> Result<Option<Cart>, CartError> {
        Ok(self.store.find_cart(owner).await?)
    }

    /// Adds `quantity` of a product to the owner's cart, creating the cart if needed.
    ///
    /// Adding a product and variant that is already in the cart increases
    /// that line's quantity.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        owner: CartOwner,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        quantity: Quantity,
    ) -> Result<CartItem, CartError> {
        let _guard = self.lock(owner)?;
        let cart = self.store.get_or_create_cart(owner).await?;
        let item = self
            .store
            .upsert_item(cart.id, &product_id, variant_id.as_ref(), quantity)
            .await?;

        tracing::debug!(cart_id = %cart.id, item_id = %item.id, quantity = %item.quantity, "cart line upserted");
        Ok(item)
    }

    /// Replaces the quantity of a line in the owner's cart.
    #[tracing::instrument(skip(self))]
    pub async fn set_item_quantity(
        &self,
        owner: CartOwner,
        item_id: CartItemId,
        quantity: Quantity,
    ) -> Result<CartItem, CartError> {
        let _guard = self.lock(owner)?;
        self.owned_item(owner, item_id).await?;

        match self.store.set_item_quantity(item_id, quantity).await {
            Ok(item) => Ok(item),
            Err(StoreError::NotFound { .. }) => Err(CartError::ItemNotFound { item_id }),
            Err(err) => Err(err.into()),
        }
    }

    /// Removes a line from the owner's cart.
    ///
    /// Removing a line that is not there succeeds without changing anything.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, owner: CartOwner, item_id: CartItemId) -> Result<(), CartError> {
        let _guard = self.lock(owner)?;
        match self.owned_item(owner, item_id).await {
            Ok(()) => Ok(self.store.remove_item(item_id).await?),
            Err(CartError::ItemNotFound { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Empties the owner's cart; the cart itself is kept.
    #[tracing::instrument(skip(self))]
    pub async fn clear_cart(&self, owner: CartOwner) -> Result<(), CartError> {
        let _guard = self.lock(owner)?;
        if let Some(cart) = self.store.find_cart(owner).await? {
            self.store.clear_items(cart.id).await?;
        }
        Ok(())
    }

    async fn owned_item(&self, owner: CartOwner, item_id: CartItemId) -> Result<(), CartError> {
        let cart = self.store.find_cart(owner).await?;
        match cart {
            Some(cart) if cart.item(item_id).is_some() => Ok(()),
            _ => Err(CartError::ItemNotFound { item_id }),
        }
    }
}
