use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AttemptId, CartId, CartItemId, CouponId, GuestId, OrderId, OrderItemId, UserId};
use domain::{
    Cart, CartItem, CartOwner, Coupon, DiscountPercent, Money, NewOrder, Order, OrderItem,
    OrderStatus, ProductId, Quantity, VariantId,
};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::journal::validate_entries_for_append;
use crate::{
    CartStore, CheckoutJournal, ConsolidationOutcome, CouponStore, JournalEntry, OrderLedger,
    Result, Sequence, StoreError,
};

const CART_COLUMNS: &str = "id, user_id, guest_id, created_at";
const CART_ITEM_COLUMNS: &str = "id, cart_id, product_id, variant_id, quantity";
const ORDER_COLUMNS: &str = "id, attempt_id, user_id, status, subtotal_cents, discount_cents, \
     coupon_code, total_cents, currency, payment_reference, created_at, updated_at";

/// PostgreSQL-backed implementation of every store trait.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_owner(row: &PgRow) -> Result<CartOwner> {
        let user_id: Option<Uuid> = row.try_get("user_id")?;
        let guest_id: Option<Uuid> = row.try_get("guest_id")?;
        match (user_id, guest_id) {
            (Some(user_id), None) => Ok(CartOwner::User(UserId::from_uuid(user_id))),
            (None, Some(guest_id)) => Ok(CartOwner::Guest(GuestId::from_uuid(guest_id))),
            _ => Err(StoreError::Conflict(
                "cart row must have exactly one owner".to_string(),
            )),
        }
    }

    fn row_to_cart(row: &PgRow, items: Vec<CartItem>) -> Result<Cart> {
        Ok(Cart {
            id: CartId::from_uuid(row.try_get::<Uuid, _>("id")?),
            owner: Self::row_to_owner(row)?,
            created_at: row.try_get("created_at")?,
            items,
        })
    }

    fn row_to_cart_item(row: PgRow) -> Result<CartItem> {
        Ok(CartItem {
            id: CartItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            cart_id: CartId::from_uuid(row.try_get::<Uuid, _>("cart_id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            variant_id: row
                .try_get::<Option<String>, _>("variant_id")?
                .map(VariantId::new),
            quantity: Quantity::try_from(i64::from(row.try_get::<i32, _>("quantity")?))?,
        })
    }

    fn row_to_order_item(row: PgRow) -> Result<OrderItem> {
        Ok(OrderItem {
            id: OrderItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            variant_id: row
                .try_get::<Option<String>, _>("variant_id")?
                .map(VariantId::new),
            quantity: Quantity::try_from(i64::from(row.try_get::<i32, _>("quantity")?))?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        })
    }

    fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
        let status: String = row.try_get("status")?;
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            attempt_id: AttemptId::from_uuid(row.try_get::<Uuid, _>("attempt_id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            status: status.parse::<OrderStatus>()?,
            items,
            subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
            discount: Money::from_cents(row.try_get("discount_cents")?),
            coupon_code: row.try_get("coupon_code")?,
            total: Money::from_cents(row.try_get("total_cents")?),
            currency: row.try_get("currency")?,
            payment_reference: row.try_get("payment_reference")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_coupon(row: PgRow) -> Result<Coupon> {
        Ok(Coupon {
            id: CouponId::from_uuid(row.try_get::<Uuid, _>("id")?),
            code: row.try_get("code")?,
            discount_percent: DiscountPercent::try_from(i64::from(
                row.try_get::<i16, _>("discount_percent")?,
            ))?,
            expires_at: row.try_get("expires_at")?,
        })
    }

    fn row_to_entry(row: PgRow) -> Result<JournalEntry> {
        Ok(JournalEntry {
            attempt_id: AttemptId::from_uuid(row.try_get::<Uuid, _>("attempt_id")?),
            sequence: Sequence::new(row.try_get("sequence")?),
            event_type: row.try_get("event_type")?,
            recorded_at: row.try_get::<DateTime<Utc>, _>("recorded_at")?,
            payload: row.try_get("payload")?,
        })
    }

    async fn cart_items(conn: &mut PgConnection, cart_id: CartId) -> Result<Vec<CartItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE cart_id = $1 ORDER BY created_at, id"
        ))
        .bind(cart_id.as_uuid())
        .fetch_all(conn)
        .await?;

        rows.into_iter().map(Self::row_to_cart_item).collect()
    }

    /// Loads an owner's cart, optionally locking the cart row until the
    /// surrounding transaction ends.
    async fn load_cart(
        conn: &mut PgConnection,
        owner: CartOwner,
        for_update: bool,
    ) -> Result<Option<Cart>> {
        let (column, id) = match owner {
            CartOwner::User(user_id) => ("user_id", user_id.as_uuid()),
            CartOwner::Guest(guest_id) => ("guest_id", guest_id.as_uuid()),
        };
        let lock = if for_update { " FOR UPDATE" } else { "" };

        let row = sqlx::query(&format!(
            "SELECT {CART_COLUMNS} FROM carts WHERE {column} = $1{lock}"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let cart_id = CartId::from_uuid(row.try_get::<Uuid, _>("id")?);
        let items = Self::cart_items(conn, cart_id).await?;
        Self::row_to_cart(&row, items).map(Some)
    }

    /// Locks a cart row by ID, returning false if it does not exist.
    async fn lock_cart(conn: &mut PgConnection, cart_id: CartId) -> Result<bool> {
        let locked: Option<Uuid> = sqlx::query_scalar("SELECT id FROM carts WHERE id = $1 FOR UPDATE")
            .bind(cart_id.as_uuid())
            .fetch_optional(conn)
            .await?;
        Ok(locked.is_some())
    }

    async fn insert_cart_item(conn: &mut PgConnection, item: &CartItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cart_items (id, cart_id, product_id, variant_id, quantity, created_at)
            VALUES ($1, $2, $3, $4, $5, clock_timestamp())
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.cart_id.as_uuid())
        .bind(item.product_id.as_str())
        .bind(item.variant_id.as_ref().map(VariantId::as_str))
        .bind(quantity_to_db(item.quantity))
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn update_cart_item_quantity(
        conn: &mut PgConnection,
        item_id: CartItemId,
        quantity: Quantity,
    ) -> Result<()> {
        sqlx::query("UPDATE cart_items SET quantity = $2 WHERE id = $1")
            .bind(item_id.as_uuid())
            .bind(quantity_to_db(quantity))
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn load_order(conn: &mut PgConnection, row: PgRow) -> Result<Order> {
        let order_id: Uuid = row.try_get("id")?;
        let item_rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, variant_id, quantity, unit_price_cents
            FROM order_items
            WHERE order_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(conn)
        .await?;

        let items = item_rows
            .into_iter()
            .map(Self::row_to_order_item)
            .collect::<Result<Vec<_>>>()?;
        Self::row_to_order(&row, items)
    }

    async fn order_by_attempt(
        conn: &mut PgConnection,
        attempt_id: AttemptId,
    ) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE attempt_id = $1"
        ))
        .bind(attempt_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Self::load_order(conn, row).await.map(Some),
            None => Ok(None),
        }
    }
}

/// Quantities are bounded by `i32::MAX`, so the conversion never saturates in practice.
fn quantity_to_db(quantity: Quantity) -> i32 {
    i32::try_from(quantity.get()).unwrap_or(i32::MAX)
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn get_or_create_cart(&self, owner: CartOwner) -> Result<Cart> {
        let mut conn = self.pool.acquire().await?;
        if let Some(cart) = Self::load_cart(&mut conn, owner, false).await? {
            return Ok(cart);
        }

        let cart = Cart::new(owner);
        sqlx::query(
            r#"
            INSERT INTO carts (id, user_id, guest_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(cart.id.as_uuid())
        .bind(owner.user_id().map(|id| id.as_uuid()))
        .bind(owner.guest_id().map(|id| id.as_uuid()))
        .bind(cart.created_at)
        .execute(&mut *conn)
        .await?;

        // A concurrent creator may have won; read back whichever row exists.
        Self::load_cart(&mut conn, owner, false)
            .await?
            .ok_or_else(|| StoreError::not_found("cart", owner))
    }

    async fn find_cart(&self, owner: CartOwner) -> Result<Option<Cart>> {
        let mut conn = self.pool.acquire().await?;
        Self::load_cart(&mut conn, owner, false).await
    }

    async fn upsert_item(
        &self,
        cart_id: CartId,
        product_id: &ProductId,
        variant_id: Option<&VariantId>,
        quantity: Quantity,
    ) -> Result<CartItem> {
        let mut tx = self.pool.begin().await?;

        if !Self::lock_cart(&mut tx, cart_id).await? {
            return Err(StoreError::not_found("cart", cart_id));
        }

        let existing = Self::cart_items(&mut tx, cart_id)
            .await?
            .into_iter()
            .find(|item| item.is_line_for(product_id, variant_id));

        let item = match existing {
            Some(mut item) => {
                item.quantity = item.quantity.checked_add(quantity)?;
                Self::update_cart_item_quantity(&mut tx, item.id, item.quantity).await?;
                item
            }
            None => {
                let item = CartItem::new(cart_id, product_id.clone(), variant_id.cloned(), quantity);
                Self::insert_cart_item(&mut tx, &item).await?;
                item
            }
        };

        tx.commit().await?;
        Ok(item)
    }

    async fn set_item_quantity(&self, item_id: CartItemId, quantity: Quantity) -> Result<CartItem> {
        let row = sqlx::query(&format!(
            "UPDATE cart_items SET quantity = $2 WHERE id = $1 RETURNING {CART_ITEM_COLUMNS}"
        ))
        .bind(item_id.as_uuid())
        .bind(quantity_to_db(quantity))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_cart_item(row),
            None => Err(StoreError::not_found("cart item", item_id)),
        }
    }

    async fn remove_item(&self, item_id: CartItemId) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE id = $1")
            .bind(item_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_items(&self, cart_id: CartId) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn consolidate(
        &self,
        guest_id: GuestId,
        user_id: UserId,
    ) -> Result<ConsolidationOutcome> {
        let mut tx = self.pool.begin().await?;

        let Some(guest_cart) = Self::load_cart(&mut tx, CartOwner::Guest(guest_id), true).await?
        else {
            return Ok(ConsolidationOutcome::NoGuestCart);
        };

        let Some(user_cart) = Self::load_cart(&mut tx, CartOwner::User(user_id), true).await?
        else {
            sqlx::query("UPDATE carts SET user_id = $2, guest_id = NULL WHERE id = $1")
                .bind(guest_cart.id.as_uuid())
                .bind(user_id.as_uuid())
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            return Ok(ConsolidationOutcome::Transferred {
                cart_id: guest_cart.id,
            });
        };

        for guest_item in &guest_cart.items {
            match user_cart.line(&guest_item.product_id, guest_item.variant_id.as_ref()) {
                Some(existing) => {
                    let quantity = existing.quantity.checked_add(guest_item.quantity)?;
                    Self::update_cart_item_quantity(&mut tx, existing.id, quantity).await?;
                }
                None => {
                    let item = CartItem::new(
                        user_cart.id,
                        guest_item.product_id.clone(),
                        guest_item.variant_id.clone(),
                        guest_item.quantity,
                    );
                    Self::insert_cart_item(&mut tx, &item).await?;
                }
            }
        }

        sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(guest_cart.id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(ConsolidationOutcome::Merged {
            cart_id: user_cart.id,
            lines_merged: guest_cart.items.len(),
        })
    }
}

#[async_trait]
impl OrderLedger for PostgresStore {
    #[tracing::instrument(skip(self, new_order), fields(attempt_id = %new_order.attempt_id))]
    async fn place_order(&self, new_order: NewOrder, source_cart: CartId) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        // The cart lock serializes concurrent placements for the same cart,
        // so the attempt lookup below sees any order committed meanwhile.
        if !Self::lock_cart(&mut tx, source_cart).await? {
            return Err(StoreError::not_found("cart", source_cart));
        }

        if let Some(existing) = Self::order_by_attempt(&mut tx, new_order.attempt_id).await? {
            tracing::debug!(order_id = %existing.id, "order already placed for attempt");
            tx.rollback().await?;
            return Ok(existing);
        }

        let line_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM cart_items WHERE cart_id = $1")
                .bind(source_cart.as_uuid())
                .fetch_one(&mut *tx)
                .await?;
        if line_count == 0 {
            return Err(StoreError::Conflict(format!(
                "cart {source_cart} has no lines to order"
            )));
        }

        let order = Order::place(new_order, Utc::now());

        sqlx::query(
            r#"
            INSERT INTO orders (id, attempt_id, user_id, status, subtotal_cents, discount_cents,
                                coupon_code, total_cents, currency, payment_reference,
                                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.attempt_id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.subtotal.cents())
        .bind(order.discount.cents())
        .bind(&order.coupon_code)
        .bind(order.total.cents())
        .bind(&order.currency)
        .bind(&order.payment_reference)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, position, product_id, variant_id,
                                         quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(item.order_id.as_uuid())
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .bind(item.product_id.as_str())
            .bind(item.variant_id.as_ref().map(VariantId::as_str))
            .bind(quantity_to_db(item.quantity))
            .bind(item.unit_price.cents())
            .execute(&mut *tx)
            .await?;
        }

        // Only the ordered quantities leave the cart; lines added after
        // pricing stay behind. Dropping `tx` on error rolls everything back.
        for item in &order.items {
            let removed = sqlx::query(
                r#"
                DELETE FROM cart_items
                WHERE cart_id = $1 AND product_id = $2
                  AND variant_id IS NOT DISTINCT FROM $3 AND quantity = $4
                "#,
            )
            .bind(source_cart.as_uuid())
            .bind(item.product_id.as_str())
            .bind(item.variant_id.as_ref().map(VariantId::as_str))
            .bind(quantity_to_db(item.quantity))
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if removed > 0 {
                continue;
            }

            let decremented = sqlx::query(
                r#"
                UPDATE cart_items SET quantity = quantity - $4
                WHERE cart_id = $1 AND product_id = $2
                  AND variant_id IS NOT DISTINCT FROM $3 AND quantity > $4
                "#,
            )
            .bind(source_cart.as_uuid())
            .bind(item.product_id.as_str())
            .bind(item.variant_id.as_ref().map(VariantId::as_str))
            .bind(quantity_to_db(item.quantity))
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if decremented == 0 {
                return Err(StoreError::Conflict(format!(
                    "cart {source_cart} no longer holds {} x{}",
                    item.product_id, item.quantity
                )));
            }
        }

        tx.commit().await?;
        Ok(order)
    }

    async fn find_order_by_attempt(&self, attempt_id: AttemptId) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        Self::order_by_attempt(&mut conn, attempt_id).await
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some(row) => Self::load_order(&mut conn, row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&mut *conn)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            orders.push(Self::load_order(&mut conn, row).await?);
        }
        Ok(orders)
    }
}

#[async_trait]
impl CouponStore for PostgresStore {
    async fn find_coupon(&self, code: &str) -> Result<Option<Coupon>> {
        let row = sqlx::query(
            "SELECT id, code, discount_percent, expires_at FROM coupons WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_coupon).transpose()
    }

    async fn save_coupon(&self, coupon: Coupon) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO coupons (id, code, discount_percent, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (code) DO UPDATE SET
                discount_percent = EXCLUDED.discount_percent,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(coupon.id.as_uuid())
        .bind(&coupon.code)
        .bind(i16::from(coupon.discount_percent.get()))
        .bind(coupon.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CheckoutJournal for PostgresStore {
    async fn append(&self, entries: Vec<JournalEntry>, expected: Sequence) -> Result<Sequence> {
        validate_entries_for_append(&entries, expected).map_err(StoreError::Conflict)?;
        let Some(attempt_id) = entries.first().map(|entry| entry.attempt_id) else {
            return Ok(expected);
        };

        let mut tx = self.pool.begin().await?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT MAX(sequence) FROM checkout_journal WHERE attempt_id = $1")
                .bind(attempt_id.as_uuid())
                .fetch_one(&mut *tx)
                .await?;
        let actual = Sequence::new(current.unwrap_or(0));
        if actual != expected {
            metrics::counter!("checkout_journal_conflicts_total").increment(1);
            return Err(StoreError::JournalConflict {
                attempt_id,
                expected,
                actual,
            });
        }

        let mut last = expected;
        for entry in &entries {
            sqlx::query(
                r#"
                INSERT INTO checkout_journal (attempt_id, sequence, event_type, recorded_at, payload)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(entry.attempt_id.as_uuid())
            .bind(entry.sequence.as_i64())
            .bind(&entry.event_type)
            .bind(entry.recorded_at)
            .bind(&entry.payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                // A concurrent writer committed the same sequence first.
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.is_unique_violation()
                {
                    metrics::counter!("checkout_journal_conflicts_total").increment(1);
                    return StoreError::JournalConflict {
                        attempt_id,
                        expected,
                        actual: entry.sequence,
                    };
                }
                StoreError::from(e)
            })?;
            last = entry.sequence;
        }

        tx.commit().await?;
        Ok(last)
    }

    async fn entries(&self, attempt_id: AttemptId) -> Result<Vec<JournalEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT attempt_id, sequence, event_type, recorded_at, payload
            FROM checkout_journal
            WHERE attempt_id = $1
            ORDER BY sequence ASC
            "#,
        )
        .bind(attempt_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }

    async fn stalled_attempts(
        &self,
        event_types: &[&str],
        recorded_before: DateTime<Utc>,
    ) -> Result<Vec<AttemptId>> {
        let event_types: Vec<String> = event_types.iter().map(|t| t.to_string()).collect();
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT attempt_id FROM (
                SELECT DISTINCT ON (attempt_id) attempt_id, event_type, recorded_at
                FROM checkout_journal
                ORDER BY attempt_id, sequence DESC
            ) latest
            WHERE event_type = ANY($1) AND recorded_at <= $2
            "#,
        )
        .bind(&event_types)
        .bind(recorded_before)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(AttemptId::from_uuid).collect())
    }
}
