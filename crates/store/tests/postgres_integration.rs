//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container and need a Docker daemon.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{AttemptId, GuestId, UserId};
use domain::{
    CartOwner, Coupon, DiscountPercent, Money, NewOrder, PricedLine, ProductId, Quantity,
    VariantId,
};
use serial_test::serial;
use sqlx::PgPool;
use store::{
    CartStore, CheckoutJournal, ConsolidationOutcome, CouponStore, JournalEntry, OrderLedger,
    PostgresStore, Sequence, StoreError,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_checkout_schema.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE checkout_journal, order_items, orders, coupons, cart_items, carts",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool)
}

fn qty(n: u32) -> Quantity {
    Quantity::new(n).unwrap()
}

fn new_order(user_id: UserId, attempt_id: AttemptId) -> NewOrder {
    NewOrder {
        attempt_id,
        user_id,
        lines: vec![
            PricedLine {
                product_id: ProductId::new("SKU-001"),
                variant_id: None,
                quantity: qty(2),
                unit_price: Money::from_cents(1000),
            },
            PricedLine {
                product_id: ProductId::new("SKU-002"),
                variant_id: Some(VariantId::new("L")),
                quantity: qty(1),
                unit_price: Money::from_cents(550),
            },
        ],
        subtotal: Money::from_cents(2550),
        discount: Money::from_cents(255),
        coupon_code: Some("SAVE10".to_string()),
        total: Money::from_cents(2295),
        currency: "USD".to_string(),
        payment_reference: Some("PAY-0001".to_string()),
    }
}

fn entry(attempt_id: AttemptId, sequence: i64) -> JournalEntry {
    JournalEntry::builder()
        .attempt_id(attempt_id)
        .sequence(Sequence::new(sequence))
        .event_type("TestEvent")
        .payload_raw(serde_json::json!({"n": sequence}))
        .try_build()
        .unwrap()
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn cart_lines_upsert_by_product_and_variant() {
    let store = get_test_store().await;
    let owner = CartOwner::User(UserId::new());
    let cart = store.get_or_create_cart(owner).await.unwrap();
    assert_eq!(store.get_or_create_cart(owner).await.unwrap().id, cart.id);

    let sku = ProductId::new("SKU-001");
    let variant = VariantId::new("L");
    store.upsert_item(cart.id, &sku, None, qty(1)).await.unwrap();
    let merged = store.upsert_item(cart.id, &sku, None, qty(2)).await.unwrap();
    assert_eq!(merged.quantity.get(), 3);
    store
        .upsert_item(cart.id, &sku, Some(&variant), qty(1))
        .await
        .unwrap();

    let cart = store.find_cart(owner).await.unwrap().unwrap();
    assert_eq!(cart.items.len(), 2);

    let updated = store.set_item_quantity(merged.id, qty(9)).await.unwrap();
    assert_eq!(updated.quantity.get(), 9);

    store.remove_item(merged.id).await.unwrap();
    store.remove_item(merged.id).await.unwrap();
    assert!(matches!(
        store.set_item_quantity(merged.id, qty(1)).await,
        Err(StoreError::NotFound { .. })
    ));
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn consolidation_merges_and_transfers() {
    let store = get_test_store().await;
    let guest_id = GuestId::new();
    let user_id = UserId::new();

    let guest_cart = store
        .get_or_create_cart(CartOwner::Guest(guest_id))
        .await
        .unwrap();
    store
        .upsert_item(guest_cart.id, &ProductId::new("A"), None, qty(2))
        .await
        .unwrap();

    // No user cart yet: ownership moves.
    let outcome = store.consolidate(guest_id, user_id).await.unwrap();
    assert_eq!(
        outcome,
        ConsolidationOutcome::Transferred {
            cart_id: guest_cart.id
        }
    );

    // A second guest cart now merges into the user's.
    let second_guest = GuestId::new();
    let second_cart = store
        .get_or_create_cart(CartOwner::Guest(second_guest))
        .await
        .unwrap();
    store
        .upsert_item(second_cart.id, &ProductId::new("A"), None, qty(1))
        .await
        .unwrap();
    store
        .upsert_item(second_cart.id, &ProductId::new("B"), None, qty(4))
        .await
        .unwrap();

    let outcome = store.consolidate(second_guest, user_id).await.unwrap();
    assert_eq!(
        outcome,
        ConsolidationOutcome::Merged {
            cart_id: guest_cart.id,
            lines_merged: 2
        }
    );

    let cart = store
        .find_cart(CartOwner::User(user_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        cart.line(&ProductId::new("A"), None).unwrap().quantity.get(),
        3
    );
    assert_eq!(
        cart.line(&ProductId::new("B"), None).unwrap().quantity.get(),
        4
    );
    assert!(
        store
            .find_cart(CartOwner::Guest(second_guest))
            .await
            .unwrap()
            .is_none()
    );

    assert_eq!(
        store.consolidate(second_guest, user_id).await.unwrap(),
        ConsolidationOutcome::NoGuestCart
    );
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn place_order_is_atomic_and_idempotent() {
    let store = get_test_store().await;
    let user_id = UserId::new();
    let owner = CartOwner::User(user_id);
    let cart = store.get_or_create_cart(owner).await.unwrap();
    store
        .upsert_item(cart.id, &ProductId::new("SKU-001"), None, qty(2))
        .await
        .unwrap();
    store
        .upsert_item(
            cart.id,
            &ProductId::new("SKU-002"),
            Some(&VariantId::new("L")),
            qty(3),
        )
        .await
        .unwrap();
    store
        .upsert_item(cart.id, &ProductId::new("SKU-003"), None, qty(1))
        .await
        .unwrap();

    let attempt_id = AttemptId::new();
    let order = store
        .place_order(new_order(user_id, attempt_id), cart.id)
        .await
        .unwrap();
    assert!(order.totals_are_consistent());

    // Ordered lines leave the cart; the rest stays.
    let left = store.find_cart(owner).await.unwrap().unwrap();
    assert_eq!(left.items.len(), 2);
    assert!(left.line(&ProductId::new("SKU-001"), None).is_none());
    assert_eq!(
        left.line(&ProductId::new("SKU-002"), Some(&VariantId::new("L")))
            .unwrap()
            .quantity
            .get(),
        2
    );
    assert_eq!(
        left.line(&ProductId::new("SKU-003"), None)
            .unwrap()
            .quantity
            .get(),
        1
    );

    let replay = store
        .place_order(new_order(user_id, attempt_id), cart.id)
        .await
        .unwrap();
    assert_eq!(replay.id, order.id);

    let loaded = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.items.len(), 2);
    assert_eq!(loaded.items[1].unit_price, Money::from_cents(550));
    assert_eq!(loaded.total, Money::from_cents(2295));
    assert_eq!(loaded.payment_reference.as_deref(), Some("PAY-0001"));

    assert_eq!(store.orders_for_user(user_id).await.unwrap().len(), 1);

    // A different attempt for lines the cart no longer holds is refused.
    let result = store
        .place_order(new_order(user_id, AttemptId::new()), cart.id)
        .await;
    assert!(matches!(result, Err(StoreError::Conflict(_))));
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn coupons_round_trip_with_expiry() {
    let store = get_test_store().await;
    let expires_at = Utc::now() + Duration::days(1);
    let coupon = Coupon::new("SAVE10", DiscountPercent::new(10).unwrap()).expiring_at(expires_at);
    store.save_coupon(coupon.clone()).await.unwrap();

    let found = store.find_coupon("SAVE10").await.unwrap().unwrap();
    assert_eq!(found.code, "SAVE10");
    assert_eq!(found.discount_percent.get(), 10);
    assert!(found.expires_at.is_some());
    assert!(store.find_coupon("MISSING").await.unwrap().is_none());
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn journal_enforces_expected_sequence() {
    let store = get_test_store().await;
    let attempt_id = AttemptId::new();

    let last = store
        .append(
            vec![entry(attempt_id, 1), entry(attempt_id, 2)],
            Sequence::initial(),
        )
        .await
        .unwrap();
    assert_eq!(last, Sequence::new(2));

    let stale = store
        .append(vec![entry(attempt_id, 2)], Sequence::first())
        .await;
    assert!(matches!(stale, Err(StoreError::JournalConflict { .. })));

    let entries = store.entries(attempt_id).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].payload, serde_json::json!({"n": 2}));
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn stalled_attempts_look_at_the_latest_entry() {
    let store = get_test_store().await;
    let stalled = AttemptId::new();
    let finished = AttemptId::new();
    store
        .append(vec![entry(stalled, 1)], Sequence::initial())
        .await
        .unwrap();
    store
        .append(vec![entry(finished, 1)], Sequence::initial())
        .await
        .unwrap();
    let done = JournalEntry::builder()
        .attempt_id(finished)
        .sequence(Sequence::new(2))
        .event_type("AttemptCompleted")
        .payload_raw(serde_json::json!({}))
        .try_build()
        .unwrap();
    store.append(vec![done], Sequence::first()).await.unwrap();

    let cutoff = Utc::now() + Duration::seconds(1);
    let found = store.stalled_attempts(&["TestEvent"], cutoff).await.unwrap();
    assert_eq!(found, vec![stalled]);

    let before = Utc::now() - Duration::hours(1);
    assert!(
        store
            .stalled_attempts(&["TestEvent"], before)
            .await
            .unwrap()
            .is_empty()
    );
}
