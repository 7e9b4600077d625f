//! HTTP API server for the checkout pipeline.
//!
//! Provides REST endpoints for carts, checkout, cart consolidation and
//! orders, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod identity;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use checkout::{
    CartService, CheckoutConfig, CheckoutCoordinator, CheckoutStore, InMemoryCatalog,
    InMemoryPaymentGateway,
};
use domain::{Coupon, DiscountPercent, Money};
use metrics_exporter_prometheus::PrometheusHandle;
use store::CouponStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// The coordinator as wired by this service: demo catalog and gateway.
pub type Coordinator<S> = CheckoutCoordinator<S, InMemoryCatalog, InMemoryPaymentGateway>;

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub coordinator: Coordinator<S>,
    pub carts: CartService<S>,
}

impl<S: CheckoutStore> AppState<S> {
    /// Creates the state; the cart service shares the coordinator's cart locks.
    pub fn new(
        store: S,
        catalog: InMemoryCatalog,
        gateway: InMemoryPaymentGateway,
        config: CheckoutConfig,
    ) -> Arc<Self> {
        let coordinator = CheckoutCoordinator::new(store, catalog, gateway, config);
        let carts = coordinator.cart_service();
        Arc::new(Self { coordinator, carts })
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: CheckoutStore>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/cart",
            get(routes::carts::get::<S>).delete(routes::carts::clear::<S>),
        )
        .route("/cart/items", post(routes::carts::add_item::<S>))
        .route(
            "/cart/items/{item_id}",
            put(routes::carts::set_quantity::<S>).delete(routes::carts::remove_item::<S>),
        )
        .route("/cart/consolidate", post(routes::carts::consolidate::<S>))
        .route("/checkout", post(routes::checkouts::create::<S>))
        .route("/orders", get(routes::orders::list::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates a catalog seeded with demo products.
pub fn demo_catalog() -> InMemoryCatalog {
    let catalog = InMemoryCatalog::new();
    catalog.add_product("SKU-001", Money::from_cents(1999));
    catalog.add_product("SKU-002", Money::from_cents(4500));
    catalog.add_variant("SKU-002", "XL", Money::from_cents(500));
    catalog.add_product("SKU-003", Money::from_cents(799));
    catalog
}

/// Saves the demo coupons.
pub async fn seed_demo_coupons<S: CheckoutStore>(store: &S) -> store::Result<()> {
    for (code, percent) in [("WELCOME10", 10), ("HALFOFF", 50)] {
        let percent = DiscountPercent::new(percent)?;
        store.save_coupon(Coupon::new(code, percent)).await?;
    }
    Ok(())
}
