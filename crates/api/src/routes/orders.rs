//! Order read endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use checkout::CheckoutStore;
use common::OrderId;
use domain::{Order, OrderItem};
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;
use crate::identity::AuthenticatedUser;

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub attempt_id: String,
    pub user_id: String,
    pub status: &'static str,
    pub items: Vec<OrderItemResponse>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub coupon_code: Option<String>,
    pub total_cents: i64,
    pub currency: String,
    pub payment_reference: Option<String>,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub id: String,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self {
            id: item.id.to_string(),
            product_id: item.product_id.to_string(),
            variant_id: item.variant_id.as_ref().map(ToString::to_string),
            quantity: item.quantity.get(),
            unit_price_cents: item.unit_price.cents(),
        }
    }
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.to_string(),
            attempt_id: order.attempt_id.to_string(),
            user_id: order.user_id.to_string(),
            status: order.status.as_str(),
            items: order.items.iter().map(OrderItemResponse::from).collect(),
            subtotal_cents: order.subtotal.cents(),
            discount_cents: order.discount.cents(),
            coupon_code: order.coupon_code.clone(),
            total_cents: order.total.cents(),
            currency: order.currency.clone(),
            payment_reference: order.payment_reference.clone(),
            created_at: order.created_at.to_rfc3339(),
        }
    }
}

// -- Handlers --

/// GET /orders/:id: one of the caller's orders.
///
/// Orders belonging to someone else are reported as not found.
#[tracing::instrument(skip(state))]
pub async fn get<S: CheckoutStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = id
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid order ID: {id}"), "id"))?;

    let order = state
        .coordinator
        .order_for_user(user_id, order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;

    Ok(Json(OrderResponse::from(&order)))
}

/// GET /orders: the caller's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: CheckoutStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.coordinator.orders_for_user(user_id).await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}
