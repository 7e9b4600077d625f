//! Cart mutation and consolidation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::CheckoutStore;
use common::{CartItemId, GuestId};
use domain::{Cart, CartItem, CartOwner, ProductId, Quantity, VariantId};
use serde::{Deserialize, Serialize};
use store::ConsolidationOutcome;

use crate::AppState;
use crate::error::ApiError;
use crate::identity::{AuthenticatedUser, Identity};

// -- Request types --

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddItemRequest {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: i64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetQuantityRequest {
    pub quantity: i64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsolidateRequest {
    pub guest_id: GuestId,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartResponse {
    pub id: Option<String>,
    pub owner: String,
    pub items: Vec<CartItemResponse>,
}

#[derive(Serialize)]
pub struct CartItemResponse {
    pub id: String,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct ConsolidationResponse {
    pub outcome: &'static str,
    pub cart_id: Option<String>,
    pub lines_merged: usize,
}

impl From<&CartItem> for CartItemResponse {
    fn from(item: &CartItem) -> Self {
        Self {
            id: item.id.to_string(),
            product_id: item.product_id.to_string(),
            variant_id: item.variant_id.as_ref().map(ToString::to_string),
            quantity: item.quantity.get(),
        }
    }
}

impl CartResponse {
    fn new(owner: CartOwner, cart: Option<Cart>) -> Self {
        match cart {
            Some(cart) => Self {
                id: Some(cart.id.to_string()),
                owner: owner.to_string(),
                items: cart.items.iter().map(CartItemResponse::from).collect(),
            },
            None => Self {
                id: None,
                owner: owner.to_string(),
                items: Vec::new(),
            },
        }
    }
}

// -- Handlers --

/// GET /cart: the caller's cart; empty if none exists yet.
#[tracing::instrument(skip(state))]
pub async fn get<S: CheckoutStore>(
    State(state): State<Arc<AppState<S>>>,
    Identity(owner): Identity,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.carts.get_cart(owner).await?;
    Ok(Json(CartResponse::new(owner, cart)))
}

/// DELETE /cart: remove every line from the caller's cart.
#[tracing::instrument(skip(state))]
pub async fn clear<S: CheckoutStore>(
    State(state): State<Arc<AppState<S>>>,
    Identity(owner): Identity,
) -> Result<StatusCode, ApiError> {
    state.carts.clear_cart(owner).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /cart/items: add a product, merging with an existing line.
#[tracing::instrument(skip(state, payload))]
pub async fn add_item<S: CheckoutStore>(
    State(state): State<Arc<AppState<S>>>,
    Identity(owner): Identity,
    payload: Result<Json<AddItemRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CartItemResponse>), ApiError> {
    let Json(req) = payload?;

    let product_id = req.product_id.trim();
    if product_id.is_empty() {
        return Err(ApiError::bad_request("product_id must not be empty", "product_id"));
    }
    let variant_id = req
        .variant_id
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(VariantId::new);
    let quantity = parse_quantity(req.quantity)?;

    let item = state
        .carts
        .add_item(owner, ProductId::new(product_id), variant_id, quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(CartItemResponse::from(&item))))
}

/// PUT /cart/items/:item_id: replace a line's quantity.
#[tracing::instrument(skip(state, payload))]
pub async fn set_quantity<S: CheckoutStore>(
    State(state): State<Arc<AppState<S>>>,
    Identity(owner): Identity,
    Path(item_id): Path<String>,
    payload: Result<Json<SetQuantityRequest>, JsonRejection>,
) -> Result<Json<CartItemResponse>, ApiError> {
    let item_id = parse_item_id(&item_id)?;
    let Json(req) = payload?;
    let quantity = parse_quantity(req.quantity)?;

    let item = state
        .carts
        .set_item_quantity(owner, item_id, quantity)
        .await?;
    Ok(Json(CartItemResponse::from(&item)))
}

/// DELETE /cart/items/:item_id: remove a line; removing a missing line succeeds.
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: CheckoutStore>(
    State(state): State<Arc<AppState<S>>>,
    Identity(owner): Identity,
    Path(item_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let item_id = parse_item_id(&item_id)?;
    state.carts.remove_item(owner, item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /cart/consolidate: merge a guest cart into the signed-in user's cart.
#[tracing::instrument(skip(state, payload))]
pub async fn consolidate<S: CheckoutStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    payload: Result<Json<ConsolidateRequest>, JsonRejection>,
) -> Result<Json<ConsolidationResponse>, ApiError> {
    let Json(req) = payload?;

    let outcome = state
        .coordinator
        .consolidate_cart(req.guest_id, user_id)
        .await?;

    let response = match outcome {
        ConsolidationOutcome::NoGuestCart => ConsolidationResponse {
            outcome: "no_guest_cart",
            cart_id: None,
            lines_merged: 0,
        },
        ConsolidationOutcome::Transferred { cart_id } => ConsolidationResponse {
            outcome: "transferred",
            cart_id: Some(cart_id.to_string()),
            lines_merged: 0,
        },
        ConsolidationOutcome::Merged {
            cart_id,
            lines_merged,
        } => ConsolidationResponse {
            outcome: "merged",
            cart_id: Some(cart_id.to_string()),
            lines_merged,
        },
    };
    Ok(Json(response))
}

fn parse_quantity(quantity: i64) -> Result<Quantity, ApiError> {
    Quantity::try_from(quantity).map_err(|e| ApiError::bad_request(e.to_string(), "quantity"))
}

fn parse_item_id(id: &str) -> Result<CartItemId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid item ID: {id}"), "item_id"))
}
