//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use checkout::{CheckoutRequest, CheckoutStore};
use common::AttemptId;
use serde::Deserialize;

use super::orders::OrderResponse;
use crate::AppState;
use crate::error::ApiError;
use crate::identity::Identity;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckoutBody {
    /// Chosen by the client; resubmitting the same ID resumes the attempt.
    pub attempt_id: AttemptId,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub payment_instrument: Option<String>,
}

/// POST /checkout: turn the caller's cart into an order.
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: CheckoutStore>(
    State(state): State<Arc<AppState<S>>>,
    Identity(owner): Identity,
    payload: Result<Json<CheckoutBody>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let Json(body) = payload?;

    let request = CheckoutRequest {
        attempt_id: body.attempt_id,
        owner,
        coupon_code: body.coupon_code,
        payment_instrument: body.payment_instrument,
    };
    let order = state.coordinator.checkout(request).await?;

    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}
