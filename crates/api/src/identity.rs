//! Caller identity asserted by the upstream gateway.
//!
//! Credentials are verified before requests reach this service; it only
//! reads the already-verified subject from `x-user-id` or `x-guest-id`.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{GuestId, UserId};
use domain::CartOwner;
use uuid::Uuid;

use crate::error::ApiError;

pub const USER_HEADER: &str = "x-user-id";
pub const GUEST_HEADER: &str = "x-guest-id";

/// The cart owner making the request. A user ID wins over a guest ID.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub CartOwner);

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = header_uuid(parts, USER_HEADER)? {
            return Ok(Identity(CartOwner::User(UserId::from_uuid(id))));
        }
        if let Some(id) = header_uuid(parts, GUEST_HEADER)? {
            return Ok(Identity(CartOwner::Guest(GuestId::from_uuid(id))));
        }
        Err(ApiError::Unauthorized(format!(
            "Missing {USER_HEADER} or {GUEST_HEADER} header"
        )))
    }
}

/// A signed-in user.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_uuid(parts, USER_HEADER)?
            .map(|id| AuthenticatedUser(UserId::from_uuid(id)))
            .ok_or_else(|| ApiError::Unauthorized(format!("Missing {USER_HEADER} header")))
    }
}

fn header_uuid(parts: &Parts, name: &'static str) -> Result<Option<Uuid>, ApiError> {
    let Some(value) = parts.headers.get(name) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .map(Some)
        .ok_or_else(|| ApiError::bad_request(format!("{name} must be a UUID"), name))
}
