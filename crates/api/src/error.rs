//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::{CartError, CheckoutError, ConsolidationError, ErrorKind};
use serde::Serialize;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// No identity headers on a request that needs one.
    Unauthorized(String),
    /// Resource not found.
    NotFound(String),
    /// Malformed or invalid request input.
    BadRequest {
        message: String,
        field: Option<&'static str>,
    },
    /// Checkout failed.
    Checkout(CheckoutError),
    /// A cart mutation failed.
    Cart(CartError),
    /// Cart consolidation failed.
    Consolidation(ConsolidationError),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>, field: &'static str) -> Self {
        ApiError::BadRequest {
            message: message.into(),
            field: Some(field),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: ErrorKind,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    error: message,
                    kind: ErrorKind::Validation,
                    code: "unauthenticated",
                    field: None,
                },
            ),
            ApiError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    error: message,
                    kind: ErrorKind::Validation,
                    code: "not_found",
                    field: None,
                },
            ),
            ApiError::BadRequest { message, field } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorBody {
                    error: message,
                    kind: ErrorKind::Validation,
                    code: "invalid_request",
                    field,
                },
            ),
            ApiError::Checkout(err) => {
                let status = match &err {
                    CheckoutError::PaymentDeclined { .. } | CheckoutError::PaymentGatewayError => {
                        StatusCode::PAYMENT_REQUIRED
                    }
                    other => status_for(other.kind()),
                };
                (status, body_for(err.to_string(), err.kind(), err.code(), err.field()))
            }
            ApiError::Cart(err) => {
                let status = match &err {
                    CartError::ItemNotFound { .. } => StatusCode::NOT_FOUND,
                    other => status_for(other.kind()),
                };
                let field = matches!(err, CartError::InvalidQuantity(_)).then_some("quantity");
                (status, body_for(err.to_string(), err.kind(), err.code(), field))
            }
            ApiError::Consolidation(err) => (
                status_for(err.kind()),
                body_for(err.to_string(), err.kind(), err.code(), None),
            ),
        };

        (status, axum::Json(body)).into_response()
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Declined | ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn body_for(
    message: String,
    kind: ErrorKind,
    code: &'static str,
    field: Option<&'static str>,
) -> ErrorBody {
    // Internal details are logged, never returned.
    let error = if kind == ErrorKind::Fatal {
        tracing::error!(error = %message, "internal server error");
        "Internal server error".to_string()
    } else {
        message
    };
    ErrorBody {
        error,
        kind,
        code,
        field,
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<CartError> for ApiError {
    fn from(err: CartError) -> Self {
        ApiError::Cart(err)
    }
}

impl From<ConsolidationError> for ApiError {
    fn from(err: ConsolidationError) -> Self {
        ApiError::Consolidation(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest {
            message: rejection.body_text(),
            field: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::ProductId;

    #[test]
    fn test_statuses_follow_error_kind() {
        let cases = [
            (ApiError::from(CheckoutError::EmptyCart), StatusCode::UNPROCESSABLE_ENTITY),
            (
                ApiError::from(CheckoutError::PaymentDeclined {
                    reason: "insufficient funds".into(),
                }),
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                ApiError::from(CheckoutError::PricingFailed {
                    product_id: ProductId::new("SKU-404"),
                    variant_id: None,
                }),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(CheckoutError::CheckoutUnavailable { step: "payment" }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (ApiError::from(CheckoutError::CartBusy), StatusCode::CONFLICT),
            (
                ApiError::from(CheckoutError::Internal("boom".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ApiError::from(ConsolidationError::CartBusy), StatusCode::CONFLICT),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
