//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.
//!
//! The taxonomy separates user-correctable failures (validation, stock),
//! operator-actionable gateway failures (business rejections, malformed
//! responses), and the narrow charge-succeeded-but-persist-failed race,
//! which is surfaced distinctly so it is never silently swallowed.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Bearer token is missing, invalid, or inactive.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid token")]
    InvalidToken,

    /// Request body or parameters are invalid. User-correctable; the
    /// message is surfaced verbatim.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Referenced product (or variant) does not exist or is inactive.
    #[error("Product not found or inactive")]
    ProductNotFound,

    /// Shipping address does not exist or does not belong to the caller.
    #[error("Address not found")]
    InvalidAddress,

    /// Requested order does not exist or belongs to another user.
    #[error("Order not found")]
    OrderNotFound,

    /// Not enough stock to reserve the requested quantity.
    ///
    /// Carries the quantity still available so the storefront can display it.
    #[error("Insufficient stock: {available} available")]
    InsufficientStock { available: i32 },

    /// Order is already paid or in a terminal state and cannot be cancelled.
    #[error("Order can no longer be cancelled")]
    OrderNotCancellable,

    /// Order number generation exhausted its retry budget. Alert-worthy;
    /// the caller can only retry.
    #[error("Order number generation exhausted retries")]
    OrderNumberExhausted,

    /// The gateway rejected the charge at the business level (unsupported
    /// channel, merchant misconfiguration). Actionable by an operator, not
    /// the customer; the full payload is logged at the call site.
    #[error("Gateway rejected charge: [{status_code}] {message}")]
    GatewayRejected { status_code: String, message: String },

    /// The gateway could not be reached or returned an unreadable response.
    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// The gateway response parsed but a required field for the payment type
    /// could not be extracted. An integration bug, logged loudly.
    #[error("Malformed gateway response: {0}")]
    MalformedGatewayResponse(String),

    /// Webhook notification signature did not verify.
    ///
    /// Returned as 401 so the gateway retries delivery.
    #[error("Invalid webhook signature")]
    InvalidWebhookSignature,

    /// Webhook posted for a provider this deployment does not serve.
    #[error("Unknown payment provider")]
    UnknownProvider,

    /// The gateway charge succeeded but recording the payment instruction
    /// failed. The order row was committed before the charge, so the sync
    /// endpoint keyed on the order number resolves the window.
    #[error("Recording payment instruction failed after successful charge")]
    PersistenceAfterCharge,
}

/// Convert AppError into an HTTP response.
///
/// All errors return JSON of the form:
/// ```json
/// { "error": { "code": "...", "message": "..." } }
/// ```
/// `InsufficientStock` additionally includes the remaining quantity.
/// Internal and gateway-side failures hide their detail behind a generic
/// message; the detail is logged where the error is raised.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", self.to_string()),
            AppError::Validation(ref msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", msg.clone())
            }
            AppError::InvalidAddress => {
                (StatusCode::BAD_REQUEST, "invalid_address", self.to_string())
            }
            AppError::ProductNotFound => {
                (StatusCode::NOT_FOUND, "product_not_found", self.to_string())
            }
            AppError::OrderNotFound => (StatusCode::NOT_FOUND, "order_not_found", self.to_string()),
            AppError::InsufficientStock { available } => {
                let body = Json(json!({
                    "error": {
                        "code": "insufficient_stock",
                        "message": self.to_string(),
                        "available": available,
                    }
                }));
                return (StatusCode::UNPROCESSABLE_ENTITY, body).into_response();
            }
            AppError::OrderNotCancellable => {
                (StatusCode::CONFLICT, "order_not_cancellable", self.to_string())
            }
            AppError::InvalidWebhookSignature => {
                (StatusCode::UNAUTHORIZED, "invalid_webhook_signature", self.to_string())
            }
            AppError::UnknownProvider => {
                (StatusCode::NOT_FOUND, "unknown_provider", self.to_string())
            }
            AppError::GatewayRejected { .. } => (
                StatusCode::BAD_GATEWAY,
                "gateway_rejected",
                "Payment could not be initiated. Please try again or choose another method."
                    .to_string(),
            ),
            AppError::GatewayUnavailable(_) => (
                StatusCode::BAD_GATEWAY,
                "gateway_unavailable",
                "Payment gateway is unavailable. Please try again.".to_string(),
            ),
            AppError::MalformedGatewayResponse(_) => (
                StatusCode::BAD_GATEWAY,
                "gateway_integration_error",
                "Payment could not be initiated. Please try again.".to_string(),
            ),
            AppError::OrderNumberExhausted | AppError::PersistenceAfterCharge => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred. Please try again.".to_string(),
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn stock_error_maps_to_422() {
        let response = AppError::InsufficientStock { available: 1 }.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn gateway_errors_map_to_502() {
        let rejected = AppError::GatewayRejected {
            status_code: "402".to_string(),
            message: "bank not supported".to_string(),
        };
        assert_eq!(rejected.into_response().status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            AppError::GatewayUnavailable("timeout".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn persistence_race_maps_to_generic_500() {
        let response = AppError::PersistenceAfterCharge.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn cancel_conflict_maps_to_409() {
        let response = AppError::OrderNotCancellable.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
