//! Order HTTP handlers.
//!
//! - POST /api/v1/orders — create an order and return its payment instruction
//! - GET /api/v1/orders/{order_number} — current order + payment snapshot
//! - POST /api/v1/orders/{order_number}/sync-payment — force a gateway
//!   status check and reconcile
//! - PUT /api/v1/orders/{order_number}/cancel — cancel if not yet paid
//!
//! All routes are bearer-authenticated and scoped to the calling customer.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    db::AppState,
    error::AppError,
    middleware::auth::AuthContext,
    models::order::{CreateOrderRequest, OrderResponse},
    services::{cancel_service, order_service, order_service::OrderDetail, payment_sync_service},
};

fn to_response(detail: OrderDetail, pending_window_hours: i64) -> OrderResponse {
    let payment_deadline = order_service::payment_deadline(
        detail.order.payment_method,
        detail.payment.expires_at,
        detail.order.created_at,
        pending_window_hours,
    );
    OrderResponse {
        items: detail.items,
        shipping_address: detail.shipping_address,
        payment: detail.payment.into(),
        payment_deadline,
        order: detail.order,
    }
}

/// Create an order.
///
/// Persists the order bundle with its stock reservation, then charges the
/// gateway and records the payment instruction.
/// Returns 201 with the order and its normalized payment instruction, or:
/// 400 (validation / address), 404 (product), 422 (insufficient stock,
/// with the remaining quantity), 502 (gateway).
pub async fn create_order(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    let detail = order_service::create_order(&state, auth.user_id, request).await?;
    let response = to_response(detail, state.config.payment_pending_hours);
    Ok((StatusCode::CREATED, Json(response)))
}

/// Get an order by its order number.
pub async fn get_order(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(order_number): Path<String>,
) -> Result<Json<OrderResponse>, AppError> {
    let detail = order_service::get_order(&state.pool, auth.user_id, &order_number).await?;
    Ok(Json(to_response(detail, state.config.payment_pending_hours)))
}

/// Actively query the gateway for payment status and reconcile.
///
/// Exists because webhook delivery is not guaranteed. Returns the possibly
/// updated order; safe to call repeatedly and concurrently with webhooks.
pub async fn sync_payment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(order_number): Path<String>,
) -> Result<Json<OrderResponse>, AppError> {
    let detail = payment_sync_service::sync(&state, auth.user_id, &order_number).await?;
    Ok(Json(to_response(detail, state.config.payment_pending_hours)))
}

/// Cancel an order that has not been paid.
///
/// Re-checks the gateway first; a payment that already settled wins and the
/// call returns 409. On success the reserved inventory is restored.
pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(order_number): Path<String>,
) -> Result<Json<OrderResponse>, AppError> {
    let detail = cancel_service::cancel(&state, auth.user_id, &order_number).await?;
    Ok(Json(to_response(detail, state.config.payment_pending_hours)))
}
