//! Inbound gateway webhook handler.
//!
//! `POST /payments/{provider}` — unauthenticated route; trust is established
//! by the notification's signature, verified before any field is used. Error
//! statuses are returned deliberately: the gateway retries delivery on
//! non-2xx, which is exactly what we want for transient failures. The
//! handler itself never retry-loops.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::json;

use crate::{
    db::AppState, error::AppError, models::payment::GatewayNotification,
    services::payment_sync_service,
};

/// Receive a payment status notification from the gateway.
///
/// Responses:
/// - 200 — applied, or a duplicate for an already-settled order (no-op)
/// - 400 — body did not parse as a notification
/// - 401 — signature verification failed
/// - 404 — unknown provider or order (gateway will redeliver)
pub async fn gateway_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(notification): Json<GatewayNotification>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    payment_sync_service::apply_notification(&state, &provider, notification).await?;
    Ok((StatusCode::OK, Json(json!({ "status": "ok" }))))
}
