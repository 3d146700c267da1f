//! Order cancellation and payment expiry.
//!
//! Cancellation races the payment-confirmation path on the same row, and
//! payment confirmation always wins if it lands: the gateway is re-checked
//! immediately before cancelling, and the cancel itself goes through the
//! same conditional-update discipline as every other status writer. A
//! payment that settled milliseconds before the deadline is therefore never
//! cancelled.
//!
//! Expiry is client-triggered: the storefront calls the cancel endpoint when
//! it observes the payment deadline has passed. No server-side timer exists
//! or is needed for correctness.

use uuid::Uuid;

use crate::{
    db::AppState,
    error::AppError,
    gateway::{client::ChargeOutcome, normalize},
    models::order::{Order, PaymentStatus},
    services::{order_service, order_service::OrderDetail, payment_sync_service},
};

/// Cancel an order, releasing its reserved inventory.
///
/// Fails with `OrderNotCancellable` when the order is already in a terminal
/// payment state, or when a racing payment confirmation wins the row first.
pub async fn cancel(
    state: &AppState,
    user_id: Uuid,
    order_number: &str,
) -> Result<OrderDetail, AppError> {
    let order = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE order_number = $1 AND user_id = $2",
    )
    .bind(order_number)
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::OrderNotFound)?;

    if order.payment_status.is_terminal() {
        return Err(AppError::OrderNotCancellable);
    }

    // Re-check the gateway before cancelling. If the money already moved,
    // apply the paid transition instead and refuse the cancel.
    if order.payment_method.uses_gateway() {
        match state.gateway.fetch_status(order_number).await? {
            ChargeOutcome::Success(raw) => {
                let transaction_status = raw
                    .get("transaction_status")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("");
                let fraud_status =
                    raw.get("fraud_status").and_then(serde_json::Value::as_str);
                let transaction_id =
                    raw.get("transaction_id").and_then(serde_json::Value::as_str);

                if normalize::map_transaction_status(transaction_status, fraud_status)
                    == Some(PaymentStatus::Paid)
                {
                    payment_sync_service::apply_status(
                        &state.pool,
                        order.id,
                        PaymentStatus::Paid,
                        transaction_id,
                    )
                    .await?;
                    tracing::info!(
                        order_number,
                        "cancel refused: gateway reports payment settled"
                    );
                    return Err(AppError::OrderNotCancellable);
                }
            }
            // No transaction at the gateway: nothing that could settle.
            ChargeOutcome::Rejected { status_code, .. } if status_code == "404" => {}
            ChargeOutcome::Rejected { status_code, message, raw } => {
                tracing::error!(
                    order_number,
                    status_code = %status_code,
                    response = %raw,
                    "gateway status check failed during cancel: {message}"
                );
                return Err(AppError::GatewayRejected { status_code, message });
            }
        }
    }

    let won = payment_sync_service::apply_status(
        &state.pool,
        order.id,
        PaymentStatus::Cancelled,
        None,
    )
    .await?;

    if !won {
        // A webhook or poll landed between our check and the flip.
        tracing::info!(order_number, "cancel lost the race to a status writer");
        return Err(AppError::OrderNotCancellable);
    }

    tracing::info!(order_number, "order cancelled, inventory restored");

    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_number = $1")
        .bind(order_number)
        .fetch_one(&state.pool)
        .await?;
    order_service::load_bundle(&state.pool, order).await
}
