//! Payment status reconciliation.
//!
//! Two untrusted, unordered sources feed the same state machine: gateway
//! webhooks and client-triggered polls. Both funnel through
//! [`apply_status`], whose writes are conditional on the current status
//! being `pending`. Whichever writer lands first wins; the other becomes a
//! no-op. Nothing here assumes it is the only writer.

use uuid::Uuid;

use crate::{
    db::{AppState, DbPool},
    error::AppError,
    gateway::{GATEWAY_PROVIDER, client::ChargeOutcome, normalize, signature},
    models::{
        order::{Order, OrderStatus, PaymentStatus},
        payment::GatewayNotification,
    },
    services::{inventory_service, order_service, order_service::OrderDetail},
};

/// Apply a payment status transition to an order, idempotently.
///
/// Returns whether this call won the transition. Losing (the order already
/// left `pending`) is not an error: duplicate webhooks and webhook/poll
/// races are expected.
///
/// Inventory is restored only for `expired`/`cancelled`, and only by the
/// winning writer, inside the same database transaction as the flip. A
/// `failed` report flips status only: stock is never released on a polled
/// failure alone, since the gateway may still settle a delayed payment.
pub async fn apply_status(
    pool: &DbPool,
    order_id: Uuid,
    new_status: PaymentStatus,
    gateway_transaction_id: Option<&str>,
) -> Result<bool, AppError> {
    let order_status = match new_status {
        PaymentStatus::Pending => return Ok(false),
        PaymentStatus::Paid => OrderStatus::Processing,
        PaymentStatus::Failed => OrderStatus::Pending,
        PaymentStatus::Cancelled => OrderStatus::Cancelled,
        PaymentStatus::Expired => OrderStatus::Expired,
    };

    let mut tx = pool.begin().await?;

    // The guard: only a pending order can transition, and only one writer
    // can observe rows_affected == 1 for a given order.
    let won = sqlx::query(
        r#"
        UPDATE orders
        SET payment_status = $1, status = $2, updated_at = NOW()
        WHERE id = $3 AND payment_status = 'pending'
        "#,
    )
    .bind(new_status)
    .bind(order_status)
    .bind(order_id)
    .execute(&mut *tx)
    .await?
    .rows_affected()
        == 1;

    if !won {
        tx.rollback().await?;
        return Ok(false);
    }

    sqlx::query(
        r#"
        UPDATE payment_transactions
        SET status = $1,
            gateway_transaction_id = COALESCE($2, gateway_transaction_id),
            updated_at = NOW()
        WHERE order_id = $3
        "#,
    )
    .bind(new_status)
    .bind(gateway_transaction_id)
    .bind(order_id)
    .execute(&mut *tx)
    .await?;

    if matches!(new_status, PaymentStatus::Expired | PaymentStatus::Cancelled) {
        restore_order_stock(&mut tx, order_id).await?;
    }

    tx.commit().await?;
    Ok(true)
}

/// Put every reserved line of an order back into stock. Runs on the winning
/// writer's transaction so the flip and the restore commit together.
async fn restore_order_stock(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    order_id: Uuid,
) -> Result<(), AppError> {
    let lines: Vec<(Uuid, Option<Uuid>, i32)> = sqlx::query_as(
        "SELECT product_id, variant_id, quantity FROM order_items WHERE order_id = $1",
    )
    .bind(order_id)
    .fetch_all(&mut **tx)
    .await?;

    for (product_id, variant_id, quantity) in lines {
        inventory_service::release(tx, product_id, variant_id, quantity).await?;
    }
    Ok(())
}

/// Actively poll the gateway for an order's status and reconcile.
///
/// Exists because webhook delivery is not guaranteed; the storefront calls
/// this from its payment-pending screen. Safe to call concurrently with a
/// webhook for the same order.
pub async fn sync(
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

    // Nothing to reconcile for offline payments or settled orders.
    if !order.payment_method.uses_gateway() || order.payment_status.is_terminal() {
        return order_service::load_bundle(&state.pool, order).await;
    }

    match state.gateway.fetch_status(order_number).await? {
        ChargeOutcome::Success(raw) => {
            let transaction_status = raw
                .get("transaction_status")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("");
            let fraud_status = raw.get("fraud_status").and_then(serde_json::Value::as_str);
            let transaction_id = raw.get("transaction_id").and_then(serde_json::Value::as_str);

            if let Some(new_status) =
                normalize::map_transaction_status(transaction_status, fraud_status)
            {
                let won = apply_status(&state.pool, order.id, new_status, transaction_id).await?;
                tracing::info!(
                    order_number,
                    gateway_status = transaction_status,
                    applied = won,
                    "payment sync reconciled"
                );
            }
        }
        ChargeOutcome::Rejected { status_code, message, .. } if status_code == "404" => {
            // The gateway never saw this charge (the charge call failed
            // after the order was persisted, or the transaction aged out of
            // the gateway's retention window). Past the deadline this order
            // cannot be completed any more.
            let bundle = order_service::load_bundle(&state.pool, order).await?;
            let deadline = order_service::payment_deadline(
                bundle.order.payment_method,
                bundle.payment.expires_at,
                bundle.order.created_at,
                state.config.payment_pending_hours,
            );
            if deadline.is_some_and(|d| chrono::Utc::now() > d) {
                apply_status(&state.pool, bundle.order.id, PaymentStatus::Expired, None).await?;
            } else {
                tracing::warn!(order_number, "gateway has no transaction yet: {message}");
            }
        }
        ChargeOutcome::Rejected { status_code, message, raw } => {
            tracing::error!(
                order_number,
                status_code = %status_code,
                response = %raw,
                "gateway status poll rejected: {message}"
            );
            return Err(AppError::GatewayRejected { status_code, message });
        }
    }

    // Re-read: this caller may have lost the race to a webhook, and the
    // response must reflect whatever actually landed.
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_number = $1")
        .bind(order_number)
        .fetch_one(&state.pool)
        .await?;
    order_service::load_bundle(&state.pool, order).await
}

/// Apply a gateway webhook notification.
///
/// The signature is verified before any field is trusted. Unknown providers
/// and unknown orders are reported back as errors so the gateway retries
/// delivery; a duplicate notification for a settled order is a success
/// no-op.
pub async fn apply_notification(
    state: &AppState,
    provider: &str,
    notification: GatewayNotification,
) -> Result<(), AppError> {
    if provider != GATEWAY_PROVIDER {
        return Err(AppError::UnknownProvider);
    }

    if !signature::verify_notification(&notification, &state.config.gateway_server_key) {
        tracing::warn!(
            order_id = %notification.order_id,
            "webhook signature verification failed"
        );
        return Err(AppError::InvalidWebhookSignature);
    }

    let order = find_order_for_notification(state, &notification)
        .await?
        .ok_or(AppError::OrderNotFound)?;

    let Some(new_status) = normalize::map_transaction_status(
        &notification.transaction_status,
        notification.fraud_status.as_deref(),
    ) else {
        tracing::info!(
            order_number = %order.order_number,
            gateway_status = %notification.transaction_status,
            "webhook carries no transition; ignoring"
        );
        return Ok(());
    };

    let won = apply_status(
        &state.pool,
        order.id,
        new_status,
        notification.transaction_id.as_deref(),
    )
    .await?;

    tracing::info!(
        order_number = %order.order_number,
        gateway_status = %notification.transaction_status,
        applied = won,
        "webhook processed"
    );
    Ok(())
}

/// Look the order up by our order number (the gateway's order id), falling
/// back to the gateway transaction id for older notifications.
async fn find_order_for_notification(
    state: &AppState,
    notification: &GatewayNotification,
) -> Result<Option<Order>, AppError> {
    let by_number = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_number = $1")
        .bind(&notification.order_id)
        .fetch_optional(&state.pool)
        .await?;
    if by_number.is_some() {
        return Ok(by_number);
    }

    match &notification.transaction_id {
        Some(transaction_id) => Ok(sqlx::query_as::<_, Order>(
            r#"
            SELECT o.* FROM orders o
            JOIN payment_transactions p ON p.order_id = o.id
            WHERE p.gateway_transaction_id = $1
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&state.pool)
        .await?),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    async fn seed_product(pool: &PgPool, stock: i32) -> Uuid {
        sqlx::query_scalar(
            "INSERT INTO products (name, price_cents, stock_quantity) \
             VALUES ('Kopi Gayo 250g', 50000, $1) RETURNING id",
        )
        .bind(stock)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    // A pending qris order with one reserved line; the product's stock has
    // already been decremented by the reservation.
    async fn seed_pending_order(pool: &PgPool, product_id: Uuid, quantity: i32) -> Uuid {
        let order_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO orders (order_number, user_id, payment_method, subtotal_cents, total_cents)
            VALUES ('ORD-20250110-TESTAA', $1, 'qris', 100000, 115000)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .fetch_one(pool)
        .await
        .unwrap();

        sqlx::query(
            r#"
            INSERT INTO order_items (
                order_id, product_id, product_name, unit_price_cents, quantity, total_cents
            )
            VALUES ($1, $2, 'Kopi Gayo 250g', 50000, $3, 100000)
            "#,
        )
        .bind(order_id)
        .bind(product_id)
        .bind(quantity)
        .execute(pool)
        .await
        .unwrap();

        sqlx::query(
            "INSERT INTO payment_transactions (order_id, provider, payment_type) \
             VALUES ($1, 'midtrans', 'qris')",
        )
        .bind(order_id)
        .execute(pool)
        .await
        .unwrap();

        order_id
    }

    async fn order_state(pool: &PgPool, order_id: Uuid) -> (PaymentStatus, OrderStatus) {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_one(pool)
            .await
            .unwrap();
        (order.payment_status, order.status)
    }

    async fn stock(pool: &PgPool, product_id: Uuid) -> i32 {
        sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[sqlx::test]
    async fn duplicate_paid_report_is_a_no_op(pool: PgPool) {
        let product_id = seed_product(&pool, 3).await;
        let order_id = seed_pending_order(&pool, product_id, 2).await;

        assert!(apply_status(&pool, order_id, PaymentStatus::Paid, Some("tx-1")).await.unwrap());
        assert!(!apply_status(&pool, order_id, PaymentStatus::Paid, Some("tx-1")).await.unwrap());

        let (payment, status) = order_state(&pool, order_id).await;
        assert_eq!(payment, PaymentStatus::Paid);
        assert_eq!(status, OrderStatus::Processing);

        // The payment transaction mirrors the flip.
        let mirrored: String =
            sqlx::query_scalar("SELECT status FROM payment_transactions WHERE order_id = $1")
                .bind(order_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(mirrored, "paid");
    }

    #[sqlx::test]
    async fn paid_absorbs_later_cancellation(pool: PgPool) {
        let product_id = seed_product(&pool, 3).await;
        let order_id = seed_pending_order(&pool, product_id, 2).await;

        assert!(apply_status(&pool, order_id, PaymentStatus::Paid, Some("tx-1")).await.unwrap());
        assert!(!apply_status(&pool, order_id, PaymentStatus::Cancelled, None).await.unwrap());

        let (payment, status) = order_state(&pool, order_id).await;
        assert_eq!(payment, PaymentStatus::Paid);
        assert_eq!(status, OrderStatus::Processing);
        // The losing cancel must not touch stock it did not win.
        assert_eq!(stock(&pool, product_id).await, 3);
    }

    #[sqlx::test]
    async fn expiry_restores_stock_exactly_once(pool: PgPool) {
        // 2 of the seeded units are reserved on the order.
        let product_id = seed_product(&pool, 3).await;
        let order_id = seed_pending_order(&pool, product_id, 2).await;

        assert!(apply_status(&pool, order_id, PaymentStatus::Expired, None).await.unwrap());
        assert_eq!(stock(&pool, product_id).await, 5);

        assert!(!apply_status(&pool, order_id, PaymentStatus::Expired, None).await.unwrap());
        assert_eq!(stock(&pool, product_id).await, 5);

        let (payment, status) = order_state(&pool, order_id).await;
        assert_eq!(payment, PaymentStatus::Expired);
        assert_eq!(status, OrderStatus::Expired);
    }

    #[sqlx::test]
    async fn polled_failure_flips_status_without_restoring_stock(pool: PgPool) {
        let product_id = seed_product(&pool, 3).await;
        let order_id = seed_pending_order(&pool, product_id, 2).await;

        assert!(apply_status(&pool, order_id, PaymentStatus::Failed, None).await.unwrap());
        assert_eq!(stock(&pool, product_id).await, 3);

        let (payment, _) = order_state(&pool, order_id).await;
        assert_eq!(payment, PaymentStatus::Failed);
    }
}
