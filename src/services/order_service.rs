//! Order creation and retrieval.
//!
//! Creation persists first and charges second, so no database lock is ever
//! held across the gateway call and every later failure is addressable by
//! order number:
//!
//! 1. reserve inventory and persist the full pending bundle (order, items,
//!    address snapshot, payment transaction without instruction fields) in
//!    one atomic transaction,
//! 2. charge the gateway, keyed on the order number generated up front so a
//!    retry can never double-charge,
//! 3. record the normalized instruction on the payment transaction.
//!
//! A definitive charge rejection cancels the order and restores its stock.
//! Once the charge has succeeded the reservation is never released here:
//! if step 3 fails the order stays pending and the sync endpoint, keyed on
//! the order number the gateway already holds, resolves it later.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::{
    db::AppState,
    error::AppError,
    gateway::{
        GATEWAY_PROVIDER,
        client::{ChargeItem, ChargeOutcome, ChargeRequest},
        normalize,
    },
    models::{
        address::{Address, OrderShippingAddress},
        catalog::{Product, ProductVariant},
        order::{
            CreateOrderRequest, Order, OrderItem, OrderStatus, PaymentMethod, PaymentStatus,
        },
        payment::{PaymentInstruction, PaymentTransaction},
    },
    services::{inventory_service, payment_sync_service},
};

const ORDER_NUMBER_ATTEMPTS: u32 = 5;
const ORDER_NUMBER_SUFFIX_LEN: usize = 6;
const SUFFIX_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ0123456789";

/// A request line after catalog lookup: frozen name and deterministic price.
#[derive(Debug, Clone)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub product_name: String,
    pub variant_name: Option<String>,
    pub unit_price_cents: i64,
    pub quantity: i32,
    pub total_cents: i64,
}

/// Deterministic order totals computed from priced lines and fees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal_cents: i64,
    pub shipping_cents: i64,
    pub service_fee_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
}

/// Compute order totals. `total = subtotal + shipping + fee - discount`;
/// this is the amount the gateway is charged and it is never recomputed
/// after creation.
pub fn compute_totals(
    lines: &[PricedLine],
    shipping_cents: i64,
    service_fee_cents: i64,
    discount_cents: i64,
) -> OrderTotals {
    let subtotal_cents: i64 = lines.iter().map(|l| l.total_cents).sum();
    OrderTotals {
        subtotal_cents,
        shipping_cents,
        service_fee_cents,
        discount_cents,
        total_cents: subtotal_cents + shipping_cents + service_fee_cents - discount_cents,
    }
}

/// Validate request shape before touching the database.
pub fn validate_request(request: &CreateOrderRequest) -> Result<(), AppError> {
    if request.items.is_empty() {
        return Err(AppError::Validation("order must contain at least one item".into()));
    }
    for item in &request.items {
        if item.quantity <= 0 {
            return Err(AppError::Validation("item quantity must be positive".into()));
        }
    }
    if request.payment_method == PaymentMethod::BankTransfer
        && request.payment_channel.as_deref().map_or(true, |c| c.trim().is_empty())
    {
        return Err(AppError::Validation(
            "payment_channel (bank) is required for bank_transfer".into(),
        ));
    }
    if let Some(email) = request.customer_email.as_deref() {
        if !email.contains('@') {
            return Err(AppError::Validation("customer_email is not a valid email".into()));
        }
    }
    Ok(())
}

/// Create an order end to end and return it with its payment instruction.
pub async fn create_order(
    state: &AppState,
    user_id: Uuid,
    request: CreateOrderRequest,
) -> Result<OrderDetail, AppError> {
    validate_request(&request)?;

    // Address must belong to the caller; the snapshot is taken from the row,
    // not from anything client-supplied.
    let address = sqlx::query_as::<_, Address>(
        "SELECT * FROM addresses WHERE id = $1 AND user_id = $2",
    )
    .bind(request.address_id)
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::InvalidAddress)?;

    let lines = price_lines(&state.pool, &request).await?;
    let totals = compute_totals(
        &lines,
        state.config.shipping_flat_cents,
        state.config.service_fee_cents,
        0,
    );

    let order_number = generate_order_number(&state.pool).await?;
    let shipping_snapshot = snapshot_address(&address);

    // Phase 1: reserve stock and persist the pending bundle atomically. The
    // payment transaction starts without instruction fields; for
    // cash-on-delivery it is already complete.
    let placeholder = match request.payment_method {
        PaymentMethod::Cod => normalize::cod_instruction(),
        _ => pending_instruction(&request),
    };
    let mut detail = persist_pending_order(
        &state.pool,
        user_id,
        &request,
        &order_number,
        &lines,
        &totals,
        &shipping_snapshot,
        &placeholder,
    )
    .await?;

    if !request.payment_method.uses_gateway() {
        return Ok(detail);
    }

    // Phase 2: charge the gateway. The order row exists from here on, so
    // every failure below stays resolvable by order number.
    let charge = ChargeRequest {
        order_number: order_number.clone(),
        gross_amount_cents: totals.total_cents,
        payment_method: request.payment_method,
        channel: request.payment_channel.clone(),
        items: charge_items(&lines, &totals),
        customer_name: address.recipient_name.clone(),
        customer_email: request.customer_email.clone(),
        customer_phone: address.phone.clone(),
    };

    let outcome = match state.gateway.charge(&charge, &shipping_snapshot).await {
        Ok(outcome) => outcome,
        Err(e) => {
            // No instruction can be handed out, so the order is cancelled
            // and its stock restored. Should a charge have landed despite
            // the failed read, its webhook arrives as a no-op against the
            // cancelled order and is logged for operator review.
            abandon_unchargeable(&state.pool, &detail.order).await;
            return Err(e);
        }
    };

    match outcome {
        ChargeOutcome::Success(raw) => {
            match normalize::normalize(
                &raw,
                request.payment_method,
                request.payment_channel.as_deref(),
            ) {
                Ok(instruction) => {
                    // Phase 3: record the instruction on the payment row.
                    detail.payment =
                        record_instruction(&state.pool, detail.order.id, &instruction, &raw)
                            .await
                            .map_err(|e| {
                                tracing::error!(
                                    order_number = %order_number,
                                    gateway_transaction_id = ?instruction.gateway_transaction_id,
                                    error = %e,
                                    "recording payment instruction failed after successful charge"
                                );
                                AppError::PersistenceAfterCharge
                            })?;
                    tracing::info!(
                        order_number = %order_number,
                        payment_type = %detail.payment.payment_type,
                        "payment instruction recorded"
                    );
                    Ok(detail)
                }
                Err(e) => {
                    // The charge stands at the gateway: keep the order
                    // pending and the stock reserved. Sync resolves it by
                    // order number once the integration is fixed.
                    tracing::error!(
                        order_number = %order_number,
                        response = %raw,
                        "gateway response missing required fields: {e}"
                    );
                    stash_raw_response(&state.pool, detail.order.id, &raw).await;
                    Err(e)
                }
            }
        }
        ChargeOutcome::Rejected { status_code, message, raw } => {
            tracing::error!(
                order_number = %order_number,
                status_code = %status_code,
                response = %raw,
                "gateway rejected charge: {message}"
            );
            abandon_unchargeable(&state.pool, &detail.order).await;
            Err(AppError::GatewayRejected { status_code, message })
        }
    }
}

/// Full order bundle as stored.
#[derive(Debug)]
pub struct OrderDetail {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub shipping_address: OrderShippingAddress,
    pub payment: PaymentTransaction,
}

/// Fetch an order bundle by number, scoped to its owner.
pub async fn get_order(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    order_number: &str,
) -> Result<OrderDetail, AppError> {
    let order = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE order_number = $1 AND user_id = $2",
    )
    .bind(order_number)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::OrderNotFound)?;

    load_bundle(pool, order).await
}

/// Load items, address snapshot, and the payment transaction for an order row.
pub async fn load_bundle(pool: &sqlx::PgPool, order: Order) -> Result<OrderDetail, AppError> {
    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = $1 ORDER BY product_name",
    )
    .bind(order.id)
    .fetch_all(pool)
    .await?;

    let shipping_address = sqlx::query_as::<_, OrderShippingAddress>(
        "SELECT * FROM order_shipping_addresses WHERE order_id = $1",
    )
    .bind(order.id)
    .fetch_one(pool)
    .await?;

    let payment = sqlx::query_as::<_, PaymentTransaction>(
        "SELECT * FROM payment_transactions WHERE order_id = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(order.id)
    .fetch_one(pool)
    .await?;

    Ok(OrderDetail { order, items, shipping_address, payment })
}

/// Deadline after which an unpaid order may be expired: the gateway's
/// instruction expiry when it gave one, else a fixed window from creation.
/// Cash-on-delivery has no deadline.
pub fn payment_deadline(
    method: PaymentMethod,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    pending_window_hours: i64,
) -> Option<DateTime<Utc>> {
    if !method.uses_gateway() {
        return None;
    }
    Some(expires_at.unwrap_or(created_at + Duration::hours(pending_window_hours)))
}

/// Resolve each request line against the catalog and price it.
///
/// Unit price = effective base price (sale if lower) + variant modifier,
/// all read server-side; the request carries only ids and quantities.
async fn price_lines(
    pool: &sqlx::PgPool,
    request: &CreateOrderRequest,
) -> Result<Vec<PricedLine>, AppError> {
    let mut lines = Vec::with_capacity(request.items.len());
    for item in &request.items {
        let product = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE id = $1 AND is_active = true",
        )
        .bind(item.product_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::ProductNotFound)?;

        let variant = match item.variant_id {
            Some(variant_id) => Some(
                sqlx::query_as::<_, ProductVariant>(
                    "SELECT * FROM product_variants WHERE id = $1 AND product_id = $2",
                )
                .bind(variant_id)
                .bind(product.id)
                .fetch_optional(pool)
                .await?
                .ok_or(AppError::ProductNotFound)?,
            ),
            None => None,
        };

        let unit_price_cents = product.effective_price_cents()
            + variant.as_ref().map_or(0, |v| v.price_modifier_cents);

        lines.push(PricedLine {
            product_id: product.id,
            variant_id: variant.as_ref().map(|v| v.id),
            product_name: product.name,
            variant_name: variant.map(|v| v.name),
            unit_price_cents,
            quantity: item.quantity,
            total_cents: unit_price_cents * i64::from(item.quantity),
        });
    }
    Ok(lines)
}

/// Generate a unique human-facing order number with a bounded retry budget.
///
/// The number is generated once, before the gateway charge, and is the
/// gateway's idempotency key; it is never regenerated afterward.
async fn generate_order_number(pool: &sqlx::PgPool) -> Result<String, AppError> {
    for _ in 0..ORDER_NUMBER_ATTEMPTS {
        let candidate = order_number_candidate(Utc::now());
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE order_number = $1)")
                .bind(&candidate)
                .fetch_one(pool)
                .await?;
        if !exists {
            return Ok(candidate);
        }
    }
    tracing::error!("order number generation exhausted {ORDER_NUMBER_ATTEMPTS} attempts");
    Err(AppError::OrderNumberExhausted)
}

fn order_number_candidate(now: DateTime<Utc>) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..ORDER_NUMBER_SUFFIX_LEN)
        .map(|_| SUFFIX_CHARSET[rng.random_range(0..SUFFIX_CHARSET.len())] as char)
        .collect();
    format!("ORD-{}-{}", now.format("%Y%m%d"), suffix)
}

fn snapshot_address(address: &Address) -> OrderShippingAddress {
    OrderShippingAddress {
        id: Uuid::new_v4(),
        order_id: Uuid::nil(), // set at insert time
        recipient_name: address.recipient_name.clone(),
        phone: address.phone.clone(),
        street: address.street.clone(),
        city: address.city.clone(),
        province: address.province.clone(),
        postal_code: address.postal_code.clone(),
        country_code: address.country_code.clone(),
    }
}

/// Instruction placeholder stored before the gateway has answered: provider
/// and type are known from the request, every instruction field is null.
fn pending_instruction(request: &CreateOrderRequest) -> PaymentInstruction {
    PaymentInstruction {
        provider: GATEWAY_PROVIDER.to_string(),
        payment_type: request.payment_method.gateway_payment_type().to_string(),
        channel: request.payment_channel.clone(),
        gateway_transaction_id: None,
        va_number: None,
        va_bank: None,
        qr_string: None,
        qr_image_url: None,
        payment_url: None,
        instructions: None,
        expires_at: None,
    }
}

/// Itemized gateway lines: order items plus fee lines and a negative
/// discount line, so they sum exactly to the charged total.
fn charge_items(lines: &[PricedLine], totals: &OrderTotals) -> Vec<ChargeItem> {
    let mut items: Vec<ChargeItem> = lines
        .iter()
        .map(|line| ChargeItem {
            id: line.product_id.to_string(),
            name: match &line.variant_name {
                Some(variant) => format!("{} ({variant})", line.product_name),
                None => line.product_name.clone(),
            },
            price_cents: line.unit_price_cents,
            quantity: line.quantity,
        })
        .collect();

    if totals.shipping_cents > 0 {
        items.push(ChargeItem {
            id: "shipping".to_string(),
            name: "Shipping".to_string(),
            price_cents: totals.shipping_cents,
            quantity: 1,
        });
    }
    if totals.service_fee_cents > 0 {
        items.push(ChargeItem {
            id: "service-fee".to_string(),
            name: "Service fee".to_string(),
            price_cents: totals.service_fee_cents,
            quantity: 1,
        });
    }
    if totals.discount_cents > 0 {
        items.push(ChargeItem {
            id: "discount".to_string(),
            name: "Discount".to_string(),
            price_cents: -totals.discount_cents,
            quantity: 1,
        });
    }
    items
}

/// Reserve stock for every line and persist the order, items, address
/// snapshot, and placeholder payment transaction in one database
/// transaction. A failure anywhere rolls back the reservation with it.
#[allow(clippy::too_many_arguments)]
async fn persist_pending_order(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    request: &CreateOrderRequest,
    order_number: &str,
    lines: &[PricedLine],
    totals: &OrderTotals,
    shipping: &OrderShippingAddress,
    instruction: &PaymentInstruction,
) -> Result<OrderDetail, AppError> {
    let mut tx = pool.begin().await?;

    for line in lines {
        inventory_service::reserve(&mut tx, line.product_id, line.variant_id, line.quantity)
            .await?;
    }

    let order = sqlx::query_as::<_, Order>(
        r#"
        INSERT INTO orders (
            order_number, user_id, status, payment_status,
            payment_method, payment_channel,
            subtotal_cents, shipping_cents, service_fee_cents, discount_cents, total_cents,
            notes
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING *
        "#,
    )
    .bind(order_number)
    .bind(user_id)
    .bind(OrderStatus::Pending)
    .bind(PaymentStatus::Pending)
    .bind(request.payment_method)
    .bind(&request.payment_channel)
    .bind(totals.subtotal_cents)
    .bind(totals.shipping_cents)
    .bind(totals.service_fee_cents)
    .bind(totals.discount_cents)
    .bind(totals.total_cents)
    .bind(&request.notes)
    .fetch_one(&mut *tx)
    .await?;

    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        let item = sqlx::query_as::<_, OrderItem>(
            r#"
            INSERT INTO order_items (
                order_id, product_id, variant_id, product_name, variant_name,
                unit_price_cents, quantity, total_cents
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(order.id)
        .bind(line.product_id)
        .bind(line.variant_id)
        .bind(&line.product_name)
        .bind(&line.variant_name)
        .bind(line.unit_price_cents)
        .bind(line.quantity)
        .bind(line.total_cents)
        .fetch_one(&mut *tx)
        .await?;
        items.push(item);
    }

    let shipping_address = sqlx::query_as::<_, OrderShippingAddress>(
        r#"
        INSERT INTO order_shipping_addresses (
            order_id, recipient_name, phone, street, city, province, postal_code, country_code
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(order.id)
    .bind(&shipping.recipient_name)
    .bind(&shipping.phone)
    .bind(&shipping.street)
    .bind(&shipping.city)
    .bind(&shipping.province)
    .bind(&shipping.postal_code)
    .bind(&shipping.country_code)
    .fetch_one(&mut *tx)
    .await?;

    let payment = sqlx::query_as::<_, PaymentTransaction>(
        r#"
        INSERT INTO payment_transactions (
            order_id, provider, payment_type, channel, status,
            gateway_transaction_id, va_number, va_bank, qr_string, qr_image_url,
            payment_url, instructions, expires_at, raw_response
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING *
        "#,
    )
    .bind(order.id)
    .bind(&instruction.provider)
    .bind(&instruction.payment_type)
    .bind(&instruction.channel)
    .bind(PaymentStatus::Pending)
    .bind(&instruction.gateway_transaction_id)
    .bind(&instruction.va_number)
    .bind(&instruction.va_bank)
    .bind(&instruction.qr_string)
    .bind(&instruction.qr_image_url)
    .bind(&instruction.payment_url)
    .bind(&instruction.instructions)
    .bind(instruction.expires_at)
    .bind(Option::<serde_json::Value>::None)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        order_number = %order.order_number,
        total_cents = order.total_cents,
        payment_method = ?order.payment_method,
        "order persisted"
    );

    Ok(OrderDetail { order, items, shipping_address, payment })
}

/// Fill in the normalized instruction fields once the gateway has answered.
async fn record_instruction(
    pool: &sqlx::PgPool,
    order_id: Uuid,
    instruction: &PaymentInstruction,
    raw: &serde_json::Value,
) -> Result<PaymentTransaction, AppError> {
    Ok(sqlx::query_as::<_, PaymentTransaction>(
        r#"
        UPDATE payment_transactions
        SET gateway_transaction_id = $1, va_number = $2, va_bank = $3,
            qr_string = $4, qr_image_url = $5, payment_url = $6,
            instructions = $7, expires_at = $8, raw_response = $9,
            updated_at = NOW()
        WHERE order_id = $10
        RETURNING *
        "#,
    )
    .bind(&instruction.gateway_transaction_id)
    .bind(&instruction.va_number)
    .bind(&instruction.va_bank)
    .bind(&instruction.qr_string)
    .bind(&instruction.qr_image_url)
    .bind(&instruction.payment_url)
    .bind(&instruction.instructions)
    .bind(instruction.expires_at)
    .bind(raw)
    .bind(order_id)
    .fetch_one(pool)
    .await?)
}

/// Best-effort forensic store of a response that could not be normalized.
async fn stash_raw_response(pool: &sqlx::PgPool, order_id: Uuid, raw: &serde_json::Value) {
    if let Err(e) = sqlx::query(
        "UPDATE payment_transactions SET raw_response = $1, updated_at = NOW() WHERE order_id = $2",
    )
    .bind(raw)
    .bind(order_id)
    .execute(pool)
    .await
    {
        tracing::error!(order_id = %order_id, "failed to store raw gateway response: {e}");
    }
}

/// Cancel an order whose charge was definitively refused, restoring its
/// reserved stock through the regular status machinery. Best-effort: the
/// caller returns the original gateway error either way, and a failure here
/// leaves the order pending for the expiry path to pick up.
async fn abandon_unchargeable(pool: &sqlx::PgPool, order: &Order) {
    if let Err(e) =
        payment_sync_service::apply_status(pool, order.id, PaymentStatus::Cancelled, None).await
    {
        tracing::error!(
            order_number = %order.order_number,
            "failed to cancel unchargeable order: {e}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::OrderItemRequest;

    fn line(unit: i64, qty: i32) -> PricedLine {
        PricedLine {
            product_id: Uuid::new_v4(),
            variant_id: None,
            product_name: "Teh Melati".to_string(),
            variant_name: None,
            unit_price_cents: unit,
            quantity: qty,
            total_cents: unit * i64::from(qty),
        }
    }

    #[test]
    fn totals_identity_holds() {
        let lines = vec![line(50_000, 2), line(12_500, 1)];
        let totals = compute_totals(&lines, 15_000, 2_000, 5_000);
        assert_eq!(totals.subtotal_cents, 112_500);
        assert_eq!(
            totals.total_cents,
            totals.subtotal_cents + totals.shipping_cents + totals.service_fee_cents
                - totals.discount_cents
        );
        assert_eq!(totals.total_cents, 124_500);
    }

    #[test]
    fn charge_items_sum_to_total() {
        let lines = vec![line(50_000, 2), line(12_500, 1)];
        let totals = compute_totals(&lines, 15_000, 2_000, 5_000);
        let items = charge_items(&lines, &totals);
        let sum: i64 = items.iter().map(|i| i.price_cents * i64::from(i.quantity)).sum();
        assert_eq!(sum, totals.total_cents);
        // Discount is a negative line, not a silent subtraction.
        assert!(items.iter().any(|i| i.price_cents < 0));
    }

    #[test]
    fn order_number_has_expected_shape() {
        let now = "2025-01-10T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let number = order_number_candidate(now);
        assert!(number.starts_with("ORD-20250110-"));
        let suffix = number.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), ORDER_NUMBER_SUFFIX_LEN);
        assert!(suffix.bytes().all(|b| SUFFIX_CHARSET.contains(&b)));
    }

    #[test]
    fn deadline_prefers_gateway_expiry() {
        let created = Utc::now();
        let expiry = created + Duration::minutes(30);
        assert_eq!(
            payment_deadline(PaymentMethod::Qris, Some(expiry), created, 24),
            Some(expiry)
        );
        assert_eq!(
            payment_deadline(PaymentMethod::BankTransfer, None, created, 24),
            Some(created + Duration::hours(24))
        );
        assert_eq!(payment_deadline(PaymentMethod::Cod, None, created, 24), None);
    }

    fn request(method: PaymentMethod, channel: Option<&str>) -> CreateOrderRequest {
        CreateOrderRequest {
            items: vec![OrderItemRequest {
                product_id: Uuid::new_v4(),
                variant_id: None,
                quantity: 1,
            }],
            address_id: Uuid::new_v4(),
            payment_method: method,
            payment_channel: channel.map(String::from),
            customer_email: None,
            notes: None,
        }
    }

    #[test]
    fn validation_rejects_empty_and_nonpositive() {
        let mut empty = request(PaymentMethod::Qris, None);
        empty.items.clear();
        assert!(matches!(validate_request(&empty), Err(AppError::Validation(_))));

        let mut zero = request(PaymentMethod::Qris, None);
        zero.items[0].quantity = 0;
        assert!(matches!(validate_request(&zero), Err(AppError::Validation(_))));
    }

    #[test]
    fn validation_requires_bank_channel() {
        assert!(validate_request(&request(PaymentMethod::BankTransfer, None)).is_err());
        assert!(validate_request(&request(PaymentMethod::BankTransfer, Some("bca"))).is_ok());
        assert!(validate_request(&request(PaymentMethod::Qris, None)).is_ok());
    }

    #[test]
    fn validation_checks_email_shape() {
        let mut req = request(PaymentMethod::Qris, None);
        req.customer_email = Some("not-an-email".to_string());
        assert!(validate_request(&req).is_err());
        req.customer_email = Some("budi@example.com".to_string());
        assert!(validate_request(&req).is_ok());
    }

    #[test]
    fn pending_instruction_carries_no_payment_fields() {
        let placeholder = pending_instruction(&request(PaymentMethod::BankTransfer, Some("bca")));
        assert_eq!(placeholder.provider, GATEWAY_PROVIDER);
        assert_eq!(placeholder.payment_type, "bank_transfer");
        assert_eq!(placeholder.channel.as_deref(), Some("bca"));
        assert!(placeholder.va_number.is_none());
        assert!(placeholder.gateway_transaction_id.is_none());
        assert!(placeholder.expires_at.is_none());
    }

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

    async fn stock(pool: &PgPool, product_id: Uuid) -> i32 {
        sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    fn priced(product_id: Uuid, qty: i32) -> PricedLine {
        PricedLine {
            product_id,
            variant_id: None,
            product_name: "Kopi Gayo 250g".to_string(),
            variant_name: None,
            unit_price_cents: 50_000,
            quantity: qty,
            total_cents: 50_000 * i64::from(qty),
        }
    }

    fn shipping() -> OrderShippingAddress {
        OrderShippingAddress {
            id: Uuid::new_v4(),
            order_id: Uuid::nil(),
            recipient_name: "Budi Santoso".to_string(),
            phone: "628123456789".to_string(),
            street: "Jl. Sudirman No. 1".to_string(),
            city: "Jakarta".to_string(),
            province: "DKI Jakarta".to_string(),
            postal_code: "10220".to_string(),
            country_code: "IDN".to_string(),
        }
    }

    // The bundle is committed, with its reservation, before any gateway
    // call: whatever fails afterwards, the order stays addressable by its
    // number and its stock can always be restored through the status
    // machinery.
    #[sqlx::test]
    async fn pending_order_is_resolvable_before_any_instruction(pool: PgPool) {
        let product_id = seed_product(&pool, 5).await;
        let lines = vec![priced(product_id, 2)];
        let totals = compute_totals(&lines, 15_000, 0, 0);
        let req = request(PaymentMethod::Qris, None);
        let user_id = Uuid::new_v4();

        let detail = persist_pending_order(
            &pool,
            user_id,
            &req,
            "ORD-20250110-TESTAA",
            &lines,
            &totals,
            &shipping(),
            &pending_instruction(&req),
        )
        .await
        .unwrap();

        assert_eq!(stock(&pool, product_id).await, 3);
        assert_eq!(detail.order.payment_status, PaymentStatus::Pending);
        assert!(detail.payment.va_number.is_none());
        assert!(detail.payment.raw_response.is_none());

        // Resolvable by order number with no instruction recorded yet.
        let fetched = get_order(&pool, user_id, "ORD-20250110-TESTAA").await.unwrap();
        assert_eq!(fetched.order.id, detail.order.id);

        // A webhook-driven expiry finds the order and returns the stock.
        assert!(
            payment_sync_service::apply_status(
                &pool,
                detail.order.id,
                PaymentStatus::Expired,
                None
            )
            .await
            .unwrap()
        );
        assert_eq!(stock(&pool, product_id).await, 5);
    }

    #[sqlx::test]
    async fn failed_reservation_rolls_back_the_whole_bundle(pool: PgPool) {
        let product_id = seed_product(&pool, 1).await;
        let lines = vec![priced(product_id, 2)];
        let totals = compute_totals(&lines, 15_000, 0, 0);
        let req = request(PaymentMethod::Qris, None);

        let err = persist_pending_order(
            &pool,
            Uuid::new_v4(),
            &req,
            "ORD-20250110-TESTAB",
            &lines,
            &totals,
            &shipping(),
            &pending_instruction(&req),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock { available: 1 }));

        let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(orders, 0);
        assert_eq!(stock(&pool, product_id).await, 1);
    }

    // A definitive charge rejection cancels the order and restores stock; a
    // post-charge failure never comes through here, so a pending order keeps
    // its reservation.
    #[sqlx::test]
    async fn charge_rejection_cancels_and_restores(pool: PgPool) {
        let product_id = seed_product(&pool, 5).await;
        let lines = vec![priced(product_id, 2)];
        let totals = compute_totals(&lines, 15_000, 0, 0);
        let req = request(PaymentMethod::Qris, None);

        let detail = persist_pending_order(
            &pool,
            Uuid::new_v4(),
            &req,
            "ORD-20250110-TESTAC",
            &lines,
            &totals,
            &shipping(),
            &pending_instruction(&req),
        )
        .await
        .unwrap();
        assert_eq!(stock(&pool, product_id).await, 3);

        abandon_unchargeable(&pool, &detail.order).await;

        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(detail.order.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Cancelled);
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(stock(&pool, product_id).await, 5);
    }
}
