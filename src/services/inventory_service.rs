//! Inventory ledger: atomic stock reservation and release.
//!
//! Reservation is a single conditional UPDATE, never read-then-write, so
//! concurrent reservations against the same SKU serialize on the row and
//! stock can never go negative (a CHECK constraint backs this up). Both
//! operations run on a caller-owned database transaction so they commit or
//! roll back together with the surrounding order work.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::AppError;

/// Reserve `quantity` units of a product (or one of its variants).
///
/// Fails with `InsufficientStock`, carrying the remaining quantity, when the
/// conditional decrement matches no row. The caller is expected to abort its
/// enclosing transaction.
pub async fn reserve(
    conn: &mut PgConnection,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    quantity: i32,
) -> Result<(), AppError> {
    let affected = match variant_id {
        Some(variant_id) => sqlx::query(
            r#"
            UPDATE product_variants
            SET stock_quantity = stock_quantity - $1
            WHERE id = $2 AND product_id = $3 AND stock_quantity >= $1
            "#,
        )
        .bind(quantity)
        .bind(variant_id)
        .bind(product_id)
        .execute(&mut *conn)
        .await?
        .rows_affected(),
        None => sqlx::query(
            r#"
            UPDATE products
            SET stock_quantity = stock_quantity - $1, updated_at = NOW()
            WHERE id = $2 AND stock_quantity >= $1
            "#,
        )
        .bind(quantity)
        .bind(product_id)
        .execute(&mut *conn)
        .await?
        .rows_affected(),
    };

    if affected == 0 {
        let available = current_stock(conn, product_id, variant_id).await?;
        return Err(AppError::InsufficientStock { available });
    }

    Ok(())
}

/// Restore previously reserved stock.
///
/// Used by cancellation and expiry after the conditional status flip has
/// been won; a definitive charge rejection funnels through the same path.
/// Never called on payment failure observed by polling alone.
pub async fn release(
    conn: &mut PgConnection,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    quantity: i32,
) -> Result<(), AppError> {
    match variant_id {
        Some(variant_id) => {
            sqlx::query(
                "UPDATE product_variants SET stock_quantity = stock_quantity + $1 WHERE id = $2",
            )
            .bind(quantity)
            .bind(variant_id)
            .execute(conn)
            .await?;
        }
        None => {
            sqlx::query(
                "UPDATE products SET stock_quantity = stock_quantity + $1, updated_at = NOW() \
                 WHERE id = $2",
            )
            .bind(quantity)
            .bind(product_id)
            .execute(conn)
            .await?;
        }
    }
    Ok(())
}

/// Read the remaining stock for error reporting. 0 when the row is gone.
async fn current_stock(
    conn: &mut PgConnection,
    product_id: Uuid,
    variant_id: Option<Uuid>,
) -> Result<i32, AppError> {
    let available: Option<i32> = match variant_id {
        Some(variant_id) => {
            sqlx::query_scalar("SELECT stock_quantity FROM product_variants WHERE id = $1")
                .bind(variant_id)
                .fetch_optional(conn)
                .await?
        }
        None => sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(conn)
            .await?,
    };

    Ok(available.unwrap_or(0))
}
