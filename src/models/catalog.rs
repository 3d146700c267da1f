//! Product and variant models.
//!
//! The catalog itself is managed by the storefront layer; this service only
//! reads prices and atomically adjusts `stock_quantity`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Represents a product record from the database.
///
/// # Price Storage
///
/// Prices are stored as `i64` minor units (no floats). `sale_price_cents`,
/// when present and lower than `price_cents`, takes precedence at checkout.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub sale_price_cents: Option<i64>,

    /// Remaining stock. Must never go negative; enforced by a database
    /// CHECK constraint and conditional decrement.
    pub stock_quantity: i32,

    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Effective base price: the sale price if present and lower.
    pub fn effective_price_cents(&self) -> i64 {
        match self.sale_price_cents {
            Some(sale) if sale < self.price_cents => sale,
            _ => self.price_cents,
        }
    }
}

/// Represents a product variant (size, color) with its own stock ledger
/// and a price modifier relative to the parent product.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ProductVariant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub price_modifier_cents: i64,
    pub stock_quantity: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn product(price: i64, sale: Option<i64>) -> Product {
        Product {
            id: Uuid::new_v4(),
            name: "Kopi Gayo 250g".to_string(),
            price_cents: price,
            sale_price_cents: sale,
            stock_quantity: 10,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn sale_price_wins_only_when_lower() {
        assert_eq!(product(50_000, None).effective_price_cents(), 50_000);
        assert_eq!(product(50_000, Some(45_000)).effective_price_cents(), 45_000);
        // A "sale" price above base is ignored.
        assert_eq!(product(50_000, Some(60_000)).effective_price_cents(), 50_000);
    }
}
