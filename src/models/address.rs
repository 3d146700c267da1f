//! Address book entries and the per-order shipping snapshot.
//!
//! The snapshot is copied onto the order at creation time so later edits to
//! the customer's address book never change where an order was shipped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A customer's mutable address book entry. Owned by the storefront layer;
/// read here only to validate ownership and take the snapshot.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Address {
    pub id: Uuid,
    pub user_id: Uuid,
    pub recipient_name: String,
    pub phone: String,
    pub street: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub country_code: String,
    pub created_at: DateTime<Utc>,
}

/// Frozen copy of the shipping address attached to one order.
///
/// Created once with the order, never updated.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct OrderShippingAddress {
    #[serde(skip_serializing)]
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub order_id: Uuid,
    pub recipient_name: String,
    pub phone: String,
    pub street: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub country_code: String,
}
