//! Order data models, lifecycle enums, and API request/response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{address::OrderShippingAddress, payment::PaymentTransactionResponse};

/// Order lifecycle status, independent from the payment axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Cancelled,
    Expired,
}

/// Payment lifecycle status.
///
/// `Pending` is the only state that may transition; every other state is
/// absorbing. All writers must go through conditional updates keyed on
/// `pending` so a duplicate webhook or a racing poll becomes a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
    Expired,
}

impl PaymentStatus {
    /// Whether this status can never change again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

/// Payment method selected at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Bank virtual account; requires a bank channel.
    BankTransfer,
    /// QRIS scannable code.
    Qris,
    /// Cash on delivery; no gateway involvement.
    Cod,
}

impl PaymentMethod {
    /// Gateway `payment_type` string for this method.
    pub fn gateway_payment_type(self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Qris => "qris",
            PaymentMethod::Cod => "cod",
        }
    }

    /// Whether completing this method involves the external gateway.
    pub fn uses_gateway(self) -> bool {
        !matches!(self, PaymentMethod::Cod)
    }
}

/// Represents an order record from the database.
///
/// `total_cents` is fixed at creation (it is the amount the gateway was
/// charged) and is never recomputed afterward. Status fields are mutated
/// only by the reconciliation and cancellation paths.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub payment_channel: Option<String>,
    pub subtotal_cents: i64,
    pub shipping_cents: i64,
    pub service_fee_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Snapshot of one purchased line, frozen at creation.
///
/// `product_name` and `variant_name` are copied from the catalog at purchase
/// time and must not change if the catalog entry changes later.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct OrderItem {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub product_name: String,
    pub variant_name: Option<String>,
    pub unit_price_cents: i64,
    pub quantity: i32,
    pub total_cents: i64,
}

/// One line of a create-order request.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
}

/// Request body for creating an order.
///
/// # JSON Example
///
/// ```json
/// {
///   "items": [{ "product_id": "550e8400-...", "quantity": 2 }],
///   "address_id": "660e8400-...",
///   "payment_method": "qris",
///   "notes": "leave at the front desk"
/// }
/// ```
///
/// Totals are always computed server-side; a client-supplied total would
/// never be trusted and is not even part of the schema.
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItemRequest>,
    pub address_id: Uuid,
    pub payment_method: PaymentMethod,
    /// Bank channel for `bank_transfer` (e.g. "bca", "bni", "permata").
    pub payment_channel: Option<String>,
    /// Contact email forwarded to the gateway for payment notifications.
    pub customer_email: Option<String>,
    pub notes: Option<String>,
}

/// Full order view returned by the API: the order row plus its immutable
/// item and address snapshots and the latest payment transaction.
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub shipping_address: OrderShippingAddress,
    pub payment: PaymentTransactionResponse,
    /// Deadline after which an unpaid order may be cancelled.
    /// None for cash-on-delivery.
    pub payment_deadline: Option<DateTime<Utc>>,
}
