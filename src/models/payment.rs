//! Payment transaction models and the normalized payment instruction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::PaymentStatus;

/// Represents a payment transaction record from the database.
///
/// One per order. Holds the gateway-assigned transaction id, the normalized
/// instruction fields extracted from the gateway response, and the raw
/// response itself for forensic replay.
///
/// `expires_at`, once set, is immutable; it defines the expiry deadline and
/// is never recomputed on retry.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub order_id: Uuid,

    /// Gateway identifier, or "offline" for cash-on-delivery.
    pub provider: String,

    /// Gateway payment type ("bank_transfer", "qris", "cod").
    pub payment_type: String,

    /// Sub-channel within the payment type (bank code for VA).
    pub channel: Option<String>,

    pub status: PaymentStatus,

    /// Gateway-assigned transaction id; null until the gateway responds.
    pub gateway_transaction_id: Option<String>,

    pub va_number: Option<String>,
    pub va_bank: Option<String>,
    pub qr_string: Option<String>,
    pub qr_image_url: Option<String>,
    pub payment_url: Option<String>,
    pub instructions: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,

    /// Raw gateway response body, kept verbatim.
    pub raw_response: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Uniform payment instruction produced by the normalizer.
///
/// Every downstream consumer (persistence, API responses) works from this
/// shape regardless of which gateway payload variant produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentInstruction {
    pub provider: String,
    pub payment_type: String,
    pub channel: Option<String>,
    pub gateway_transaction_id: Option<String>,
    pub va_number: Option<String>,
    pub va_bank: Option<String>,
    pub qr_string: Option<String>,
    pub qr_image_url: Option<String>,
    pub payment_url: Option<String>,
    pub instructions: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Payment fields exposed to API clients.
///
/// Strips the raw gateway response and internal ids.
#[derive(Debug, Serialize)]
pub struct PaymentTransactionResponse {
    pub provider: String,
    pub payment_type: String,
    pub channel: Option<String>,
    pub status: PaymentStatus,
    pub gateway_transaction_id: Option<String>,
    pub va_number: Option<String>,
    pub va_bank: Option<String>,
    pub qr_string: Option<String>,
    pub qr_image_url: Option<String>,
    pub payment_url: Option<String>,
    pub instructions: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<PaymentTransaction> for PaymentTransactionResponse {
    fn from(tx: PaymentTransaction) -> Self {
        Self {
            provider: tx.provider,
            payment_type: tx.payment_type,
            channel: tx.channel,
            status: tx.status,
            gateway_transaction_id: tx.gateway_transaction_id,
            va_number: tx.va_number,
            va_bank: tx.va_bank,
            qr_string: tx.qr_string,
            qr_image_url: tx.qr_image_url,
            payment_url: tx.payment_url,
            instructions: tx.instructions,
            expires_at: tx.expires_at,
        }
    }
}

/// Status notification posted by the gateway to `/payments/{provider}`.
///
/// No field is trusted until `signature_key` has been verified against the
/// configured server key.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayNotification {
    /// Our order number; the gateway echoes back its `order_id`.
    pub order_id: String,
    pub transaction_id: Option<String>,
    pub transaction_status: String,
    pub status_code: String,
    /// Decimal string, e.g. "150000.00".
    pub gross_amount: String,
    pub signature_key: String,
    pub fraud_status: Option<String>,
}
