//! Payment instruction normalization.
//!
//! Gateway response shapes differ per payment type and have drifted across
//! API versions, so every field is extracted through an ordered list of
//! fallback paths. Missing optional fields are tolerated; a missing
//! *required* field for the payment type is a `MalformedGatewayResponse`,
//! never a silent empty instruction.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde_json::Value;

use crate::{
    error::AppError,
    gateway::{GATEWAY_PROVIDER, OFFLINE_PROVIDER},
    models::{
        order::{PaymentMethod, PaymentStatus},
        payment::PaymentInstruction,
    },
};

/// Gateway timestamps ("expiry_time") are merchant-local WIB (UTC+7) with no
/// offset in the string.
const GATEWAY_UTC_OFFSET_SECS: i32 = 7 * 3600;

/// Map a gateway response into the uniform payment instruction.
///
/// Pure: no I/O, unit-testable against recorded fixture payloads.
pub fn normalize(
    raw: &Value,
    method: PaymentMethod,
    channel: Option<&str>,
) -> Result<PaymentInstruction, AppError> {
    let gateway_transaction_id =
        lookup_str(raw, &["transaction_id"]).map(str::to_string);
    let expires_at = parse_expiry(raw);

    match method {
        PaymentMethod::BankTransfer => {
            // VA fields have moved between `va_numbers`, a permata-specific
            // top-level field, and echannel's `bill_key` across versions.
            let va_number = lookup_str(
                raw,
                &["va_numbers/0/va_number", "permata_va_number", "bill_key"],
            )
            .ok_or_else(|| {
                AppError::MalformedGatewayResponse(
                    "bank_transfer response contains no virtual account number".to_string(),
                )
            })?
            .to_string();

            let va_bank = lookup_str(raw, &["va_numbers/0/bank"])
                .map(str::to_string)
                .or_else(|| channel.map(str::to_string));

            let instructions = va_bank.as_deref().map(|bank| {
                format!(
                    "Transfer the exact amount to {} virtual account {} before the deadline.",
                    bank.to_uppercase(),
                    va_number
                )
            });

            Ok(PaymentInstruction {
                provider: GATEWAY_PROVIDER.to_string(),
                payment_type: method.gateway_payment_type().to_string(),
                channel: channel.map(str::to_string),
                gateway_transaction_id,
                va_number: Some(va_number),
                va_bank,
                qr_string: None,
                qr_image_url: None,
                payment_url: None,
                instructions,
                expires_at,
            })
        }
        PaymentMethod::Qris => {
            let qr_string =
                lookup_str(raw, &["qr_string", "qris_data"]).map(str::to_string);
            let qr_image_url =
                action_url(raw, &["generate-qr-code", "generate-qr-code-v2"]).map(str::to_string);
            let payment_url =
                action_url(raw, &["deeplink-redirect", "mobile_deeplink"]).map(str::to_string);

            // A QR instruction with nothing to scan is unusable.
            if qr_string.is_none() && qr_image_url.is_none() {
                return Err(AppError::MalformedGatewayResponse(
                    "qris response contains neither qr_string nor a QR image action".to_string(),
                ));
            }

            Ok(PaymentInstruction {
                provider: GATEWAY_PROVIDER.to_string(),
                payment_type: method.gateway_payment_type().to_string(),
                channel: channel.map(str::to_string),
                gateway_transaction_id,
                va_number: None,
                va_bank: None,
                qr_string,
                qr_image_url,
                payment_url,
                instructions: Some("Scan the QR code with any QRIS-enabled app.".to_string()),
                expires_at,
            })
        }
        PaymentMethod::Cod => Ok(cod_instruction()),
    }
}

/// Synthesized instruction for cash-on-delivery: no gateway call, no expiry.
pub fn cod_instruction() -> PaymentInstruction {
    PaymentInstruction {
        provider: OFFLINE_PROVIDER.to_string(),
        payment_type: PaymentMethod::Cod.gateway_payment_type().to_string(),
        channel: None,
        gateway_transaction_id: None,
        va_number: None,
        va_bank: None,
        qr_string: None,
        qr_image_url: None,
        payment_url: None,
        instructions: Some(
            "Pay the courier in cash when your order is delivered.".to_string(),
        ),
        expires_at: None,
    }
}

/// Map a gateway `transaction_status` to our payment status.
///
/// Returns None for statuses that carry no transition (still pending, or a
/// capture held for fraud review).
pub fn map_transaction_status(status: &str, fraud_status: Option<&str>) -> Option<PaymentStatus> {
    match status {
        "settlement" => Some(PaymentStatus::Paid),
        "capture" => match fraud_status {
            None | Some("accept") => Some(PaymentStatus::Paid),
            // Held for manual review; not money in the bank yet.
            Some(_) => None,
        },
        "deny" | "cancel" | "failure" => Some(PaymentStatus::Failed),
        "expire" => Some(PaymentStatus::Expired),
        _ => None,
    }
}

/// Walk `value` along slash-separated paths, returning the first string hit.
///
/// Numeric segments index into arrays: "va_numbers/0/va_number".
fn lookup_str<'a>(value: &'a Value, paths: &[&str]) -> Option<&'a str> {
    paths.iter().find_map(|path| {
        let mut current = value;
        for segment in path.split('/') {
            current = match segment.parse::<usize>() {
                Ok(index) => current.get(index)?,
                Err(_) => current.get(segment)?,
            };
        }
        current.as_str().filter(|s| !s.is_empty())
    })
}

/// Find the URL of the first `actions[]` entry whose name matches, in order
/// of preference.
fn action_url<'a>(value: &'a Value, names: &[&str]) -> Option<&'a str> {
    let actions = value.get("actions")?.as_array()?;
    names.iter().find_map(|name| {
        actions
            .iter()
            .find(|a| a.get("name").and_then(Value::as_str) == Some(name))
            .and_then(|a| a.get("url").and_then(Value::as_str))
            .filter(|s| !s.is_empty())
    })
}

/// Parse the gateway's local-time expiry into UTC. Absent or unparseable
/// expiry is simply no expiry; the default pending window applies instead.
fn parse_expiry(raw: &Value) -> Option<DateTime<Utc>> {
    let text = lookup_str(raw, &["expiry_time"])?;
    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").ok()?;
    let offset = FixedOffset::east_opt(GATEWAY_UTC_OFFSET_SECS)?;
    naive
        .and_local_timezone(offset)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use serde_json::json;

    // Fixture shaped like a bank_transfer charge response.
    fn va_fixture() -> Value {
        json!({
            "status_code": "201",
            "transaction_id": "9aed5972-5b6a-401e-894b-a32c91ed1a3a",
            "order_id": "ORD-20250110-A1B2C3",
            "gross_amount": "115000.00",
            "payment_type": "bank_transfer",
            "transaction_status": "pending",
            "va_numbers": [ { "bank": "bca", "va_number": "812785002530231" } ],
            "expiry_time": "2025-01-11 10:00:00"
        })
    }

    #[test]
    fn va_instruction_from_va_numbers() {
        let instruction =
            normalize(&va_fixture(), PaymentMethod::BankTransfer, Some("bca")).unwrap();
        assert_eq!(instruction.va_number.as_deref(), Some("812785002530231"));
        assert_eq!(instruction.va_bank.as_deref(), Some("bca"));
        assert_eq!(instruction.payment_type, "bank_transfer");
        assert!(instruction.instructions.unwrap().contains("BCA"));
        // 10:00 WIB is 03:00 UTC.
        assert_eq!(instruction.expires_at.unwrap().hour(), 3);
    }

    #[test]
    fn va_instruction_falls_back_to_permata_field() {
        let raw = json!({
            "status_code": "201",
            "transaction_id": "tx-1",
            "permata_va_number": "8778001234567890"
        });
        let instruction =
            normalize(&raw, PaymentMethod::BankTransfer, Some("permata")).unwrap();
        assert_eq!(instruction.va_number.as_deref(), Some("8778001234567890"));
        assert_eq!(instruction.va_bank.as_deref(), Some("permata"));
        assert!(instruction.expires_at.is_none());
    }

    #[test]
    fn va_without_account_number_is_malformed() {
        let raw = json!({ "status_code": "201", "transaction_id": "tx-1" });
        let err = normalize(&raw, PaymentMethod::BankTransfer, Some("bca")).unwrap_err();
        assert!(matches!(err, AppError::MalformedGatewayResponse(_)));
    }

    #[test]
    fn qris_instruction_prefers_qr_string() {
        let raw = json!({
            "status_code": "201",
            "transaction_id": "tx-2",
            "qr_string": "00020101021226610014COM.GO-JEK.WWW...",
            "actions": [
                { "name": "generate-qr-code", "url": "https://api.example.com/qr/tx-2" }
            ]
        });
        let instruction = normalize(&raw, PaymentMethod::Qris, None).unwrap();
        assert!(instruction.qr_string.unwrap().starts_with("000201"));
        assert_eq!(
            instruction.qr_image_url.as_deref(),
            Some("https://api.example.com/qr/tx-2")
        );
    }

    #[test]
    fn qris_with_only_action_url_is_valid() {
        let raw = json!({
            "status_code": "201",
            "transaction_id": "tx-3",
            "actions": [
                { "name": "deeplink-redirect", "url": "gojek://pay/tx-3" },
                { "name": "generate-qr-code-v2", "url": "https://api.example.com/v2/qr/tx-3" }
            ]
        });
        let instruction = normalize(&raw, PaymentMethod::Qris, None).unwrap();
        assert!(instruction.qr_string.is_none());
        assert_eq!(
            instruction.qr_image_url.as_deref(),
            Some("https://api.example.com/v2/qr/tx-3")
        );
        assert_eq!(instruction.payment_url.as_deref(), Some("gojek://pay/tx-3"));
    }

    #[test]
    fn qris_with_no_code_at_all_is_malformed() {
        let raw = json!({ "status_code": "201", "transaction_id": "tx-4", "actions": [] });
        let err = normalize(&raw, PaymentMethod::Qris, None).unwrap_err();
        assert!(matches!(err, AppError::MalformedGatewayResponse(_)));
    }

    #[test]
    fn cod_synthesizes_static_instruction() {
        let instruction = normalize(&Value::Null, PaymentMethod::Cod, None).unwrap();
        assert_eq!(instruction.provider, "offline");
        assert!(instruction.expires_at.is_none());
        assert!(instruction.instructions.unwrap().contains("cash"));
    }

    #[test]
    fn status_mapping_covers_terminal_and_pending_cases() {
        assert_eq!(map_transaction_status("settlement", None), Some(PaymentStatus::Paid));
        assert_eq!(map_transaction_status("capture", Some("accept")), Some(PaymentStatus::Paid));
        assert_eq!(map_transaction_status("capture", Some("challenge")), None);
        assert_eq!(map_transaction_status("pending", None), None);
        assert_eq!(map_transaction_status("deny", None), Some(PaymentStatus::Failed));
        assert_eq!(map_transaction_status("cancel", None), Some(PaymentStatus::Failed));
        assert_eq!(map_transaction_status("expire", None), Some(PaymentStatus::Expired));
        assert_eq!(map_transaction_status("refund", None), None);
    }

    #[test]
    fn lookup_walks_arrays_and_skips_empty_strings() {
        let raw = json!({ "a": [ { "b": "" }, { "b": "value" } ] });
        assert_eq!(lookup_str(&raw, &["a/0/b", "a/1/b"]), Some("value"));
        assert_eq!(lookup_str(&raw, &["missing", "a/9/b"]), None);
    }
}
