//! Gateway webhook signature verification.
//!
//! Notifications carry `signature_key = hex(sha512(order_id + status_code +
//! gross_amount + server_key))`. The signature must verify before any other
//! notification field is trusted.

use sha2::{Digest, Sha512};

use crate::models::payment::GatewayNotification;

/// Verify a notification's signature against the configured server key.
pub fn verify_notification(notification: &GatewayNotification, server_key: &str) -> bool {
    let expected = compute_signature(
        &notification.order_id,
        &notification.status_code,
        &notification.gross_amount,
        server_key,
    );
    constant_time_eq(expected.as_bytes(), notification.signature_key.as_bytes())
}

fn compute_signature(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &str,
) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compare without early exit so timing does not leak match length.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVER_KEY: &str = "SB-Mid-server-testkey";

    fn notification(signature_key: String) -> GatewayNotification {
        GatewayNotification {
            order_id: "ORD-20250110-A1B2C3".to_string(),
            transaction_id: Some("tx-1".to_string()),
            transaction_status: "settlement".to_string(),
            status_code: "200".to_string(),
            gross_amount: "115000.00".to_string(),
            signature_key,
            fraud_status: None,
        }
    }

    #[test]
    fn accepts_valid_signature() {
        let signature =
            compute_signature("ORD-20250110-A1B2C3", "200", "115000.00", SERVER_KEY);
        assert!(verify_notification(&notification(signature), SERVER_KEY));
    }

    #[test]
    fn rejects_tampered_amount() {
        let signature =
            compute_signature("ORD-20250110-A1B2C3", "200", "115000.00", SERVER_KEY);
        let mut tampered = notification(signature);
        tampered.gross_amount = "1.00".to_string();
        assert!(!verify_notification(&tampered, SERVER_KEY));
    }

    #[test]
    fn rejects_wrong_key_and_garbage() {
        let signature =
            compute_signature("ORD-20250110-A1B2C3", "200", "115000.00", "other-key");
        assert!(!verify_notification(&notification(signature), SERVER_KEY));
        assert!(!verify_notification(&notification("nonsense".to_string()), SERVER_KEY));
    }
}
