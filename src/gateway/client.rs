//! Payment gateway HTTP client (Midtrans Core API wire format).
//!
//! The client makes exactly one outbound call per operation and never
//! retries internally: a retried charge against a non-idempotent endpoint
//! could double-charge, so retry policy belongs to the caller.
//!
//! Gateway responses carry their own `status_code` field, and a business
//! rejection can arrive with transport-level HTTP 200. Outcomes are
//! therefore typed ([`ChargeOutcome`]) and derived from the body, never from
//! the HTTP status alone.

use serde_json::{Value, json};

use crate::{
    config::Config,
    error::AppError,
    models::{address::OrderShippingAddress, order::PaymentMethod},
};

/// Gateway field limits, per the provider's documented constraints.
const MAX_NAME_LEN: usize = 50;
const MAX_ADDRESS_LEN: usize = 200;
const MAX_PHONE_LEN: usize = 19;

/// One itemized line sent to the gateway. The gateway validates that these
/// sum exactly to the charged gross amount.
#[derive(Debug, Clone)]
pub struct ChargeItem {
    pub id: String,
    pub name: String,
    pub price_cents: i64,
    pub quantity: i32,
}

/// Internal charge request, assembled by the order creator.
///
/// `order_number` doubles as the gateway's order key: it is derived once
/// before the charge and never regenerated on retry.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub order_number: String,
    pub gross_amount_cents: i64,
    pub payment_method: PaymentMethod,
    pub channel: Option<String>,
    pub items: Vec<ChargeItem>,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: String,
}

/// Typed result of a gateway call that produced a parseable body.
///
/// Transport failures (connect, timeout, non-JSON body) are reported
/// separately as `AppError::GatewayUnavailable`.
#[derive(Debug, Clone)]
pub enum ChargeOutcome {
    /// The gateway accepted the operation; the raw body is kept for
    /// normalization and forensic storage.
    Success(Value),
    /// The gateway parsed our request and said no (unsupported channel,
    /// merchant misconfiguration, unknown order).
    Rejected {
        status_code: String,
        message: String,
        raw: Value,
    },
}

/// HTTP client for the payment gateway.
///
/// Constructed once at startup from validated configuration and shared
/// through application state.
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    server_key: String,
}

impl GatewayClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            base_url: config.gateway_base_url.trim_end_matches('/').to_string(),
            server_key: config.gateway_server_key.clone(),
        })
    }

    /// Initiate a charge. One network call, no internal retry.
    pub async fn charge(
        &self,
        request: &ChargeRequest,
        shipping: &OrderShippingAddress,
    ) -> Result<ChargeOutcome, AppError> {
        let body = build_charge_body(request, shipping)?;
        let url = format!("{}/v2/charge", self.base_url);

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.server_key, Some(""))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("charge request failed: {e}")))?;

        let raw: Value = response
            .json()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("unreadable charge response: {e}")))?;

        Ok(parse_gateway_body(raw))
    }

    /// Query the gateway for the current status of an order's transaction.
    ///
    /// Keyed on our order number, which the gateway stores as its order id.
    pub async fn fetch_status(&self, order_number: &str) -> Result<ChargeOutcome, AppError> {
        let url = format!("{}/v2/{}/status", self.base_url, order_number);

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.server_key, Some(""))
            .send()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("status request failed: {e}")))?;

        let raw: Value = response
            .json()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("unreadable status response: {e}")))?;

        Ok(parse_gateway_body(raw))
    }
}

/// Classify a gateway response body by its embedded `status_code`.
///
/// "200" and "201" are success; everything else (including bodies without a
/// status code at all) is a rejection to be inspected by the caller.
pub fn parse_gateway_body(raw: Value) -> ChargeOutcome {
    let status_code = raw
        .get("status_code")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    match status_code.as_str() {
        "200" | "201" => ChargeOutcome::Success(raw),
        _ => {
            let message = raw
                .get("status_message")
                .and_then(Value::as_str)
                .unwrap_or("no status message")
                .to_string();
            ChargeOutcome::Rejected { status_code, message, raw }
        }
    }
}

/// Build the provider wire body for a charge.
///
/// Fails with a validation error if the itemized lines do not sum exactly to
/// the gross amount; the gateway enforces the same identity and a mismatch
/// here is always a local arithmetic bug.
pub fn build_charge_body(
    request: &ChargeRequest,
    shipping: &OrderShippingAddress,
) -> Result<Value, AppError> {
    let item_sum: i64 = request
        .items
        .iter()
        .map(|i| i.price_cents * i64::from(i.quantity))
        .sum();
    if item_sum != request.gross_amount_cents {
        return Err(AppError::Validation(format!(
            "item lines sum to {} but gross amount is {}",
            item_sum, request.gross_amount_cents
        )));
    }

    let items: Vec<Value> = request
        .items
        .iter()
        .map(|item| {
            json!({
                "id": item.id,
                "price": item.price_cents,
                "quantity": item.quantity,
                "name": truncate(&item.name, MAX_NAME_LEN),
            })
        })
        .collect();

    let mut body = json!({
        "payment_type": request.payment_method.gateway_payment_type(),
        "transaction_details": {
            "order_id": request.order_number,
            "gross_amount": request.gross_amount_cents,
        },
        "item_details": items,
        "customer_details": {
            "first_name": truncate(&request.customer_name, MAX_NAME_LEN),
            "email": request.customer_email,
            "phone": digits_only(&request.customer_phone),
            "shipping_address": {
                "first_name": truncate(&shipping.recipient_name, MAX_NAME_LEN),
                "phone": digits_only(&shipping.phone),
                "address": truncate(&shipping.street, MAX_ADDRESS_LEN),
                "city": truncate(&shipping.city, MAX_NAME_LEN),
                "postal_code": shipping.postal_code,
                "country_code": normalize_country(&shipping.country_code),
            },
        },
    });

    if request.payment_method == PaymentMethod::BankTransfer {
        let bank = request
            .channel
            .as_deref()
            .ok_or_else(|| AppError::Validation("bank_transfer requires a bank channel".into()))?;
        body["bank_transfer"] = json!({ "bank": bank });
    }

    Ok(body)
}

/// Truncate a free-text field to the gateway's limit, on a char boundary.
fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Normalize a phone number to digits only, capped at the gateway limit.
/// A leading "+" country prefix is folded into the digits.
fn digits_only(phone: &str) -> String {
    phone
        .chars()
        .filter(char::is_ascii_digit)
        .take(MAX_PHONE_LEN)
        .collect()
}

/// Normalize a country code to the ISO-3166 alpha-3 form the gateway expects.
/// Unknown or empty values fall back to the merchant's home market.
fn normalize_country(code: &str) -> String {
    let upper = code.trim().to_ascii_uppercase();
    match upper.as_str() {
        "" | "ID" | "IDN" => "IDN".to_string(),
        other if other.len() == 3 => other.to_string(),
        _ => "IDN".to_string(),
    }
}
