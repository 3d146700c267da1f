//! Payment gateway integration.
//!
//! The gateway is treated as an external system with its own truth: charge
//! calls go out through [`client`], heterogeneous response shapes are mapped
//! into one `PaymentInstruction` by [`normalize`], and inbound notifications
//! are authenticated by [`signature`] before any field is trusted.

/// Outbound charge and status-poll HTTP client
pub mod client;
/// Pure gateway-response → payment-instruction normalizer
pub mod normalize;
/// Webhook notification signature verification
pub mod signature;

/// Provider id for the external gateway.
pub const GATEWAY_PROVIDER: &str = "midtrans";

/// Provider id recorded for cash-on-delivery, which never touches a gateway.
pub const OFFLINE_PROVIDER: &str = "offline";
