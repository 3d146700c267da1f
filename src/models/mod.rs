//! Data models representing database entities and API request/response types.

/// Customer bearer token model
pub mod api_token;
/// Address book entries and frozen order shipping snapshots
pub mod address;
/// Product and variant inventory models
pub mod catalog;
/// Order, order item, and order lifecycle enums
pub mod order;
/// Payment transaction and normalized payment instruction models
pub mod payment;
