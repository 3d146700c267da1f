//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers:
//! database transactions, the payment state machine, and the compensation
//! paths around the external gateway call.

pub mod cancel_service;
pub mod inventory_service;
pub mod order_service;
pub mod payment_sync_service;
