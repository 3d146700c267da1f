//! HTTP request handlers (route handlers).

/// Service health endpoint
pub mod health;
/// Order creation, retrieval, sync, and cancellation endpoints
pub mod orders;
/// Inbound gateway webhook endpoint
pub mod payments;
