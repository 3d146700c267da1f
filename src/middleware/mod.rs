//! HTTP middleware components.

/// Bearer-token authentication middleware
pub mod auth;
