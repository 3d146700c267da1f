//! Bearer token model for customer authentication.
//!
//! Tokens are issued by the storefront layer and stored here as SHA-256
//! hashes; this service only resolves them to a customer identity.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Represents an API token record from the database.
///
/// Maps to the `api_tokens` table. Inactive tokens are rejected during
/// authentication, which allows revocation without deleting the record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiToken {
    /// Unique identifier for this token
    pub id: Uuid,

    /// SHA-256 hash of the raw bearer token (64 hex characters)
    pub token_hash: String,

    /// Customer this token authenticates as
    pub user_id: Uuid,

    /// Human-readable label (device, session origin)
    pub label: Option<String>,

    /// Whether this token is currently active
    pub is_active: bool,

    /// Timestamp when this token was created
    pub created_at: DateTime<Utc>,
}
