//! Bearer-token authentication middleware.
//!
//! Intercepts every order route to resolve the caller to a customer
//! identity. Tokens are issued by the storefront layer; this service only
//! hashes and looks them up.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{db::AppState, error::AppError, models::api_token::ApiToken};

/// Authentication context attached to authenticated requests.
///
/// Inserted into the request's extension map; handlers extract it to scope
/// every query to the calling customer.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
}

/// Authentication middleware.
///
/// Extracts `Authorization: Bearer <token>`, hashes the token with SHA-256,
/// and looks the hash up among active tokens. Failures short-circuit with
/// HTTP 401.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::InvalidToken)?;

    let token = auth_header.strip_prefix("Bearer ").ok_or(AppError::InvalidToken)?;

    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let token_hash = hex::encode(hasher.finalize());

    let record = sqlx::query_as::<_, ApiToken>(
        "SELECT * FROM api_tokens WHERE token_hash = $1 AND is_active = true",
    )
    .bind(&token_hash)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::InvalidToken)?;

    request.extensions_mut().insert(AuthContext { user_id: record.user_id });

    Ok(next.run(request).await)
}
