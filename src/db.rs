//! Database connection pool, migrations, and shared application state.

use std::sync::Arc;

use sqlx::{Pool, Postgres};

use crate::{config::Config, gateway::client::GatewayClient};

/// Type alias for the PostgreSQL connection pool.
pub type DbPool = Pool<Postgres>;

/// Shared state handed to every handler via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub gateway: Arc<GatewayClient>,
    pub config: Arc<Config>,
}

/// Create a new PostgreSQL connection pool.
///
/// Connections are created lazily and reused across requests.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}

/// Run database migrations from the `migrations/` directory.
///
/// Migrations are embedded at compile time and tracked in the
/// `_sqlx_migrations` table, so each file runs exactly once.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
