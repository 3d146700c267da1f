//! Order/Payment Orchestrator - Main Application Entry Point
//!
//! REST API server that keeps orders, gateway payment state, and inventory
//! consistent: order creation with atomic stock reservation, gateway charge
//! with normalized payment instructions, webhook- and poll-driven status
//! reconciliation, and cancellation of abandoned payments.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Gateway**: Midtrans-compatible Core API over reqwest
//! - **Authentication**: bearer tokens with SHA-256 hashing
//!
//! # Startup Flow
//!
//! 1. Load and validate configuration from environment variables
//! 2. Create database connection pool and run migrations
//! 3. Construct the gateway client from validated config
//! 4. Build HTTP router with routes and middleware
//! 5. Start server on configured port

mod config;
mod db;
mod error;
mod gateway;
mod handlers;
mod middleware;
mod models;
mod services;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::{db::AppState, gateway::client::GatewayClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging; RUST_LOG controls the filter, defaulting to "info"
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    // Gateway client is built once and shared
    let gateway = Arc::new(GatewayClient::new(&config)?);

    let state = AppState { pool, gateway, config: Arc::new(config.clone()) };

    // Authenticated order routes
    let authenticated_routes = Router::new()
        .route("/api/v1/orders", post(handlers::orders::create_order))
        .route("/api/v1/orders/{order_number}", get(handlers::orders::get_order))
        .route(
            "/api/v1/orders/{order_number}/sync-payment",
            post(handlers::orders::sync_payment),
        )
        .route(
            "/api/v1/orders/{order_number}/cancel",
            put(handlers::orders::cancel_order),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    // Public routes: health, and the gateway webhook whose trust comes from
    // its signature rather than a bearer token
    let app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/payments/{provider}", post(handlers::payments::gateway_webhook))
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
