// Main entry point for the API server

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use graphgate_core::kernel::{RedisTokenStore, ServerDeps};
use graphgate_core::server::{build_app, AppState};
use graphgate_core::Config;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,graphgate_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting graphgate API");

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(field_scope = %config.field_scope, "Configuration loaded");

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    tracing::info!("Connecting to token store...");
    let token_store = RedisTokenStore::connect(&config.redis_url, config.token_ttl)
        .await
        .context("Failed to connect to Redis")?;
    tracing::info!("Token store connected");

    let deps = ServerDeps::postgres(pool.clone(), Arc::new(token_store));
    let state = AppState::new(deps, config.field_scope, config.password_cost).with_db_pool(pool);
    let app = build_app(state, config.request_timeout);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("GraphQL endpoint: http://localhost:{}/graphql", config.port);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}
