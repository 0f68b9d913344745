//! Subsync billing service binary.
//!
//! Boots the HTTP edge over the postgres-backed billing core.
//!
//! ## REST Endpoints
//!
//! - `POST /api/purchases` - Record a store purchase from a submitted receipt
//! - `GET /api/subscription` - Get current user's reconciled subscription
//! - `POST /api/webhooks/google-play` - Handle Google Play Pub/Sub pushes
//! - `POST /api/webhooks/app-store` - Handle App Store server notifications
//!
//! ## Health Endpoints
//!
//! - `GET /health` - Liveness probe

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use subsync::adapters::app_store::AppStoreApiClient;
use subsync::adapters::google_play::GooglePlayApiClient;
use subsync::adapters::http::billing::{billing_router, BillingAppState};
use subsync::adapters::postgres::{
    PostgresBuyableRepository, PostgresPurchaseLedger, PostgresSubscriptionRepository,
};
use subsync::adapters::InMemoryEventBus;
use subsync::config::{AppConfig, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load and validate configuration before anything else touches it
    let config = AppConfig::load()?;
    config.validate()?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.server.log_level)?)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting subsync billing service");
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        environment = ?config.server.environment,
        "Configuration loaded"
    );

    // Create database pool
    let pool = create_pool(&config).await?;
    tracing::info!("Database pool created");

    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Migrations applied");
    }

    // Wire adapters into the shared state
    let state = BillingAppState {
        buyable_repository: Arc::new(PostgresBuyableRepository::new(pool.clone())),
        subscription_repository: Arc::new(PostgresSubscriptionRepository::new(pool.clone())),
        purchase_ledger: Arc::new(PostgresPurchaseLedger::new(pool.clone())),
        google_play_client: Arc::new(GooglePlayApiClient::new(config.google_play.clone())),
        app_store_client: Arc::new(AppStoreApiClient::new(config.app_store.clone())),
        event_publisher: Arc::new(InMemoryEventBus::new()),
        live_verification: config.features.vendor_receipt_verification,
    };

    let app = build_router(state, &config.server);

    let addr = config.server.socket_addr()?;
    tracing::info!("HTTP server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn create_pool(config: &AppConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .idle_timeout(config.database.idle_timeout())
        .max_lifetime(config.database.max_lifetime())
        .connect(&config.database.url)
        .await
}

fn build_router(state: BillingAppState, server: &ServerConfig) -> Router {
    // Build middleware stack (order matters - outermost first)
    let middleware = ServiceBuilder::new()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(server))
        .layer(TimeoutLayer::new(Duration::from_secs(
            server.request_timeout_secs,
        )));

    // Health route stays outside the middleware stack so probes never
    // time out behind a slow request
    Router::new()
        .nest("/api", billing_router())
        .layer(middleware)
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
