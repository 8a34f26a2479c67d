//! Libris Server - Library Lending System
//!
//! REST API server for library lending management.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use libris_server::{
    api,
    config::AppConfig,
    repository::Repository,
    services::{cache::CacheService, Services},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().expect("Failed to load configuration");

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("libris_server={},tower_http=debug", config.logging.level).into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Libris Server v{}", env!("CARGO_PKG_VERSION"));

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations completed");

    // Initialize the read-side cache; an unreachable Redis only degrades
    // list/search queries to uncached reads
    let cache = CacheService::connect(&config.redis.url, config.cache.ttl_seconds).await;

    // Save server address before moving config
    let server_host = config.server.host.clone();
    let server_port = config.server.port;

    // Create repository and services
    let repository = Repository::new(pool);
    let services = Services::new(repository, config.auth.clone(), cache);

    // Create application state
    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(
        server_host.parse().expect("Invalid host address"),
        server_port,
    );

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    // Peer addresses are needed by the rate limiter's key extractor
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Create the application router with all routes
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Rate limiter for the books list/search endpoint
    let governor_conf = Box::leak(Box::new(
        GovernorConfigBuilder::default()
            .per_second(state.config.rate_limit.per_second)
            .burst_size(state.config.rate_limit.burst_size)
            .finish()
            .expect("Invalid rate limit configuration"),
    ));

    let rate_limited = Router::new()
        .route("/books", get(api::books::list_books))
        .layer(GovernorLayer {
            config: governor_conf,
        });

    let api_routes = Router::new()
        // Authentication
        .route("/auth/register", post(api::auth::register))
        .route("/auth/login", post(api::auth::login))
        // Books (catalog)
        .route("/books", post(api::books::create_book))
        .route("/books/:id", get(api::books::get_book))
        .route("/books/:id", put(api::books::update_book))
        .route("/books/:id", delete(api::books::delete_book))
        // Borrowers
        .route("/borrowers", get(api::borrowers::list_borrowers))
        .route("/borrowers/:id", get(api::borrowers::get_borrower))
        .route("/borrowers/:id", put(api::borrowers::update_borrower))
        .route("/borrowers/:id", delete(api::borrowers::delete_borrower))
        // Loans
        .route("/loans", post(api::loans::checkout))
        .route("/loans/me", get(api::loans::my_loans))
        .route("/loans/overdue", get(api::loans::overdue_loans))
        .route("/loans/:id/return", post(api::loans::return_loan))
        // Reports
        .route(
            "/reports/overdue/last-month.csv",
            get(api::reports::overdue_last_month),
        )
        .route(
            "/reports/borrows/last-month.csv",
            get(api::reports::borrows_last_month),
        )
        .merge(rate_limited)
        .with_state(state);

    // OpenAPI documentation
    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(api::health::health_check))
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
