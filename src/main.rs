use std::sync::Arc;

use axum::http::header::{ACCESS_CONTROL_ALLOW_CREDENTIALS, CONTENT_TYPE, COOKIE};
use axum::http::HeaderValue;
use axum::{
    routing::{get, post},
    Router,
};
use reqwest::Method;
use rusqlite::Connection;
use time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::{self, TraceLayer};
use tower_sessions::{ExpiredDeletion, Expiry, SessionManagerLayer};
use tower_sessions_rusqlite_store::RusqliteStore;
use tracing::Level;

use stockfolio_backend::alphavantage::{AlphaVantageClient, QuoteSource};
use stockfolio_backend::auth::{login, logout, register};
use stockfolio_backend::handlers::{
    portfolio::{get_portfolio, get_transaction_history},
    stocks::get_stock,
    trading::{buy_stock, sell_stock},
};
use stockfolio_backend::{AppState, Config, DatabasePool};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set the log level based on the first argument
    let args: Vec<String> = std::env::args().collect();
    let mut log_level = Level::INFO;
    if args.len() >= 2 {
        log_level = match args[1].as_str() {
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
    }

    // Initalize dotenv so we can read .env file
    dotenv::dotenv().ok();
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .with_max_level(log_level)
        .init();

    tracing::info!("Log level set to: {}", log_level);

    // Initialize our session store as a SQLite database
    let conn = Connection::open(&config.sessions_path)?;
    let session_store = RusqliteStore::new(conn.into());
    session_store.migrate().await?;

    // Start a task to delete expired sessions every 5 seconds
    let deletion_task = tokio::task::spawn(
        session_store
            .clone()
            .continuously_delete_expired(tokio::time::Duration::from_secs(5)),
    );

    // Create session layer with some configuration
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_expiry(Expiry::OnInactivity(Duration::days(7)))
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/");

    // Initialize CORS layer
    let cors = CorsLayer::new()
        .allow_credentials(true)
        .allow_origin(config.frontend_url.parse::<HeaderValue>()?)
        .allow_methods(vec![Method::GET, Method::POST])
        .allow_headers(vec![ACCESS_CONTROL_ALLOW_CREDENTIALS, CONTENT_TYPE, COOKIE]);

    // Holdings store and quote source
    let pool = DatabasePool::open(&config.database_path)?;
    let quotes: Arc<dyn QuoteSource> = Arc::new(AlphaVantageClient::new(
        config.api_key.clone(),
        config.quote_timeout,
    )?);

    let state = AppState { pool, quotes };

    // Build application with routes
    let app = Router::new()
        // Market data routes
        .route("/stock/:symbol", get(get_stock))
        // Portfolio routes
        .route("/user/:username", get(get_portfolio))
        .route("/portfolio/:username", get(get_portfolio))
        .route("/api/transactions", get(get_transaction_history))
        // Trading routes
        .route("/api/buy", post(buy_stock))
        .route("/api/sell", post(sell_stock))
        // Auth routes
        .route("/api/register", post(register))
        .route("/api/login", post(login))
        .route("/api/logout", get(logout))
        // Shared app state
        .with_state(state)
        // Session, CORS, and tracing layers
        .layer(session_layer)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        );

    // Run server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("Listening on: {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    deletion_task.await??;

    Ok(())
}
