// src/lib.rs
pub mod alphavantage;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod trading;
pub mod valuation;

#[cfg(test)]
pub mod testutil;

// Re-export commonly used items
pub use config::Config;
pub use db::DatabasePool;
pub use error::ApiError;
pub use models::*;

use std::sync::Arc;

use alphavantage::QuoteSource;

/// Shared state handed to every handler: the holdings store and the
/// quote source behind its trait, so tests can swap in a fake.
#[derive(Clone)]
pub struct AppState {
    pub pool: DatabasePool,
    pub quotes: Arc<dyn QuoteSource>,
}
