use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    MissingVar(&'static str),

    #[error("{0} is not a valid number")]
    InvalidNumber(&'static str),
}

/// Process configuration, loaded once at startup from the environment.
/// The API key is injected here and never logged.
#[derive(Clone, Debug)]
pub struct Config {
    pub api_key: String,
    pub database_path: String,
    pub sessions_path: String,
    pub bind_addr: String,
    pub frontend_url: String,
    pub quote_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = env::var("ALPHAVANTAGE_API_KEY")
            .map_err(|_| ConfigError::MissingVar("ALPHAVANTAGE_API_KEY"))?;

        let quote_timeout_secs = match env::var("QUOTE_TIMEOUT_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidNumber("QUOTE_TIMEOUT_SECS"))?,
            Err(_) => 10,
        };

        Ok(Config {
            api_key,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "db.sqlite".to_string()),
            sessions_path: env::var("SESSIONS_PATH")
                .unwrap_or_else(|_| "sessions.db".to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            quote_timeout: Duration::from_secs(quote_timeout_secs),
        })
    }
}
