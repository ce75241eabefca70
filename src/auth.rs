use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower_sessions::Session;

use crate::error::ApiError;
use crate::models::{Credentials, Envelope, SessionUser};
use crate::AppState;

const SESSION_KEY: &str = "SESSION";

lazy_static::lazy_static! {
    /// Every new account starts with this much cash.
    static ref STARTING_BALANCE: Decimal = Decimal::new(1_000_000_00, 2);
}

/// Register a new user and create their account with the starting balance.
pub async fn register(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<(StatusCode, Json<Envelope<Value>>), ApiError> {
    if credentials.username.trim().is_empty() || credentials.password.is_empty() {
        return Err(ApiError::Validation(
            "username and password must not be empty".to_string(),
        ));
    }

    let password_hash = hash_password(&credentials.password)?;
    let user = state
        .pool
        .create_user(&credentials.username, &password_hash, *STARTING_BALANCE)
        .await?;

    tracing::info!("registered user {}", user.username);
    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(json!({ "username": user.username }))),
    ))
}

/// Verify credentials and store the username in the session.
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(credentials): Json<Credentials>,
) -> Result<Json<Envelope<Value>>, ApiError> {
    let user = match state.pool.get_user(&credentials.username).await {
        Ok(user) => user,
        // Unknown usernames look the same as bad passwords.
        Err(ApiError::UserNotFound) => return Err(ApiError::InvalidCredentials),
        Err(other) => return Err(other),
    };

    verify_password(&credentials.password, &user.password_hash)?;

    session
        .insert(
            SESSION_KEY,
            SessionUser {
                username: user.username.clone(),
            },
        )
        .await
        .map_err(|e| ApiError::Internal(format!("session error: {e}")))?;

    Ok(Json(Envelope::ok(json!({ "username": user.username }))))
}

/// Clear the session.
pub async fn logout(session: Session) -> Result<Json<Envelope<Value>>, ApiError> {
    session
        .flush()
        .await
        .map_err(|e| ApiError::Internal(format!("session error: {e}")))?;
    Ok(Json(Envelope::ok(json!({}))))
}

/// Resolve the acting user from the session, or fail with 401.
pub async fn current_user(session: &Session) -> Result<SessionUser, ApiError> {
    let user: SessionUser = session
        .get(SESSION_KEY)
        .await
        .map_err(|e| ApiError::Internal(format!("session error: {e}")))?
        .unwrap_or_default();

    if user.username.is_empty() {
        return Err(ApiError::Unauthorized);
    }
    Ok(user)
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("failed to hash password: {e}")))
}

fn verify_password(password: &str, password_hash: &str) -> Result<(), ApiError> {
    let parsed = PasswordHash::new(password_hash)
        .map_err(|e| ApiError::Internal(format!("corrupt password hash: {e}")))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| ApiError::InvalidCredentials)
}
