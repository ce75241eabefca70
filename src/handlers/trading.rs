use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tower_sessions::Session;

use crate::auth::current_user;
use crate::error::ApiError;
use crate::models::{Envelope, TradeRequest, Transaction};
use crate::{trading, AppState};

/// Buy shares for the logged-in user. The body names the symbol and the
/// quantity; the price is the latest close at execution time.
pub async fn buy_stock(
    State(state): State<AppState>,
    session: Session,
    Json(trade): Json<TradeRequest>,
) -> Result<(StatusCode, Json<Envelope<Transaction>>), ApiError> {
    let user = current_user(&session).await?;
    let receipt = trading::buy(&state.pool, state.quotes.as_ref(), &user.username, &trade).await?;

    tracing::info!(
        "{} bought {} x {}",
        user.username,
        receipt.quantity,
        receipt.symbol
    );
    Ok((StatusCode::CREATED, Json(Envelope::ok(receipt))))
}

/// Sell shares for the logged-in user.
pub async fn sell_stock(
    State(state): State<AppState>,
    session: Session,
    Json(trade): Json<TradeRequest>,
) -> Result<(StatusCode, Json<Envelope<Transaction>>), ApiError> {
    let user = current_user(&session).await?;
    let receipt = trading::sell(&state.pool, state.quotes.as_ref(), &user.username, &trade).await?;

    tracing::info!(
        "{} sold {} x {}",
        user.username,
        receipt.quantity,
        receipt.symbol
    );
    Ok((StatusCode::CREATED, Json(Envelope::ok(receipt))))
}
