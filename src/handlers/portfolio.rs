use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use tower_sessions::Session;

use crate::auth::current_user;
use crate::error::ApiError;
use crate::models::{Envelope, PortfolioSnapshot, Transaction};
use crate::{valuation, AppState};

#[derive(Serialize, Debug)]
pub struct PortfolioResponse {
    pub username: String,
    #[serde(flatten)]
    pub snapshot: PortfolioSnapshot,
}

/// Current value of a user's portfolio: total plus a per-symbol breakdown
/// in position order. Serves both /user/:username and /portfolio/:username.
pub async fn get_portfolio(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Envelope<PortfolioResponse>>, ApiError> {
    let positions = state.pool.get_positions(&username).await?;
    let snapshot = valuation::value_positions(state.quotes.as_ref(), &positions).await?;

    Ok(Json(Envelope::ok(PortfolioResponse { username, snapshot })))
}

/// The acting user's trade history, newest first.
pub async fn get_transaction_history(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Envelope<Vec<Transaction>>>, ApiError> {
    let user = current_user(&session).await?;
    let transactions = state.pool.get_transactions(&user.username).await?;
    Ok(Json(Envelope::ok(transactions)))
}
