use axum::extract::{Path, State};
use axum::Json;

use crate::error::ApiError;
use crate::models::{DailySeries, Envelope};
use crate::AppState;

/// Latest daily price history for a symbol.
pub async fn get_stock(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<Envelope<DailySeries>>, ApiError> {
    let series = state.quotes.daily_series(&symbol).await?;
    Ok(Json(Envelope::ok(series)))
}
