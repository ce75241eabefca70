use rust_decimal::Decimal;

use crate::alphavantage::QuoteSource;
use crate::error::ApiError;
use crate::models::{HoldingValue, PortfolioSnapshot, Position};

/// Value a set of positions at current prices.
///
/// The breakdown preserves the input order and the total is the exact
/// decimal sum of the per-symbol values. If any symbol fails to resolve,
/// the whole valuation fails with DataUnavailable; no placeholder values
/// are substituted.
pub async fn value_positions(
    source: &dyn QuoteSource,
    positions: &[Position],
) -> Result<PortfolioSnapshot, ApiError> {
    let mut holdings = Vec::with_capacity(positions.len());
    let mut total_value = Decimal::ZERO;

    for position in positions {
        let quote = source.latest_close(&position.symbol).await?;
        let value = quote.close * Decimal::from(position.quantity);
        total_value += value;
        holdings.push(HoldingValue {
            symbol: position.symbol.clone(),
            quantity: position.quantity,
            last_close: quote.close,
            value,
        });
    }

    Ok(PortfolioSnapshot {
        total_value,
        holdings,
    })
}
