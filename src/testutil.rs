use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::alphavantage::QuoteSource;
use crate::error::ApiError;
use crate::models::{DailyBar, DailySeries, Quote};

/// In-memory quote source for tests. Unknown symbols fail the same way the
/// real client does.
pub struct FixedQuotes(HashMap<String, Decimal>);

impl FixedQuotes {
    pub fn new(closes: &[(&str, Decimal)]) -> Self {
        Self(
            closes
                .iter()
                .map(|(symbol, close)| (symbol.to_string(), *close))
                .collect(),
        )
    }
}

#[async_trait]
impl QuoteSource for FixedQuotes {
    async fn latest_close(&self, symbol: &str) -> Result<Quote, ApiError> {
        self.0
            .get(symbol)
            .map(|close| Quote {
                symbol: symbol.to_string(),
                close: *close,
                date: "2024-01-02".to_string(),
            })
            .ok_or_else(|| ApiError::DataUnavailable(format!("no daily data for {symbol}")))
    }

    async fn daily_series(&self, symbol: &str) -> Result<DailySeries, ApiError> {
        let quote = self.latest_close(symbol).await?;
        Ok(DailySeries {
            symbol: symbol.to_string(),
            bars: vec![DailyBar {
                date: quote.date,
                open: quote.close,
                high: quote.close,
                low: quote.close,
                close: quote.close,
                volume: 0,
            }],
        })
    }
}
