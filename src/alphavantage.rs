use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::Mutex;
use url::Url;

use crate::error::ApiError;
use crate::models::{DailyBar, DailySeries, Quote};

const BASE_URL: &str = "https://www.alphavantage.co/query";
const CACHE_TTL: Duration = Duration::from_secs(300);
const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(250);

/// Anything that can answer price questions for a symbol.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn latest_close(&self, symbol: &str) -> Result<Quote, ApiError>;
    async fn daily_series(&self, symbol: &str) -> Result<DailySeries, ApiError>;
}

/// Response structure for the Alpha Vantage TIME_SERIES_DAILY endpoint.
/// The upstream signals errors through one of three top-level string fields;
/// "Note" and "Information" mean rate limiting, "Error Message" is terminal.
#[derive(Deserialize, Debug)]
struct TimeSeriesResponse {
    #[serde(rename = "Time Series (Daily)")]
    time_series: Option<HashMap<String, RawDailyBar>>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawDailyBar {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume")]
    volume: String,
}

/// How a fetch failed: transient errors are retried with backoff,
/// terminal ones surface immediately.
#[derive(Debug)]
enum FetchError {
    Transient(String),
    Terminal(ApiError),
}

/// Alpha Vantage client with a short-lived latest-close cache. The full
/// series fetch is the dominant cost of valuation, so latest closes are
/// cached for five minutes; series requests always go upstream.
pub struct AlphaVantageClient {
    client: reqwest::Client,
    api_key: String,
    cache: Mutex<HashMap<String, (Quote, Instant)>>,
}

impl AlphaVantageClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Internal(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Fetch the daily series with bounded retry. Backoff doubles between
    /// attempts; only transient failures are retried.
    async fn get_series(&self, symbol: &str) -> Result<Vec<DailyBar>, ApiError> {
        let mut backoff = INITIAL_BACKOFF;
        let mut last_error = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            match self.try_fetch_series(symbol).await {
                Ok(bars) => return Ok(bars),
                Err(FetchError::Terminal(e)) => return Err(e),
                Err(FetchError::Transient(msg)) => {
                    tracing::warn!(
                        "quote fetch for {} failed (attempt {}/{}): {}",
                        symbol,
                        attempt,
                        MAX_ATTEMPTS,
                        msg
                    );
                    last_error = msg;
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }

        Err(ApiError::DataUnavailable(last_error))
    }

    async fn try_fetch_series(&self, symbol: &str) -> Result<Vec<DailyBar>, FetchError> {
        let mut url = Url::parse(BASE_URL)
            .map_err(|e| FetchError::Terminal(ApiError::Internal(e.to_string())))?;
        url.query_pairs_mut()
            .append_pair("function", "TIME_SERIES_DAILY")
            .append_pair("symbol", symbol)
            .append_pair("apikey", &self.api_key);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(FetchError::Transient(format!("upstream HTTP {status}")));
        }
        if !status.is_success() {
            return Err(FetchError::Terminal(ApiError::DataUnavailable(format!(
                "upstream HTTP {status}"
            ))));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        parse_series(&body, symbol)
    }
}

fn parse_series(body: &str, symbol: &str) -> Result<Vec<DailyBar>, FetchError> {
    let parsed: TimeSeriesResponse = serde_json::from_str(body).map_err(|e| {
        FetchError::Terminal(ApiError::DataUnavailable(format!(
            "malformed upstream response: {e}"
        )))
    })?;

    if let Some(message) = parsed.error_message {
        return Err(FetchError::Terminal(ApiError::DataUnavailable(message)));
    }
    if let Some(note) = parsed.note.or(parsed.information) {
        return Err(FetchError::Transient(note));
    }

    let series = parsed.time_series.unwrap_or_default();
    if series.is_empty() {
        return Err(FetchError::Terminal(ApiError::DataUnavailable(format!(
            "no daily data for {symbol}"
        ))));
    }

    let mut bars = series
        .into_iter()
        .map(|(date, raw)| {
            Ok(DailyBar {
                date,
                open: parse_price(&raw.open)?,
                high: parse_price(&raw.high)?,
                low: parse_price(&raw.low)?,
                close: parse_price(&raw.close)?,
                volume: raw.volume.parse().unwrap_or(0),
            })
        })
        .collect::<Result<Vec<_>, FetchError>>()?;

    // Dates are ISO formatted, so string order is date order. Newest first.
    bars.sort_by(|a, b| b.date.cmp(&a.date));
    Ok(bars)
}

fn parse_price(raw: &str) -> Result<Decimal, FetchError> {
    Decimal::from_str(raw).map_err(|_| {
        FetchError::Terminal(ApiError::DataUnavailable(format!(
            "unparseable price in upstream response: {raw}"
        )))
    })
}

#[async_trait]
impl QuoteSource for AlphaVantageClient {
    async fn latest_close(&self, symbol: &str) -> Result<Quote, ApiError> {
        let now = Instant::now();

        {
            let cache = self.cache.lock().await;
            if let Some((quote, fetched_at)) = cache.get(symbol) {
                if now.duration_since(*fetched_at) < CACHE_TTL {
                    return Ok(quote.clone());
                }
            }
        }

        let bars = self.get_series(symbol).await?;
        // get_series guarantees at least one bar.
        let latest = &bars[0];
        let quote = Quote {
            symbol: symbol.to_string(),
            close: latest.close,
            date: latest.date.clone(),
        };

        let mut cache = self.cache.lock().await;
        cache.insert(symbol.to_string(), (quote.clone(), now));

        Ok(quote)
    }

    async fn daily_series(&self, symbol: &str) -> Result<DailySeries, ApiError> {
        let bars = self.get_series(symbol).await?;
        Ok(DailySeries {
            symbol: symbol.to_string(),
            bars,
        })
    }
}
