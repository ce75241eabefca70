use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A registered user. The password hash never leaves the store layer.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub balance: Decimal,
}

/// A single holding: how many shares of one symbol a user owns.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub quantity: i64,
}

/// Latest close for a symbol. Transient, fetched per request.
#[derive(Debug, Clone)]
pub struct Quote {
    pub symbol: String,
    pub close: Decimal,
    pub date: String,
}

/// One day of price history.
#[derive(Serialize, Debug, Clone)]
pub struct DailyBar {
    pub date: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

/// Daily price history for a symbol, newest bar first.
#[derive(Serialize, Debug)]
pub struct DailySeries {
    pub symbol: String,
    pub bars: Vec<DailyBar>,
}

/// Per-symbol slice of a portfolio valuation.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct HoldingValue {
    pub symbol: String,
    pub quantity: i64,
    pub last_close: Decimal,
    pub value: Decimal,
}

/// Derived valuation of a user's positions at current prices. Not persisted.
#[derive(Serialize, Debug)]
pub struct PortfolioSnapshot {
    pub total_value: Decimal,
    pub holdings: Vec<HoldingValue>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TradeRequest {
    pub symbol: String,
    pub quantity: i64,
}

/// Receipt for an executed trade, persisted as history.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Transaction {
    pub id: String,
    pub username: String,
    pub symbol: String,
    pub side: String,
    pub quantity: i64,
    pub price: Decimal,
    pub timestamp: String,
}

#[derive(Deserialize, Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// What we keep in the cookie session after login.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SessionUser {
    pub username: String,
}

/// Unified response body: `{"status": "ok"|"error", "data"?, "message"?}`.
#[derive(Serialize, Debug)]
pub struct Envelope<T: Serialize> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Envelope {
            status: "ok",
            data: Some(data),
            message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn envelope_omits_empty_fields() {
        let body = serde_json::to_value(Envelope::ok(Position {
            symbol: "MSFT".into(),
            quantity: 2,
        }))
        .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["data"]["symbol"], "MSFT");
        assert!(body.get("message").is_none());
    }

    #[test]
    fn holding_values_keep_declared_scale() {
        let holding = HoldingValue {
            symbol: "AAPL".into(),
            quantity: 1,
            last_close: dec!(150.00),
            value: dec!(150.00),
        };
        let body = serde_json::to_string(&holding).unwrap();
        assert!(body.contains("150.00"));
    }
}
