use rust_decimal::Decimal;

use crate::alphavantage::QuoteSource;
use crate::db::DatabasePool;
use crate::error::ApiError;
use crate::models::{TradeRequest, Transaction};

/// Buy shares at the latest close. Debits the balance and grows (or
/// creates) the position as one store transaction, so a failed buy
/// changes nothing.
pub async fn buy(
    pool: &DatabasePool,
    source: &dyn QuoteSource,
    username: &str,
    trade: &TradeRequest,
) -> Result<Transaction, ApiError> {
    validate(trade)?;
    let quote = source.latest_close(&trade.symbol).await?;
    let cost = quote.close * Decimal::from(trade.quantity);

    pool.apply_trade(username, &trade.symbol, trade.quantity, -cost, "BUY", quote.close)
        .await
}

/// Sell shares at the latest close. Fails with InsufficientHoldings when
/// the user holds fewer shares than requested; a position sold down to
/// zero is removed.
pub async fn sell(
    pool: &DatabasePool,
    source: &dyn QuoteSource,
    username: &str,
    trade: &TradeRequest,
) -> Result<Transaction, ApiError> {
    validate(trade)?;
    let quote = source.latest_close(&trade.symbol).await?;
    let proceeds = quote.close * Decimal::from(trade.quantity);

    pool.apply_trade(
        username,
        &trade.symbol,
        -trade.quantity,
        proceeds,
        "SELL",
        quote.close,
    )
    .await
}

fn validate(trade: &TradeRequest) -> Result<(), ApiError> {
    if trade.quantity <= 0 {
        return Err(ApiError::Validation(
            "quantity must be a positive integer".to_string(),
        ));
    }
    if trade.symbol.is_empty()
        || !trade
            .symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.')
    {
        return Err(ApiError::Validation("invalid symbol".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FixedQuotes;
    use rust_decimal_macros::dec;

    fn request(symbol: &str, quantity: i64) -> TradeRequest {
        TradeRequest {
            symbol: symbol.to_string(),
            quantity,
        }
    }

    async fn alice(balance: Decimal) -> DatabasePool {
        let pool = DatabasePool::open(":memory:").unwrap();
        pool.create_user("alice", "hash", balance).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn buy_debits_balance_and_creates_position() {
        let pool = alice(dec!(1000.00)).await;
        let source = FixedQuotes::new(&[("MSFT", dec!(300.00))]);

        let receipt = buy(&pool, &source, "alice", &request("MSFT", 2))
            .await
            .unwrap();
        assert_eq!(receipt.side, "BUY");
        assert_eq!(receipt.price, dec!(300.00));

        let user = pool.get_user("alice").await.unwrap();
        assert_eq!(user.balance, dec!(400.00));
        let positions = pool.get_positions("alice").await.unwrap();
        assert_eq!(positions[0].symbol, "MSFT");
        assert_eq!(positions[0].quantity, 2);
    }

    #[tokio::test]
    async fn buy_then_sell_round_trips_at_a_fixed_price() {
        let pool = alice(dec!(1000.00)).await;
        let source = FixedQuotes::new(&[("MSFT", dec!(300.00))]);

        buy(&pool, &source, "alice", &request("MSFT", 3))
            .await
            .unwrap();
        sell(&pool, &source, "alice", &request("MSFT", 3))
            .await
            .unwrap();

        let user = pool.get_user("alice").await.unwrap();
        assert_eq!(user.balance, dec!(1000.00));
        assert!(pool.get_positions("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn buy_fails_on_insufficient_funds_without_mutation() {
        let pool = alice(dec!(500.00)).await;
        let source = FixedQuotes::new(&[("MSFT", dec!(300.00))]);

        let err = buy(&pool, &source, "alice", &request("MSFT", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InsufficientFunds));

        let user = pool.get_user("alice").await.unwrap();
        assert_eq!(user.balance, dec!(500.00));
        assert!(pool.get_positions("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sell_fails_on_insufficient_holdings_without_mutation() {
        let pool = alice(dec!(1000.00)).await;
        let source = FixedQuotes::new(&[("MSFT", dec!(300.00))]);

        buy(&pool, &source, "alice", &request("MSFT", 2))
            .await
            .unwrap();
        let err = sell(&pool, &source, "alice", &request("MSFT", 3))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InsufficientHoldings));

        let user = pool.get_user("alice").await.unwrap();
        assert_eq!(user.balance, dec!(400.00));
        assert_eq!(pool.get_positions("alice").await.unwrap()[0].quantity, 2);
    }

    #[tokio::test]
    async fn sell_with_no_position_is_insufficient_holdings() {
        let pool = alice(dec!(1000.00)).await;
        let source = FixedQuotes::new(&[("MSFT", dec!(300.00))]);

        let err = sell(&pool, &source, "alice", &request("MSFT", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InsufficientHoldings));
    }

    #[tokio::test]
    async fn trades_for_unknown_users_fail() {
        let pool = alice(dec!(1000.00)).await;
        let source = FixedQuotes::new(&[("MSFT", dec!(300.00))]);

        let err = buy(&pool, &source, "bob", &request("MSFT", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::UserNotFound));
    }

    #[tokio::test]
    async fn non_positive_quantities_are_rejected_before_any_fetch() {
        let pool = alice(dec!(1000.00)).await;
        let source = FixedQuotes::new(&[]);

        for quantity in [0, -1] {
            let err = buy(&pool, &source, "alice", &request("MSFT", quantity))
                .await
                .unwrap_err();
            assert!(matches!(err, ApiError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn malformed_symbols_are_rejected() {
        let pool = alice(dec!(1000.00)).await;
        let source = FixedQuotes::new(&[]);

        for symbol in ["", "MS FT", "MSFT;DROP"] {
            let err = buy(&pool, &source, "alice", &request(symbol, 1))
                .await
                .unwrap_err();
            assert!(matches!(err, ApiError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn unresolvable_symbol_surfaces_data_unavailable() {
        let pool = alice(dec!(1000.00)).await;
        let source = FixedQuotes::new(&[]);

        let err = buy(&pool, &source, "alice", &request("GHOST", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::DataUnavailable(_)));
    }
}
