use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::error::ApiError;
use crate::models::{Position, Transaction, User};

/// Shared SQLite connection guarded by an async mutex. Every trade runs as
/// one transaction on this connection, so overlapping trades serialize.
#[derive(Clone)]
pub struct DatabasePool(pub Arc<Mutex<rusqlite::Connection>>);

impl DatabasePool {
    /// Open (or create) the database and initialize the schema.
    pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
        let conn = rusqlite::Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                balance TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS positions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                UNIQUE (user_id, symbol),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS transactions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                price TEXT NOT NULL,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );",
        )?;

        Ok(Self(Arc::new(Mutex::new(conn))))
    }

    /// Insert a new user. Fails with DuplicateUsername if the name is taken.
    pub async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        starting_balance: Decimal,
    ) -> Result<User, ApiError> {
        let conn = self.0.lock().await;
        let id = uuid::Uuid::new_v4().to_string();

        conn.execute(
            "INSERT INTO users (id, username, password_hash, balance) VALUES (?, ?, ?, ?)",
            rusqlite::params![&id, username, password_hash, starting_balance.to_string()],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                ApiError::DuplicateUsername
            }
            other => ApiError::Database(other),
        })?;

        Ok(User {
            id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            balance: starting_balance,
        })
    }

    pub async fn get_user(&self, username: &str) -> Result<User, ApiError> {
        let conn = self.0.lock().await;
        Self::user_by_name(&conn, username)
    }

    /// A user's positions in insertion order. This ordering is what the
    /// valuation breakdown preserves.
    pub async fn get_positions(&self, username: &str) -> Result<Vec<Position>, ApiError> {
        let conn = self.0.lock().await;
        let user = Self::user_by_name(&conn, username)?;

        let mut stmt = conn.prepare(
            "SELECT symbol, quantity FROM positions WHERE user_id = ? ORDER BY rowid",
        )?;
        let positions = stmt
            .query_map([&user.id], |row| {
                Ok(Position {
                    symbol: row.get(0)?,
                    quantity: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(positions)
    }

    pub async fn get_transactions(&self, username: &str) -> Result<Vec<Transaction>, ApiError> {
        let conn = self.0.lock().await;
        let user = Self::user_by_name(&conn, username)?;

        let mut stmt = conn.prepare(
            "SELECT id, symbol, side, quantity, price, timestamp
             FROM transactions
             WHERE user_id = ?
             ORDER BY timestamp DESC",
        )?;
        let transactions = stmt
            .query_map([&user.id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|(id, symbol, side, quantity, price, timestamp)| {
                Ok(Transaction {
                    id,
                    username: username.to_string(),
                    symbol,
                    side,
                    quantity,
                    price: parse_decimal(&price)?,
                    timestamp,
                })
            })
            .collect::<Result<Vec<_>, ApiError>>()?;

        Ok(transactions)
    }

    /// Apply one trade as a single transaction: adjust the balance, adjust
    /// (or create/prune) the position, record the receipt. Any failure rolls
    /// the whole thing back, so a failed trade leaves no partial state.
    pub async fn apply_trade(
        &self,
        username: &str,
        symbol: &str,
        quantity_delta: i64,
        balance_delta: Decimal,
        side: &str,
        price: Decimal,
    ) -> Result<Transaction, ApiError> {
        let mut conn = self.0.lock().await;
        let tx = conn.transaction()?;

        let (user_id, balance_raw) = tx
            .query_row(
                "SELECT id, balance FROM users WHERE username = ?",
                [username],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => ApiError::UserNotFound,
                other => ApiError::Database(other),
            })?;

        let new_balance = parse_decimal(&balance_raw)? + balance_delta;
        if new_balance < Decimal::ZERO {
            return Err(ApiError::InsufficientFunds);
        }

        let held: i64 = match tx.query_row(
            "SELECT quantity FROM positions WHERE user_id = ? AND symbol = ?",
            [user_id.as_str(), symbol],
            |row| row.get(0),
        ) {
            Ok(q) => q,
            Err(rusqlite::Error::QueryReturnedNoRows) => 0,
            Err(e) => return Err(ApiError::Database(e)),
        };

        let new_quantity = held + quantity_delta;
        if new_quantity < 0 {
            return Err(ApiError::InsufficientHoldings);
        }

        tx.execute(
            "UPDATE users SET balance = ? WHERE id = ?",
            rusqlite::params![new_balance.to_string(), &user_id],
        )?;

        if new_quantity == 0 {
            // Zero-quantity positions are pruned rather than retained.
            tx.execute(
                "DELETE FROM positions WHERE user_id = ? AND symbol = ?",
                [user_id.as_str(), symbol],
            )?;
        } else {
            tx.execute(
                "INSERT INTO positions (id, user_id, symbol, quantity)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT (user_id, symbol) DO UPDATE SET quantity = excluded.quantity",
                rusqlite::params![
                    uuid::Uuid::new_v4().to_string(),
                    &user_id,
                    symbol,
                    new_quantity
                ],
            )?;
        }

        let transaction = Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            symbol: symbol.to_string(),
            side: side.to_string(),
            quantity: quantity_delta.abs(),
            price,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        tx.execute(
            "INSERT INTO transactions (id, user_id, symbol, side, quantity, price, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                &transaction.id,
                &user_id,
                &transaction.symbol,
                &transaction.side,
                transaction.quantity,
                transaction.price.to_string(),
                &transaction.timestamp
            ],
        )?;

        tx.commit()?;

        Ok(transaction)
    }

    fn user_by_name(conn: &rusqlite::Connection, username: &str) -> Result<User, ApiError> {
        let (id, username, password_hash, balance_raw) = conn
            .query_row(
                "SELECT id, username, password_hash, balance FROM users WHERE username = ?",
                [username],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => ApiError::UserNotFound,
                other => ApiError::Database(other),
            })?;

        Ok(User {
            id,
            username,
            password_hash,
            balance: parse_decimal(&balance_raw)?,
        })
    }
}

fn parse_decimal(raw: &str) -> Result<Decimal, ApiError> {
    Decimal::from_str(raw)
        .map_err(|_| ApiError::Internal(format!("corrupt decimal value in store: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn pool_with_user(balance: Decimal) -> DatabasePool {
        let pool = DatabasePool::open(":memory:").unwrap();
        pool.create_user("alice", "hash", balance).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let pool = pool_with_user(dec!(1000.00)).await;
        let err = pool
            .create_user("alice", "hash", dec!(1000.00))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::DuplicateUsername));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let pool = pool_with_user(dec!(1000.00)).await;
        assert!(matches!(
            pool.get_user("bob").await.unwrap_err(),
            ApiError::UserNotFound
        ));
        assert!(matches!(
            pool.apply_trade("bob", "MSFT", 1, dec!(-1.00), "BUY", dec!(1.00))
                .await
                .unwrap_err(),
            ApiError::UserNotFound
        ));
    }

    #[tokio::test]
    async fn apply_trade_updates_balance_and_position() {
        let pool = pool_with_user(dec!(1000.00)).await;
        pool.apply_trade("alice", "MSFT", 2, dec!(-600.00), "BUY", dec!(300.00))
            .await
            .unwrap();

        let user = pool.get_user("alice").await.unwrap();
        assert_eq!(user.balance, dec!(400.00));
        let positions = pool.get_positions("alice").await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].symbol, "MSFT");
        assert_eq!(positions[0].quantity, 2);
    }

    #[tokio::test]
    async fn overdraft_rolls_back_without_partial_state() {
        let pool = pool_with_user(dec!(100.00)).await;
        let err = pool
            .apply_trade("alice", "MSFT", 2, dec!(-600.00), "BUY", dec!(300.00))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InsufficientFunds));

        let user = pool.get_user("alice").await.unwrap();
        assert_eq!(user.balance, dec!(100.00));
        assert!(pool.get_positions("alice").await.unwrap().is_empty());
        assert!(pool.get_transactions("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn overselling_rolls_back_without_partial_state() {
        let pool = pool_with_user(dec!(1000.00)).await;
        pool.apply_trade("alice", "MSFT", 2, dec!(-600.00), "BUY", dec!(300.00))
            .await
            .unwrap();

        let err = pool
            .apply_trade("alice", "MSFT", -3, dec!(900.00), "SELL", dec!(300.00))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InsufficientHoldings));

        let user = pool.get_user("alice").await.unwrap();
        assert_eq!(user.balance, dec!(400.00));
        assert_eq!(pool.get_positions("alice").await.unwrap()[0].quantity, 2);
    }

    #[tokio::test]
    async fn selling_out_prunes_the_position() {
        let pool = pool_with_user(dec!(1000.00)).await;
        pool.apply_trade("alice", "MSFT", 2, dec!(-600.00), "BUY", dec!(300.00))
            .await
            .unwrap();
        pool.apply_trade("alice", "MSFT", -2, dec!(600.00), "SELL", dec!(300.00))
            .await
            .unwrap();

        assert!(pool.get_positions("alice").await.unwrap().is_empty());
        assert_eq!(pool.get_transactions("alice").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn positions_keep_insertion_order() {
        let pool = pool_with_user(dec!(10000.00)).await;
        pool.apply_trade("alice", "MSFT", 2, dec!(-600.00), "BUY", dec!(300.00))
            .await
            .unwrap();
        pool.apply_trade("alice", "AAPL", 1, dec!(-150.00), "BUY", dec!(150.00))
            .await
            .unwrap();

        let symbols: Vec<_> = pool
            .get_positions("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.symbol)
            .collect();
        assert_eq!(symbols, vec!["MSFT", "AAPL"]);
    }
}
