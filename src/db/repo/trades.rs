//! Trade record operations: idempotent inserts and dedup-guard queries.

use super::{parse_decimal_lenient, Repository};
use crate::domain::{LendingClass, Side, Symbol, TradeRecord, Venue};
use chrono::NaiveDate;
use sqlx::Row;
use tracing::warn;

impl Repository {
    /// Insert a trade idempotently. Returns true when the row was new.
    pub async fn insert_trade(&self, trade: &TradeRecord) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO trades (trade_key, symbol, side, quantity, price, trade_date,
                                order_time, lending_class, loan_ref, currency, venue)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(trade_key) DO NOTHING
            "#,
        )
        .bind(&trade.trade_key)
        .bind(trade.symbol.as_str())
        .bind(trade.side.to_string())
        .bind(trade.quantity)
        .bind(trade.price.to_canonical_string())
        .bind(trade.trade_date.to_string())
        .bind(&trade.order_time)
        .bind(trade.lending_class.as_str())
        .bind(&trade.loan_ref)
        .bind(&trade.currency)
        .bind(trade.venue.code())
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Insert a batch of trades in one transaction. Returns the count of
    /// newly inserted rows (duplicates excluded).
    pub async fn insert_trades_batch(
        &self,
        trades: &[TradeRecord],
    ) -> Result<usize, sqlx::Error> {
        if trades.is_empty() {
            return Ok(0);
        }

        let mut total_inserted = 0usize;
        let mut tx = self.pool().begin().await?;

        for trade in trades {
            let result = sqlx::query(
                r#"
                INSERT INTO trades (trade_key, symbol, side, quantity, price, trade_date,
                                    order_time, lending_class, loan_ref, currency, venue)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(trade_key) DO NOTHING
                "#,
            )
            .bind(&trade.trade_key)
            .bind(trade.symbol.as_str())
            .bind(trade.side.to_string())
            .bind(trade.quantity)
            .bind(trade.price.to_canonical_string())
            .bind(trade.trade_date.to_string())
            .bind(&trade.order_time)
            .bind(trade.lending_class.as_str())
            .bind(&trade.loan_ref)
            .bind(&trade.currency)
            .bind(trade.venue.code())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                total_inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(total_inserted)
    }

    /// Query trades in a date range (inclusive), ordered for deterministic
    /// ledger rebuilds.
    pub async fn query_trades(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TradeRecord>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT trade_key, symbol, side, quantity, price, trade_date,
                   order_time, lending_class, loan_ref, currency, venue
            FROM trades
            WHERE trade_date >= ? AND trade_date <= ?
            ORDER BY trade_date ASC, order_time ASC, trade_key ASC
            "#,
        )
        .bind(from.to_string())
        .bind(to.to_string())
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().filter_map(row_to_trade).collect())
    }

    /// Trades for one symbol and side in a date range; feeds the trigger
    /// ledger's store-based merge.
    pub async fn query_trades_by_side(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        side: Side,
    ) -> Result<Vec<TradeRecord>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT trade_key, symbol, side, quantity, price, trade_date,
                   order_time, lending_class, loan_ref, currency, venue
            FROM trades
            WHERE trade_date >= ? AND trade_date <= ? AND side = ?
            ORDER BY trade_date ASC, order_time ASC, trade_key ASC
            "#,
        )
        .bind(from.to_string())
        .bind(to.to_string())
        .bind(side.to_string())
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().filter_map(row_to_trade).collect())
    }

    /// Whether the store holds a buy for the symbol on the given date. The
    /// final, unskippable duplicate-entry guard.
    pub async fn has_buy_on(
        &self,
        symbol: &Symbol,
        date: NaiveDate,
    ) -> Result<bool, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS cnt
            FROM trades
            WHERE symbol = ? AND trade_date = ? AND side = 'buy'
            "#,
        )
        .bind(symbol.as_str())
        .bind(date.to_string())
        .fetch_one(self.pool())
        .await?;

        Ok(row.get::<i64, _>("cnt") > 0)
    }
}

fn row_to_trade(row: &sqlx::sqlite::SqliteRow) -> Option<TradeRecord> {
    let trade_key: String = row.get("trade_key");
    let side = match row.get::<String, _>("side").as_str() {
        "buy" => Side::Buy,
        "sell" => Side::Sell,
        other => {
            warn!(trade_key = %trade_key, side = other, "Unknown side in trades row, skipping");
            return None;
        }
    };
    let trade_date = match row.get::<String, _>("trade_date").parse::<NaiveDate>() {
        Ok(d) => d,
        Err(e) => {
            warn!(trade_key = %trade_key, error = %e, "Bad trade_date in trades row, skipping");
            return None;
        }
    };
    let venue = Venue::from_code(&row.get::<String, _>("venue")).unwrap_or(Venue::Nasdaq);

    Some(TradeRecord {
        trade_key: trade_key.clone(),
        symbol: Symbol::new(row.get::<String, _>("symbol")),
        side,
        quantity: row.get("quantity"),
        price: parse_decimal_lenient(&trade_key, &row.get::<String, _>("price")),
        trade_date,
        order_time: row.get("order_time"),
        lending_class: LendingClass::from_str_or_cash(&row.get::<String, _>("lending_class")),
        loan_ref: row.get("loan_ref"),
        currency: row.get("currency"),
        venue,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::domain::Decimal;
    use tempfile::TempDir;

    async fn test_repo() -> (TempDir, Repository) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.unwrap();
        (temp_dir, Repository::new(pool))
    }

    fn trade(symbol: &str, side: Side, date: &str, order_no: &str) -> TradeRecord {
        TradeRecord::new(
            Symbol::new(symbol),
            side,
            10,
            Decimal::from_str_canonical("185.50").unwrap(),
            date.parse().unwrap(),
            "093101".to_string(),
            LendingClass::Cash,
            String::new(),
            "USD".to_string(),
            Venue::Nasdaq,
            Some(order_no),
        )
    }

    #[tokio::test]
    async fn test_insert_trade_idempotent() {
        let (_dir, repo) = test_repo().await;
        let t = trade("AAPL", Side::Buy, "2026-02-04", "ord-1");
        assert!(repo.insert_trade(&t).await.unwrap());
        assert!(!repo.insert_trade(&t).await.unwrap());

        let stored = repo
            .query_trades("2026-02-04".parse().unwrap(), "2026-02-04".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0], t);
    }

    #[tokio::test]
    async fn test_batch_insert_counts_new_only() {
        let (_dir, repo) = test_repo().await;
        let a = trade("AAPL", Side::Buy, "2026-02-04", "ord-1");
        let b = trade("NVDA", Side::Buy, "2026-02-04", "ord-2");
        assert_eq!(repo.insert_trades_batch(&[a.clone(), b.clone()]).await.unwrap(), 2);
        assert_eq!(repo.insert_trades_batch(&[a, b]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_has_buy_on() {
        let (_dir, repo) = test_repo().await;
        repo.insert_trade(&trade("AAPL", Side::Buy, "2026-02-04", "ord-1"))
            .await
            .unwrap();
        repo.insert_trade(&trade("NVDA", Side::Sell, "2026-02-04", "ord-2"))
            .await
            .unwrap();

        let date = "2026-02-04".parse().unwrap();
        assert!(repo.has_buy_on(&Symbol::new("AAPL"), date).await.unwrap());
        assert!(!repo.has_buy_on(&Symbol::new("NVDA"), date).await.unwrap());
        assert!(!repo
            .has_buy_on(&Symbol::new("AAPL"), "2026-02-05".parse().unwrap())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_query_trades_by_side() {
        let (_dir, repo) = test_repo().await;
        repo.insert_trade(&trade("AAPL", Side::Buy, "2026-02-03", "ord-1"))
            .await
            .unwrap();
        repo.insert_trade(&trade("AAPL", Side::Sell, "2026-02-04", "ord-2"))
            .await
            .unwrap();

        let buys = repo
            .query_trades_by_side(
                "2026-02-03".parse().unwrap(),
                "2026-02-04".parse().unwrap(),
                Side::Buy,
            )
            .await
            .unwrap();
        assert_eq!(buys.len(), 1);
        assert_eq!(buys[0].side, Side::Buy);
    }
}
