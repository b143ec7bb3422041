//! Lot persistence: the stored lots mirror the in-memory LotBook.

use super::{parse_decimal_lenient, Repository};
use crate::domain::{Decimal, LendingClass, Lot, LotKey, Symbol};
use chrono::NaiveDate;
use sqlx::Row;
use tracing::warn;

impl Repository {
    /// Replace the stored lot set with a freshly built one, atomically.
    ///
    /// Rebuilds are deterministic from the trades table, so a full replace
    /// is the simplest way to keep the two in step.
    pub async fn replace_lots(&self, lots: &[&Lot]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("DELETE FROM lots").execute(&mut *tx).await?;

        for lot in lots {
            sqlx::query(
                r#"
                INSERT INTO lots (symbol, lending_class, loan_ref, open_date, net_quantity,
                                  avg_cost, total_cost, closed, close_date, realized_pnl,
                                  current_price, unrealized_pnl, unrealized_return_pct,
                                  holding_days, currency)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(lot.key.symbol.as_str())
            .bind(lot.key.lending_class.as_str())
            .bind(&lot.key.loan_ref)
            .bind(lot.key.open_date.to_string())
            .bind(lot.net_quantity)
            .bind(lot.avg_cost.to_canonical_string())
            .bind(lot.total_cost.to_canonical_string())
            .bind(lot.closed as i64)
            .bind(lot.close_date.map(|d| d.to_string()))
            .bind(lot.realized_pnl.map(|p| p.to_canonical_string()))
            .bind(lot.current_price.map(|p| p.to_canonical_string()))
            .bind(lot.unrealized_pnl.map(|p| p.to_canonical_string()))
            .bind(lot.unrealized_return_pct.map(|p| p.to_canonical_string()))
            .bind(lot.holding_days)
            .bind(&lot.currency)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await
    }

    /// All open lots, ordered by symbol then open date.
    pub async fn query_open_lots(&self) -> Result<Vec<Lot>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, lending_class, loan_ref, open_date, net_quantity,
                   avg_cost, total_cost, closed, close_date, realized_pnl,
                   current_price, unrealized_pnl, unrealized_return_pct,
                   holding_days, currency
            FROM lots
            WHERE closed = 0
            ORDER BY symbol ASC, open_date ASC
            "#,
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().filter_map(row_to_lot).collect())
    }

    /// Total open cost basis for a symbol, summed across lending classes.
    pub async fn open_cost_basis(&self, symbol: &Symbol) -> Result<Decimal, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT total_cost FROM lots WHERE symbol = ? AND closed = 0
            "#,
        )
        .bind(symbol.as_str())
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .iter()
            .map(|row| parse_decimal_lenient(symbol.as_str(), &row.get::<String, _>("total_cost")))
            .sum())
    }
}

fn row_to_lot(row: &sqlx::sqlite::SqliteRow) -> Option<Lot> {
    let symbol: String = row.get("symbol");
    let open_date = match row.get::<String, _>("open_date").parse::<NaiveDate>() {
        Ok(d) => d,
        Err(e) => {
            warn!(symbol = %symbol, error = %e, "Bad open_date in lots row, skipping");
            return None;
        }
    };
    let close_date = row
        .get::<Option<String>, _>("close_date")
        .and_then(|s| s.parse::<NaiveDate>().ok());
    let realized_pnl = row
        .get::<Option<String>, _>("realized_pnl")
        .map(|s| parse_decimal_lenient(&symbol, &s));
    let decimal_column = |name: &str| {
        row.get::<Option<String>, _>(name)
            .map(|s| parse_decimal_lenient(&symbol, &s))
    };
    let current_price = decimal_column("current_price");
    let unrealized_pnl = decimal_column("unrealized_pnl");
    let unrealized_return_pct = decimal_column("unrealized_return_pct");

    Some(Lot {
        key: LotKey {
            symbol: Symbol::new(symbol.clone()),
            lending_class: LendingClass::from_str_or_cash(&row.get::<String, _>("lending_class")),
            loan_ref: row.get("loan_ref"),
            open_date,
        },
        net_quantity: row.get("net_quantity"),
        avg_cost: parse_decimal_lenient(&symbol, &row.get::<String, _>("avg_cost")),
        total_cost: parse_decimal_lenient(&symbol, &row.get::<String, _>("total_cost")),
        closed: row.get::<i64, _>("closed") != 0,
        close_date,
        realized_pnl,
        current_price,
        unrealized_pnl,
        unrealized_return_pct,
        holding_days: row.get::<Option<i64>, _>("holding_days"),
        currency: row.get("currency"),
    })
}
