//! Holdings snapshot persistence and account valuation.

use super::{parse_decimal_lenient, Repository};
use crate::domain::{Decimal, Holding, LendingClass, Symbol, Venue};
use chrono::NaiveDate;
use sqlx::Row;
use tracing::warn;

impl Repository {
    /// Replace the holdings snapshot with the latest broker feed.
    pub async fn replace_holdings(&self, holdings: &[Holding]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("DELETE FROM holdings").execute(&mut *tx).await?;

        for holding in holdings {
            sqlx::query(
                r#"
                INSERT INTO holdings (symbol, name, quantity, avg_cost, current_price,
                                      purchase_amount, valuation, lending_class, currency,
                                      venue, snapshot_date)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(holding.symbol.as_str())
            .bind(&holding.name)
            .bind(holding.quantity)
            .bind(holding.avg_cost.to_canonical_string())
            .bind(holding.current_price.to_canonical_string())
            .bind(holding.purchase_amount.to_canonical_string())
            .bind(holding.valuation.to_canonical_string())
            .bind(holding.lending_class.as_str())
            .bind(&holding.currency)
            .bind(holding.venue.code())
            .bind(holding.snapshot_date.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await
    }

    pub async fn query_holdings(&self) -> Result<Vec<Holding>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, name, quantity, avg_cost, current_price, purchase_amount,
                   valuation, lending_class, currency, venue, snapshot_date
            FROM holdings
            ORDER BY symbol ASC
            "#,
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().filter_map(row_to_holding).collect())
    }

    pub async fn query_holding(&self, symbol: &Symbol) -> Result<Option<Holding>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT symbol, name, quantity, avg_cost, current_price, purchase_amount,
                   valuation, lending_class, currency, venue, snapshot_date
            FROM holdings
            WHERE symbol = ?
            "#,
        )
        .bind(symbol.as_str())
        .fetch_optional(self.pool())
        .await?;

        Ok(row.as_ref().and_then(row_to_holding))
    }

    /// Sum of snapshot valuations, used with buying power to derive total
    /// account value.
    pub async fn holdings_valuation(&self) -> Result<Decimal, sqlx::Error> {
        let rows = sqlx::query("SELECT symbol, valuation FROM holdings")
            .fetch_all(self.pool())
            .await?;
        Ok(rows
            .iter()
            .map(|row| {
                parse_decimal_lenient(
                    &row.get::<String, _>("symbol"),
                    &row.get::<String, _>("valuation"),
                )
            })
            .sum())
    }
}

fn row_to_holding(row: &sqlx::sqlite::SqliteRow) -> Option<Holding> {
    let symbol: String = row.get("symbol");
    let snapshot_date = match row.get::<String, _>("snapshot_date").parse::<NaiveDate>() {
        Ok(d) => d,
        Err(e) => {
            warn!(symbol = %symbol, error = %e, "Bad snapshot_date in holdings row, skipping");
            return None;
        }
    };

    Some(Holding {
        symbol: Symbol::new(symbol.clone()),
        name: row.get("name"),
        quantity: row.get("quantity"),
        avg_cost: parse_decimal_lenient(&symbol, &row.get::<String, _>("avg_cost")),
        current_price: parse_decimal_lenient(&symbol, &row.get::<String, _>("current_price")),
        purchase_amount: parse_decimal_lenient(&symbol, &row.get::<String, _>("purchase_amount")),
        valuation: parse_decimal_lenient(&symbol, &row.get::<String, _>("valuation")),
        lending_class: LendingClass::from_str_or_cash(&row.get::<String, _>("lending_class")),
        currency: row.get("currency"),
        venue: Venue::from_code(&row.get::<String, _>("venue")).unwrap_or(Venue::Nasdaq),
        snapshot_date,
    })
}
