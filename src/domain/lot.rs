//! Lot: a cost-basis parcel of shares opened on a given date.

use crate::domain::{Decimal, LendingClass, Symbol};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identity of a lot: one per (symbol, lending class, loan ref, open date).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LotKey {
    pub symbol: Symbol,
    pub lending_class: LendingClass,
    pub loan_ref: String,
    pub open_date: NaiveDate,
}

/// A cost-basis parcel, opened by a day's net buys and reduced or closed by
/// later sells (LIFO against the group's open lots).
///
/// Invariant while open: `total_cost == avg_cost * net_quantity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub key: LotKey,
    /// Remaining share count; >= 0 while open, 0 once closed.
    pub net_quantity: i64,
    /// Volume-weighted average purchase price.
    pub avg_cost: Decimal,
    pub total_cost: Decimal,
    pub closed: bool,
    pub close_date: Option<NaiveDate>,
    /// Realized PnL, set when the lot closes.
    pub realized_pnl: Option<Decimal>,
    /// Metrics refreshed from live prices; None when no price is known.
    pub current_price: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
    pub unrealized_return_pct: Option<Decimal>,
    pub holding_days: Option<i64>,
    pub currency: String,
}

impl Lot {
    /// Open a new lot.
    pub fn open(key: LotKey, net_quantity: i64, avg_cost: Decimal, currency: String) -> Self {
        let total_cost = avg_cost * Decimal::from_i64(net_quantity);
        Lot {
            key,
            net_quantity,
            avg_cost,
            total_cost,
            closed: false,
            close_date: None,
            realized_pnl: None,
            current_price: None,
            unrealized_pnl: None,
            unrealized_return_pct: None,
            holding_days: None,
            currency,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.closed
    }

    /// Days held as of `today`.
    pub fn holding_days_at(&self, today: NaiveDate) -> i64 {
        (today - self.key.open_date).num_days()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(open: &str) -> LotKey {
        LotKey {
            symbol: Symbol::new("AAPL"),
            lending_class: LendingClass::Cash,
            loan_ref: String::new(),
            open_date: open.parse().unwrap(),
        }
    }

    #[test]
    fn test_open_lot_cost_invariant() {
        let lot = Lot::open(
            key("2026-02-02"),
            10,
            Decimal::from_str_canonical("185.5").unwrap(),
            "USD".to_string(),
        );
        assert_eq!(
            lot.total_cost,
            Decimal::from_str_canonical("1855").unwrap()
        );
        assert!(lot.is_open());
    }

    #[test]
    fn test_holding_days() {
        let lot = Lot::open(
            key("2026-02-02"),
            10,
            Decimal::from_str_canonical("185.5").unwrap(),
            "USD".to_string(),
        );
        assert_eq!(lot.holding_days_at("2026-02-05".parse().unwrap()), 3);
    }
}
