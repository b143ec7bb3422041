//! Market-facing value types: live quotes and holdings-feed rows.

use crate::domain::{Decimal, LendingClass, Symbol, Venue};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A live quote snapshot for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub last: Decimal,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
}

impl Quote {
    /// A quote is usable only when a real last price came through.
    pub fn has_last(&self) -> bool {
        self.last.is_positive()
    }
}

/// One row of the broker's live holdings feed.
///
/// Authoritative for quantity and purchase cost when available; lots remain
/// authoritative for per-parcel age semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: Symbol,
    pub name: String,
    pub quantity: i64,
    pub avg_cost: Decimal,
    pub current_price: Decimal,
    /// Total purchase amount (cost basis), not market value.
    pub purchase_amount: Decimal,
    /// Current market valuation of the holding.
    pub valuation: Decimal,
    pub lending_class: LendingClass,
    pub currency: String,
    pub venue: Venue,
    pub snapshot_date: NaiveDate,
}
