//! TradeRecord: a single executed trade from the brokerage feed.

use crate::domain::{Decimal, LendingClass, Side, Symbol, Venue};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// An immutable executed trade.
///
/// `trade_key` is the idempotence key: inserting the same record twice must
/// not double count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Stable unique identifier for this trade.
    pub trade_key: String,
    pub symbol: Symbol,
    pub side: Side,
    /// Executed share count, always > 0.
    pub quantity: i64,
    /// Executed price per share.
    pub price: Decimal,
    pub trade_date: NaiveDate,
    /// Broker order time string ("HHMMSS"), empty when unknown.
    pub order_time: String,
    pub lending_class: LendingClass,
    /// Loan reference for credit trades; empty for cash.
    pub loan_ref: String,
    pub currency: String,
    pub venue: Venue,
}

impl TradeRecord {
    /// Create a new TradeRecord, computing its idempotence key.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        side: Side,
        quantity: i64,
        price: Decimal,
        trade_date: NaiveDate,
        order_time: String,
        lending_class: LendingClass,
        loan_ref: String,
        currency: String,
        venue: Venue,
        order_no: Option<&str>,
    ) -> Self {
        let trade_key = Self::compute_trade_key(
            &symbol,
            side,
            quantity,
            &price,
            trade_date,
            &order_time,
            order_no,
        );
        TradeRecord {
            trade_key,
            symbol,
            side,
            quantity,
            price,
            trade_date,
            order_time,
            lending_class,
            loan_ref,
            currency,
            venue,
        }
    }

    /// Generate a stable unique key for this trade.
    ///
    /// Priority: broker order number (if present) > hash of deterministic
    /// fields.
    pub fn compute_trade_key(
        symbol: &Symbol,
        side: Side,
        quantity: i64,
        price: &Decimal,
        trade_date: NaiveDate,
        order_time: &str,
        order_no: Option<&str>,
    ) -> String {
        if let Some(order_no) = order_no {
            if !order_no.is_empty() {
                return format!("ord:{}", order_no);
            }
        }

        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(symbol.as_str());
        hasher.update(if side == Side::Buy { b"B" } else { b"S" });
        hasher.update(quantity.to_le_bytes());
        hasher.update(price.to_canonical_string());
        hasher.update(trade_date.to_string());
        hasher.update(order_time);
        let hash = hasher.finalize();
        format!("hash:{}", hex::encode(&hash[..16]))
    }

    pub fn is_buy(&self) -> bool {
        self.side == Side::Buy
    }

    pub fn is_sell(&self) -> bool {
        self.side == Side::Sell
    }

    /// Grouping key for daily lot construction.
    pub fn lot_group(&self) -> (Symbol, LendingClass, String) {
        (
            self.symbol.clone(),
            self.lending_class,
            self.loan_ref.clone(),
        )
    }
}
