//! Lot ledger: construction from trades and live-metric refresh.

pub mod book;

pub use book::{GroupKey, LotBook, OversellWarning, RealizedPnl};

use crate::domain::{Decimal, Symbol};
use chrono::NaiveDate;
use std::collections::HashMap;

/// Refresh per-lot live metrics from a symbol → last-price map.
///
/// Lots with no known price keep their metric fields `None`; a missing
/// price is never treated as zero.
pub fn update_lot_metrics(book: &mut LotBook, prices: &HashMap<Symbol, Decimal>, today: NaiveDate) {
    for lot in book.open_lots_mut() {
        lot.holding_days = Some((today - lot.key.open_date).num_days());
        match prices.get(&lot.key.symbol) {
            Some(&price) if price.is_positive() => {
                let qty = Decimal::from_i64(lot.net_quantity);
                lot.current_price = Some(price);
                lot.unrealized_pnl = Some((price - lot.avg_cost) * qty);
                lot.unrealized_return_pct = if lot.avg_cost.is_positive() {
                    Some((price - lot.avg_cost) / lot.avg_cost * Decimal::hundred())
                } else {
                    None
                };
            }
            _ => {
                lot.current_price = None;
                lot.unrealized_pnl = None;
                lot.unrealized_return_pct = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LendingClass, Side, TradeRecord, Venue};

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn buy(symbol: &str, qty: i64, price: &str, date: &str) -> TradeRecord {
        TradeRecord::new(
            Symbol::new(symbol),
            Side::Buy,
            qty,
            d(price),
            date.parse().unwrap(),
            "100000".to_string(),
            LendingClass::Cash,
            String::new(),
            "USD".to_string(),
            Venue::Nasdaq,
            None,
        )
    }

    #[test]
    fn test_metrics_with_price() {
        let mut book = LotBook::build(&[buy("AAPL", 10, "100", "2026-02-02")]);
        let mut prices = HashMap::new();
        prices.insert(Symbol::new("AAPL"), d("110"));
        update_lot_metrics(&mut book, &prices, "2026-02-05".parse().unwrap());

        let lots = book.open_lots_for(&Symbol::new("AAPL"));
        assert_eq!(lots[0].holding_days, Some(3));
        assert_eq!(lots[0].current_price, Some(d("110")));
        assert_eq!(lots[0].unrealized_pnl, Some(d("100")));
        assert_eq!(lots[0].unrealized_return_pct, Some(d("10")));
    }

    #[test]
    fn test_missing_price_leaves_metrics_null() {
        let mut book = LotBook::build(&[buy("AAPL", 10, "100", "2026-02-02")]);
        let prices = HashMap::new();
        update_lot_metrics(&mut book, &prices, "2026-02-05".parse().unwrap());

        let lots = book.open_lots_for(&Symbol::new("AAPL"));
        assert_eq!(lots[0].holding_days, Some(3));
        assert_eq!(lots[0].current_price, None);
        assert_eq!(lots[0].unrealized_pnl, None);
        assert_eq!(lots[0].unrealized_return_pct, None);
    }
}
