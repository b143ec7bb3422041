//! Local position cache: a fast aggregate view synced from the holdings
//! feed and updated optimistically after our own fills.
//!
//! Quantities here are the sizing fallback of last resort; the lot ledger
//! and the live holdings feed take precedence when they know a symbol.

use crate::domain::{Decimal, Holding, Symbol};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: Symbol,
    pub quantity: i64,
    pub avg_cost: Decimal,
    pub total_cost: Decimal,
}

#[derive(Debug, Default)]
pub struct PositionBook {
    positions: HashMap<Symbol, Position>,
}

impl PositionBook {
    pub fn new() -> Self {
        PositionBook::default()
    }

    pub fn get(&self, symbol: &Symbol) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn quantity(&self, symbol: &Symbol) -> i64 {
        self.positions.get(symbol).map(|p| p.quantity).unwrap_or(0)
    }

    pub fn cost_basis(&self, symbol: &Symbol) -> Option<Decimal> {
        self.positions.get(symbol).map(|p| p.total_cost)
    }

    /// Replace the whole book from the live holdings feed.
    pub fn sync_from_holdings(&mut self, holdings: &[Holding]) {
        self.positions.clear();
        for holding in holdings {
            if holding.quantity <= 0 {
                continue;
            }
            self.positions.insert(
                holding.symbol.clone(),
                Position {
                    symbol: holding.symbol.clone(),
                    quantity: holding.quantity,
                    avg_cost: holding.avg_cost,
                    total_cost: holding.purchase_amount,
                },
            );
        }
    }

    /// Fold in a buy fill, averaging cost into any existing position.
    pub fn apply_buy(&mut self, symbol: &Symbol, quantity: i64, price: Decimal) {
        let added_cost = price * Decimal::from_i64(quantity);
        match self.positions.get_mut(symbol) {
            Some(position) => {
                position.quantity += quantity;
                position.total_cost += added_cost;
                position.avg_cost = position.total_cost / Decimal::from_i64(position.quantity);
            }
            None => {
                self.positions.insert(
                    symbol.clone(),
                    Position {
                        symbol: symbol.clone(),
                        quantity,
                        avg_cost: price,
                        total_cost: added_cost,
                    },
                );
            }
        }
    }

    /// Fold in a sell fill; the position is dropped once fully closed.
    pub fn apply_sell(&mut self, symbol: &Symbol, quantity: i64) {
        if let Some(position) = self.positions.get_mut(symbol) {
            position.quantity -= quantity.min(position.quantity);
            if position.quantity <= 0 {
                self.positions.remove(symbol);
            } else {
                position.total_cost =
                    position.avg_cost * Decimal::from_i64(position.quantity);
            }
        }
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.positions.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LendingClass, Venue};

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn holding(symbol: &str, qty: i64, avg: &str, purchase: &str) -> Holding {
        Holding {
            symbol: Symbol::new(symbol),
            name: symbol.to_string(),
            quantity: qty,
            avg_cost: d(avg),
            current_price: d(avg),
            purchase_amount: d(purchase),
            valuation: d(purchase),
            lending_class: LendingClass::Cash,
            currency: "USD".to_string(),
            venue: Venue::Nasdaq,
            snapshot_date: "2026-02-04".parse().unwrap(),
        }
    }

    #[test]
    fn test_sync_replaces_book() {
        let mut book = PositionBook::new();
        book.apply_buy(&Symbol::new("OLD"), 1, d("10"));
        book.sync_from_holdings(&[holding("AAPL", 10, "185.5", "1855")]);

        assert_eq!(book.quantity(&Symbol::new("OLD")), 0);
        assert_eq!(book.quantity(&Symbol::new("AAPL")), 10);
        assert_eq!(book.cost_basis(&Symbol::new("AAPL")), Some(d("1855")));
    }

    #[test]
    fn test_apply_buy_averages_in() {
        let mut book = PositionBook::new();
        book.apply_buy(&Symbol::new("AAPL"), 10, d("100"));
        book.apply_buy(&Symbol::new("AAPL"), 10, d("110"));

        let position = book.get(&Symbol::new("AAPL")).unwrap();
        assert_eq!(position.quantity, 20);
        assert_eq!(position.avg_cost, d("105"));
        assert_eq!(position.total_cost, d("2100"));
    }

    #[test]
    fn test_apply_sell_closes_at_zero() {
        let mut book = PositionBook::new();
        book.apply_buy(&Symbol::new("AAPL"), 10, d("100"));
        book.apply_sell(&Symbol::new("AAPL"), 4);
        assert_eq!(book.quantity(&Symbol::new("AAPL")), 6);
        book.apply_sell(&Symbol::new("AAPL"), 6);
        assert!(book.get(&Symbol::new("AAPL")).is_none());
    }
}
