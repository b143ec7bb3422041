//! LotBook: pure lot-construction engine over an ordered trade stream.
//!
//! Trades are folded in one day at a time. Within a day and a
//! (symbol, lending class, loan ref) group, sells first close prior open
//! lots newest-first; whatever net buying remains opens (or tops up) a lot
//! dated that day. The engine holds no I/O and is deterministic, so a
//! rebuild from the same trade set always yields the same book.

use crate::domain::{Decimal, LendingClass, Lot, LotKey, Symbol, TradeRecord};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Grouping key for lot construction.
pub type GroupKey = (Symbol, LendingClass, String);

/// One realized close against an open lot.
#[derive(Debug, Clone, PartialEq)]
pub struct RealizedPnl {
    pub symbol: Symbol,
    pub lending_class: LendingClass,
    pub loan_ref: String,
    pub open_date: NaiveDate,
    pub close_date: NaiveDate,
    pub quantity: i64,
    pub avg_cost: Decimal,
    pub sell_price: Decimal,
    pub pnl: Decimal,
    pub holding_days: i64,
}

/// A sell that could not be matched against any held quantity.
///
/// Indicates a data gap or an unobserved manual trade; surfaced, never
/// turned into a negative lot.
#[derive(Debug, Clone, PartialEq)]
pub struct OversellWarning {
    pub symbol: Symbol,
    pub trade_date: NaiveDate,
    pub unmatched_quantity: i64,
}

#[derive(Debug, Clone, Default)]
struct DaySummary {
    buy_qty: i64,
    buy_value: Decimal,
    sell_qty: i64,
    sell_value: Decimal,
}

impl DaySummary {
    fn add(&mut self, trade: &TradeRecord) {
        let value = trade.price * Decimal::from_i64(trade.quantity);
        if trade.is_buy() {
            self.buy_qty += trade.quantity;
            self.buy_value += value;
        } else {
            self.sell_qty += trade.quantity;
            self.sell_value += value;
        }
    }

    fn buy_vwap(&self) -> Decimal {
        if self.buy_qty == 0 {
            Decimal::zero()
        } else {
            self.buy_value / Decimal::from_i64(self.buy_qty)
        }
    }

    fn sell_vwap(&self) -> Decimal {
        if self.sell_qty == 0 {
            Decimal::zero()
        } else {
            self.sell_value / Decimal::from_i64(self.sell_qty)
        }
    }
}

/// The full set of lots built from a trade stream.
#[derive(Debug, Default)]
pub struct LotBook {
    /// Per group, lots ordered by open date ascending.
    groups: HashMap<GroupKey, Vec<Lot>>,
    realized: Vec<RealizedPnl>,
    warnings: Vec<OversellWarning>,
}

impl LotBook {
    pub fn new() -> Self {
        LotBook::default()
    }

    /// Build a book from scratch. Trade order within the input does not
    /// matter; days are processed in calendar order.
    pub fn build(trades: &[TradeRecord]) -> Self {
        let mut by_day: BTreeMap<NaiveDate, Vec<&TradeRecord>> = BTreeMap::new();
        for trade in trades {
            by_day.entry(trade.trade_date).or_default().push(trade);
        }

        let mut book = LotBook::new();
        for (date, day_trades) in by_day {
            book.apply_day(date, &day_trades);
        }
        book
    }

    /// Fold one day's trades into the book. The date must not precede any
    /// date already applied.
    pub fn apply_day(&mut self, date: NaiveDate, trades: &[&TradeRecord]) {
        let mut summaries: BTreeMap<GroupKey, (DaySummary, String)> = BTreeMap::new();
        for trade in trades {
            debug_assert_eq!(trade.trade_date, date);
            let entry = summaries
                .entry(trade.lot_group())
                .or_insert_with(|| (DaySummary::default(), trade.currency.clone()));
            entry.0.add(trade);
        }

        for (group, (summary, currency)) in summaries {
            self.apply_group_day(group, date, summary, currency);
        }
    }

    fn apply_group_day(
        &mut self,
        group: GroupKey,
        date: NaiveDate,
        summary: DaySummary,
        currency: String,
    ) {
        let lots = self.groups.entry(group.clone()).or_default();
        let sell_vwap = summary.sell_vwap();

        // Sells close prior lots first, newest open date first.
        let mut remaining_sell = summary.sell_qty;
        if remaining_sell > 0 {
            let mut prior: Vec<usize> = lots
                .iter()
                .enumerate()
                .filter(|(_, lot)| lot.is_open() && lot.key.open_date < date)
                .map(|(i, _)| i)
                .collect();
            prior.sort_by_key(|&i| std::cmp::Reverse(lots[i].key.open_date));

            for i in prior {
                if remaining_sell == 0 {
                    break;
                }
                let lot = &mut lots[i];
                let close_qty = lot.net_quantity.min(remaining_sell);
                remaining_sell -= close_qty;

                let pnl = (sell_vwap - lot.avg_cost) * Decimal::from_i64(close_qty);
                self.realized.push(RealizedPnl {
                    symbol: group.0.clone(),
                    lending_class: group.1,
                    loan_ref: group.2.clone(),
                    open_date: lot.key.open_date,
                    close_date: date,
                    quantity: close_qty,
                    avg_cost: lot.avg_cost,
                    sell_price: sell_vwap,
                    pnl,
                    holding_days: (date - lot.key.open_date).num_days(),
                });

                lot.net_quantity -= close_qty;
                lot.total_cost = lot.avg_cost * Decimal::from_i64(lot.net_quantity);
                lot.realized_pnl = Some(lot.realized_pnl.unwrap_or_else(Decimal::zero) + pnl);
                if lot.net_quantity == 0 {
                    lot.closed = true;
                    lot.close_date = Some(date);
                }
            }
        }

        // Remaining sells net against today's buys.
        let net_buy = summary.buy_qty - remaining_sell;
        if net_buy > 0 {
            let key = LotKey {
                symbol: group.0.clone(),
                lending_class: group.1,
                loan_ref: group.2.clone(),
                open_date: date,
            };
            let buy_vwap = summary.buy_vwap();
            match lots.iter_mut().find(|lot| lot.is_open() && lot.key == key) {
                Some(existing) => {
                    // Same-key lot already open today: merge at weighted cost.
                    let merged_qty = existing.net_quantity + net_buy;
                    let merged_cost =
                        existing.total_cost + buy_vwap * Decimal::from_i64(net_buy);
                    existing.net_quantity = merged_qty;
                    existing.total_cost = merged_cost;
                    existing.avg_cost = merged_cost / Decimal::from_i64(merged_qty);
                }
                None => lots.push(Lot::open(key, net_buy, buy_vwap, currency)),
            }
            lots.sort_by_key(|lot| lot.key.open_date);
        } else if net_buy < 0 {
            let unmatched = -net_buy;
            warn!(
                symbol = %group.0,
                date = %date,
                unmatched,
                "sell exceeds held quantity; no lot created"
            );
            self.warnings.push(OversellWarning {
                symbol: group.0.clone(),
                trade_date: date,
                unmatched_quantity: unmatched,
            });
        }
    }

    pub fn open_lots(&self) -> impl Iterator<Item = &Lot> {
        self.groups.values().flatten().filter(|lot| lot.is_open())
    }

    pub fn open_lots_mut(&mut self) -> impl Iterator<Item = &mut Lot> {
        self.groups
            .values_mut()
            .flatten()
            .filter(|lot| lot.is_open())
    }

    pub fn all_lots(&self) -> impl Iterator<Item = &Lot> {
        self.groups.values().flatten()
    }

    /// Open lots for a symbol across lending classes.
    pub fn open_lots_for(&self, symbol: &Symbol) -> Vec<&Lot> {
        let mut lots: Vec<&Lot> = self
            .open_lots()
            .filter(|lot| &lot.key.symbol == symbol)
            .collect();
        lots.sort_by_key(|lot| lot.key.open_date);
        lots
    }

    /// Total purchase cost of all open lots for a symbol.
    pub fn open_cost_basis(&self, symbol: &Symbol) -> Decimal {
        self.open_lots_for(symbol)
            .iter()
            .map(|lot| lot.total_cost)
            .sum()
    }

    /// Total held quantity for a symbol.
    pub fn open_quantity(&self, symbol: &Symbol) -> i64 {
        self.open_lots_for(symbol)
            .iter()
            .map(|lot| lot.net_quantity)
            .sum()
    }

    /// Earliest open date among a symbol's open lots.
    pub fn earliest_open_date(&self, symbol: &Symbol) -> Option<NaiveDate> {
        self.open_lots_for(symbol)
            .first()
            .map(|lot| lot.key.open_date)
    }

    pub fn realized(&self) -> &[RealizedPnl] {
        &self.realized
    }

    pub fn warnings(&self) -> &[OversellWarning] {
        &self.warnings
    }
}
