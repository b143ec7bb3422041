//! Per-trading-day record of automated entries, used to block duplicates.

use crate::domain::{Decimal, Symbol};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How an entry was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Intraday price crossed the target.
    Breakout,
    /// Opening price already above the target.
    GapUp,
    /// Reconstructed from the durable trade store.
    Store,
    /// Reconstructed from the broker's trade history.
    Broker,
}

/// One symbol's trigger state for a trading day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub entry_kind: EntryKind,
    /// ISO timestamp or broker order time; empty when unknown.
    pub entry_time: String,
    /// Entry fill price; zero when unknown.
    pub entry_price: Decimal,
    pub trigger_count: u32,
    pub sold: bool,
}

/// All triggers for one trading day, keyed by symbol.
///
/// Reconciled from three sources (persisted file, durable store, broker
/// history). `merge_record` is idempotent and order-independent: replaying
/// the same merges in any order yields the same map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayTriggers {
    pub date: NaiveDate,
    pub triggers: BTreeMap<Symbol, TriggerRecord>,
}

impl DayTriggers {
    pub fn new(date: NaiveDate) -> Self {
        DayTriggers {
            date,
            triggers: BTreeMap::new(),
        }
    }

    /// True if an automated entry already fired for this symbol today.
    pub fn has_triggered(&self, symbol: &Symbol) -> bool {
        self.triggers
            .get(symbol)
            .map(|t| t.trigger_count >= 1)
            .unwrap_or(false)
    }

    /// Record a fresh entry fill, incrementing the trigger count.
    pub fn record_entry(
        &mut self,
        symbol: Symbol,
        kind: EntryKind,
        entry_price: Decimal,
        entry_time: String,
    ) {
        let entry = self.triggers.entry(symbol).or_insert(TriggerRecord {
            entry_kind: kind,
            entry_time: entry_time.clone(),
            entry_price,
            trigger_count: 0,
            sold: false,
        });
        entry.trigger_count += 1;
        if entry.entry_time.is_empty() {
            entry.entry_time = entry_time;
        }
        if entry.entry_price.is_zero() {
            entry.entry_price = entry_price;
        }
    }

    /// Mark a symbol as sold today (stop-loss or close-of-day cut).
    pub fn mark_sold(&mut self, symbol: &Symbol) {
        if let Some(entry) = self.triggers.get_mut(symbol) {
            entry.sold = true;
        }
    }

    /// Merge a record reconstructed from another source.
    ///
    /// Existing richer data wins: counts take the max, sold flags OR
    /// together, and a known price/time is never overwritten by an unknown
    /// one.
    pub fn merge_record(&mut self, symbol: Symbol, incoming: TriggerRecord) {
        match self.triggers.get_mut(&symbol) {
            None => {
                self.triggers.insert(symbol, incoming);
            }
            Some(existing) => {
                existing.trigger_count = existing.trigger_count.max(incoming.trigger_count);
                existing.sold = existing.sold || incoming.sold;
                if existing.entry_price.is_zero() && !incoming.entry_price.is_zero() {
                    existing.entry_price = incoming.entry_price;
                }
                if existing.entry_time.is_empty() && !incoming.entry_time.is_empty() {
                    existing.entry_time = incoming.entry_time;
                }
            }
        }
    }
}
