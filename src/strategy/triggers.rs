//! Trigger ledger: per-day entry dedup reconciled from three sources.
//!
//! The persisted file and the in-memory map are acceleration layers; the
//! durable trade store remains the final authority (its guard is checked
//! separately by the engine and can never be bypassed from here).

use crate::domain::{DayTriggers, Decimal, EntryKind, Symbol, TradeRecord, TriggerRecord};
use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum TriggerStoreError {
    #[error("trigger store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("trigger store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Durable backing for the day's triggers. The contract is date-scoped and
/// idempotent regardless of backing (file, embedded DB, ...).
pub trait TriggerStore: Send + Sync {
    fn load(&self) -> Result<Option<DayTriggers>, TriggerStoreError>;
    fn save(&self, day: &DayTriggers) -> Result<(), TriggerStoreError>;
}

/// JSON-document-per-day store backed by a single local file.
#[derive(Debug)]
pub struct FileTriggerStore {
    path: PathBuf,
}

impl FileTriggerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileTriggerStore { path: path.into() }
    }
}

impl TriggerStore for FileTriggerStore {
    fn load(&self) -> Result<Option<DayTriggers>, TriggerStoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, day: &DayTriggers) -> Result<(), TriggerStoreError> {
        let content = serde_json::to_string_pretty(day)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

/// The live trigger view for the current trading day.
///
/// Persists after every mutation. Persistence failures are logged and
/// swallowed: a lost write degrades dedup to the other two sources, it
/// never stops trading decisions.
pub struct TriggerLedger {
    store: Box<dyn TriggerStore>,
    day: DayTriggers,
}

impl TriggerLedger {
    /// Load today's triggers; a persisted document for a stale date is
    /// discarded.
    pub fn load_for(store: Box<dyn TriggerStore>, today: NaiveDate) -> Self {
        let day = match store.load() {
            Ok(Some(day)) if day.date == today => {
                info!(count = day.triggers.len(), "trigger file loaded for today");
                day
            }
            Ok(Some(stale)) => {
                info!(stale_date = %stale.date, "discarding stale trigger file");
                DayTriggers::new(today)
            }
            Ok(None) => DayTriggers::new(today),
            Err(e) => {
                warn!(error = %e, "failed to load trigger file, starting empty");
                DayTriggers::new(today)
            }
        };
        TriggerLedger { store, day }
    }

    pub fn day(&self) -> &DayTriggers {
        &self.day
    }

    pub fn has_triggered(&self, symbol: &Symbol) -> bool {
        self.day.has_triggered(symbol)
    }

    pub fn was_sold_today(&self, symbol: &Symbol) -> bool {
        self.day
            .triggers
            .get(symbol)
            .map(|t| t.sold)
            .unwrap_or(false)
    }

    pub fn entry_price(&self, symbol: &Symbol) -> Option<Decimal> {
        self.day
            .triggers
            .get(symbol)
            .map(|t| t.entry_price)
            .filter(|p| p.is_positive())
    }

    /// Record a fresh entry fill and persist.
    pub fn record_entry(
        &mut self,
        symbol: Symbol,
        kind: EntryKind,
        entry_price: Decimal,
        entry_time: String,
    ) {
        self.day.record_entry(symbol, kind, entry_price, entry_time);
        self.persist();
    }

    /// Mark a symbol sold today and persist.
    pub fn mark_sold(&mut self, symbol: &Symbol) {
        self.day.mark_sold(symbol);
        self.persist();
    }

    /// Reset for a new trading day and persist the empty document.
    pub fn roll_over(&mut self, new_date: NaiveDate) {
        if self.day.date != new_date {
            info!(from = %self.day.date, to = %new_date, "trigger ledger day rollover");
            self.day = DayTriggers::new(new_date);
            self.persist();
        }
    }

    /// Merge buy/sell records from the durable trade store (covering the
    /// last two calendar days for settlement lag) and persist.
    pub fn merge_store_trades(&mut self, buys: &[TradeRecord], sells: &[TradeRecord]) {
        self.merge_trades(buys, sells, EntryKind::Store);
    }

    /// Merge the broker's own trade history, adding entries the other
    /// sources missed without overwriting richer data, and persist.
    pub fn merge_broker_trades(&mut self, buys: &[TradeRecord], sells: &[TradeRecord]) {
        self.merge_trades(buys, sells, EntryKind::Broker);
    }

    fn merge_trades(&mut self, buys: &[TradeRecord], sells: &[TradeRecord], kind: EntryKind) {
        for buy in buys {
            self.day.merge_record(
                buy.symbol.clone(),
                TriggerRecord {
                    entry_kind: kind,
                    entry_time: buy.order_time.clone(),
                    entry_price: buy.price,
                    trigger_count: 1,
                    sold: false,
                },
            );
        }
        for sell in sells {
            self.day.mark_sold(&sell.symbol);
        }
        self.persist();
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.day) {
            warn!(error = %e, "failed to persist trigger file");
        }
    }
}
