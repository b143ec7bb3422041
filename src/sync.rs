//! Broker → store synchronization and account value tracking.

use crate::broker::{BrokerClient, BrokerError};
use crate::db::Repository;
use crate::domain::{Decimal, Holding, Symbol};
use crate::ledger::{update_lot_metrics, LotBook};
use chrono::{Duration, NaiveDate};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Pulls broker state into the durable store. All writes are idempotent,
/// so overlapping syncs are safe.
pub struct SyncService {
    broker: Arc<dyn BrokerClient>,
    repo: Arc<Repository>,
    /// Cached total account value; invalidated after every trade.
    account_value: Mutex<Option<Decimal>>,
}

impl SyncService {
    pub fn new(broker: Arc<dyn BrokerClient>, repo: Arc<Repository>) -> Self {
        SyncService {
            broker,
            repo,
            account_value: Mutex::new(None),
        }
    }

    /// Pull executed trades for a date range into the store. Returns the
    /// count of newly observed trades.
    pub async fn sync_trade_history(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<usize, SyncError> {
        let trades = self.broker.get_trade_history(from, to, None).await?;
        let inserted = self.repo.insert_trades_batch(&trades).await?;
        if inserted > 0 {
            info!(inserted, from = %from, to = %to, "trade history synced");
        }
        Ok(inserted)
    }

    /// Snapshot the live holdings feed into the store and return it.
    pub async fn sync_holdings(&self) -> Result<Vec<Holding>, SyncError> {
        let holdings = self.broker.get_holdings().await?;
        self.repo.replace_holdings(&holdings).await?;
        Ok(holdings)
    }

    /// Total account value: buying power plus the snapshot valuation of
    /// held stock. Cached until `invalidate_account_value`.
    pub async fn total_account_value(&self) -> Result<Decimal, SyncError> {
        let mut cached = self.account_value.lock().await;
        if let Some(value) = *cached {
            return Ok(value);
        }
        let buying_power = self.broker.get_buying_power().await?;
        let valuation = self.repo.holdings_valuation().await?;
        let total = buying_power + valuation;
        *cached = Some(total);
        Ok(total)
    }

    pub async fn invalidate_account_value(&self) {
        *self.account_value.lock().await = None;
    }

    /// Rebuild the lot ledger from the stored trades in a date range,
    /// refresh per-lot metrics from the given prices, and persist the
    /// result. Deterministic, safe to re-run; symbols with no known price
    /// keep their metric fields null.
    pub async fn rebuild_ledger(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        prices: &HashMap<Symbol, Decimal>,
        today: NaiveDate,
    ) -> Result<LotBook, SyncError> {
        let trades = self.repo.query_trades(from, to).await?;
        let mut book = LotBook::build(&trades);
        update_lot_metrics(&mut book, prices, today);
        let lots: Vec<_> = book.all_lots().collect();
        self.repo.replace_lots(&lots).await?;
        info!(
            trades = trades.len(),
            lots = lots.len(),
            warnings = book.warnings().len(),
            "lot ledger rebuilt"
        );
        Ok(book)
    }

    /// Lightweight catch-up after a trade: recent history plus holdings,
    /// and the account value cache is dropped.
    pub async fn post_trade_sync(&self, today: NaiveDate) -> Result<(), SyncError> {
        self.sync_trade_history(today - Duration::days(1), today)
            .await?;
        self.sync_holdings().await?;
        self.invalidate_account_value().await;
        Ok(())
    }
}

/// Detached post-trade sync: the monitoring loop never waits on it, and
/// its failures stay its own.
pub fn spawn_post_trade_sync(sync: Arc<SyncService>, today: NaiveDate) {
    tokio::spawn(async move {
        if let Err(e) = sync.post_trade_sync(today).await {
            warn!(error = %e, "post-trade sync failed");
        }
    });
}
