//! The monitoring loop: one cooperative tick per second.
//!
//! Each tick checks config files, handles the exchange-local day rollover,
//! snapshots the price cache and runs one strategy cycle. Quote polling
//! runs on its own task; the loop never fetches prices inline.

use crate::broker::VenueDetector;
use crate::config::{Config, TradingSettings};
use crate::domain::Symbol;
use crate::notify::Notifier;
use crate::pricing::{PriceCache, PricePoller};
use crate::sizing::PositionSizer;
use crate::strategy::{CycleInput, MarketSession, StrategyEngine};
use crate::sync::{spawn_post_trade_sync, SyncService};
use crate::watchlist::{load_settings, load_watchlist, WatchedFile, WatchlistItem};
use chrono::{Duration as ChronoDuration, NaiveDate};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// How far back the startup ledger rebuild reaches.
const LEDGER_REBUILD_DAYS: i64 = 365;
/// History range pulled during the startup sync.
const STARTUP_HISTORY_DAYS: i64 = 7;

pub struct Monitor {
    config: Config,
    settings: TradingSettings,
    engine: StrategyEngine,
    sync: Arc<SyncService>,
    venues: Arc<VenueDetector>,
    price_cache: Arc<PriceCache>,
    watched_symbols: Arc<RwLock<Vec<Symbol>>>,
    notifier: Notifier,
    watchlist_file: WatchedFile,
    settings_file: Option<WatchedFile>,
    watchlist: Vec<WatchlistItem>,
    current_date: NaiveDate,
    pre_close_synced: Option<NaiveDate>,
}

impl Monitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        settings: TradingSettings,
        engine: StrategyEngine,
        sync: Arc<SyncService>,
        venues: Arc<VenueDetector>,
        price_cache: Arc<PriceCache>,
        watched_symbols: Arc<RwLock<Vec<Symbol>>>,
        notifier: Notifier,
    ) -> Self {
        let watchlist_file = WatchedFile::new(config.watchlist_path.clone());
        let settings_file = config.settings_path.clone().map(WatchedFile::new);
        let current_date = MarketSession::now().trading_date;
        Monitor {
            config,
            settings,
            engine,
            sync,
            venues,
            price_cache,
            watched_symbols,
            notifier,
            watchlist_file,
            settings_file,
            watchlist: Vec::new(),
            current_date,
            pre_close_synced: None,
        }
    }

    /// One-time startup: backfill the store, rebuild the ledger, seed the
    /// position cache and reconcile triggers.
    pub async fn startup(&mut self) {
        let today = self.current_date;

        if let Err(e) = self
            .sync
            .sync_trade_history(today - ChronoDuration::days(STARTUP_HISTORY_DAYS), today)
            .await
        {
            warn!(error = %e, "startup trade-history sync failed");
        }
        match self.sync.sync_holdings().await {
            Ok(holdings) => self.engine.positions_mut().sync_from_holdings(&holdings),
            Err(e) => warn!(error = %e, "startup holdings sync failed"),
        }
        let prices = self.price_cache.last_prices().await;
        if let Err(e) = self
            .sync
            .rebuild_ledger(
                today - ChronoDuration::days(LEDGER_REBUILD_DAYS),
                today,
                &prices,
                today,
            )
            .await
        {
            warn!(error = %e, "startup ledger rebuild failed");
        }
        self.engine.reconcile_triggers(today).await;

        self.reload_files().await;
        self.notifier.system_started();
        info!(date = %today, symbols = self.watchlist.len(), "monitor started");
    }

    /// Run until interrupted. Spawns the price poller as a detached task.
    pub async fn run(mut self, poller: PricePoller) {
        tokio::spawn(poller.run(Duration::from_millis(self.config.price_poll_interval_ms)));

        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.tick_interval_ms));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!(error = %e, "interrupt handler failed");
                    }
                    info!("interrupt received, shutting down");
                    self.notifier.system_stopped();
                    break;
                }
            }
        }
    }

    /// One tick of the monitoring loop. Any single failure is logged and
    /// retried naturally on the next tick.
    async fn tick(&mut self) {
        self.reload_files().await;

        let session = MarketSession::now();
        if session.trading_date != self.current_date {
            self.roll_over(session.trading_date).await;
        }

        if !session.is_open {
            return;
        }

        if session.is_near_close && self.pre_close_synced != Some(session.trading_date) {
            self.pre_close_sync(session.trading_date).await;
            self.pre_close_synced = Some(session.trading_date);
        }

        let account_value = match self.sync.total_account_value().await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "account value unavailable, skipping cycle");
                return;
            }
        };

        let prices = self.price_cache.snapshot().await;
        let report = self
            .engine
            .run_cycle(CycleInput {
                session,
                watchlist: &self.watchlist,
                prices: &prices,
                sizer: PositionSizer::new(account_value),
                settings: &self.settings,
            })
            .await;

        let traded =
            !report.entries.is_empty() || !report.exits.is_empty() || !report.pyramids.is_empty();
        if traded {
            info!(
                entries = report.entries.len(),
                exits = report.exits.len(),
                pyramids = report.pyramids.len(),
                "cycle traded"
            );
            // Next cycle should see refreshed dedup state; don't wait here.
            spawn_post_trade_sync(self.sync.clone(), session.trading_date);
        }
    }

    async fn roll_over(&mut self, new_date: NaiveDate) {
        info!(from = %self.current_date, to = %new_date, "trading day rollover");
        self.current_date = new_date;
        self.pre_close_synced = None;
        self.engine.roll_over(new_date);
        self.venues.clear().await;
        self.price_cache.clear().await;
        self.engine.reconcile_triggers(new_date).await;
    }

    /// Catch manual trades before close-of-day decisions run, and refresh
    /// the stored lot metrics against live prices while they are fresh.
    async fn pre_close_sync(&mut self, today: NaiveDate) {
        if let Err(e) = self
            .sync
            .sync_trade_history(today - ChronoDuration::days(1), today)
            .await
        {
            warn!(error = %e, "pre-close trade-history sync failed");
        }
        match self.sync.sync_holdings().await {
            Ok(holdings) => self.engine.positions_mut().sync_from_holdings(&holdings),
            Err(e) => warn!(error = %e, "pre-close holdings sync failed"),
        }
        let prices = self.price_cache.last_prices().await;
        if let Err(e) = self
            .sync
            .rebuild_ledger(
                today - ChronoDuration::days(LEDGER_REBUILD_DAYS),
                today,
                &prices,
                today,
            )
            .await
        {
            warn!(error = %e, "pre-close ledger rebuild failed");
        }
        self.sync.invalidate_account_value().await;
        self.engine.reconcile_triggers(today).await;
    }

    /// Reload watchlist/settings files whose mtime advanced.
    async fn reload_files(&mut self) {
        if self.watchlist_file.changed() {
            match load_watchlist(Path::new(&self.config.watchlist_path)) {
                Ok(items) => {
                    let symbols: Vec<Symbol> =
                        items.iter().map(|item| item.ticker.clone()).collect();
                    *self.watched_symbols.write().await = symbols;
                    self.watchlist = items;
                }
                Err(e) => warn!(error = %e, "watchlist reload failed, keeping previous"),
            }
        }

        if let Some(settings_file) = self.settings_file.as_mut() {
            if settings_file.changed() {
                let path = settings_file.path().to_path_buf();
                if let Err(e) = load_settings(&path, &mut self.settings) {
                    warn!(error = %e, "settings reload failed, keeping previous");
                }
            }
        }
    }
}
