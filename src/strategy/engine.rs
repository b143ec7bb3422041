//! Strategy engine: per-cycle entry, stop-loss and close-of-day decisions.
//!
//! Within one cycle the order is fixed: gap-up checks for every watched
//! symbol, then breakout checks, then intraday stop-losses, then (near the
//! close) prior-day stop-losses and the once-per-day close logic. Symbols
//! are evaluated in watchlist order, which is the tie-break when several
//! signals fire on the same tick.

use super::clock::MarketSession;
use super::triggers::TriggerLedger;
use crate::broker::BrokerClient;
use crate::config::TradingSettings;
use crate::db::Repository;
use crate::domain::{Decimal, EntryKind, Quote, Symbol};
use crate::execution::{OrderExecutor, PositionBook, TradeReason};
use crate::notify::Notifier;
use crate::sizing::{cost_basis_with_fallback, PositionSizer};
use crate::watchlist::WatchlistItem;
use chrono::{Duration, NaiveDate};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything one cycle needs, snapshotted by the monitor loop.
pub struct CycleInput<'a> {
    pub session: MarketSession,
    pub watchlist: &'a [WatchlistItem],
    pub prices: &'a HashMap<Symbol, Quote>,
    pub sizer: PositionSizer,
    pub settings: &'a TradingSettings,
}

/// What a cycle did, for logging and tests.
#[derive(Debug, Default, PartialEq)]
pub struct CycleReport {
    pub entries: Vec<(Symbol, TradeReason)>,
    pub exits: Vec<(Symbol, TradeReason)>,
    pub pyramids: Vec<Symbol>,
}

pub struct StrategyEngine {
    broker: Arc<dyn BrokerClient>,
    repo: Arc<Repository>,
    executor: OrderExecutor,
    triggers: TriggerLedger,
    positions: PositionBook,
    notifier: Notifier,
    /// Date the close-of-day logic last ran; it runs once per day.
    close_logic_done: Option<NaiveDate>,
}

impl StrategyEngine {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        repo: Arc<Repository>,
        executor: OrderExecutor,
        triggers: TriggerLedger,
        notifier: Notifier,
    ) -> Self {
        StrategyEngine {
            broker,
            repo,
            executor,
            triggers,
            positions: PositionBook::new(),
            notifier,
            close_logic_done: None,
        }
    }

    pub fn positions_mut(&mut self) -> &mut PositionBook {
        &mut self.positions
    }

    pub fn triggers(&self) -> &TriggerLedger {
        &self.triggers
    }

    /// Reset per-day state at the exchange-local day rollover.
    pub fn roll_over(&mut self, new_date: NaiveDate) {
        self.triggers.roll_over(new_date);
        self.close_logic_done = None;
    }

    /// Reconcile the trigger ledger from the durable store and the broker's
    /// trade history (last two calendar days, for settlement lag). Run at
    /// startup and after each rollover.
    pub async fn reconcile_triggers(&mut self, today: NaiveDate) {
        let from = today - Duration::days(1);

        match self
            .repo
            .query_trades_by_side(from, today, crate::domain::Side::Buy)
            .await
        {
            Ok(buys) => {
                let sells = self
                    .repo
                    .query_trades_by_side(from, today, crate::domain::Side::Sell)
                    .await
                    .unwrap_or_default();
                self.triggers.merge_store_trades(&buys, &sells);
            }
            Err(e) => warn!(error = %e, "store trigger merge skipped"),
        }

        match self.broker.get_trade_history(from, today, None).await {
            Ok(trades) => {
                let (buys, sells): (Vec<_>, Vec<_>) =
                    trades.into_iter().partition(|t| t.is_buy());
                self.triggers.merge_broker_trades(&buys, &sells);
            }
            Err(e) => warn!(error = %e, "broker trigger merge skipped"),
        }
    }

    /// Run one monitoring cycle. Never fatal: individual failures log and
    /// leave the rest of the cycle to proceed.
    pub async fn run_cycle(&mut self, input: CycleInput<'_>) -> CycleReport {
        let mut report = CycleReport::default();
        if !input.session.is_open {
            return report;
        }

        // Gap-up pass runs before breakout for every symbol.
        if input.session.is_opening_minute {
            for item in input.watchlist {
                self.try_entry(&input, item, true, &mut report).await;
            }
        }
        for item in input.watchlist {
            self.try_entry(&input, item, false, &mut report).await;
        }

        self.intraday_stop_losses(&input, &mut report).await;

        if input.session.is_near_close {
            self.prior_day_stop_losses(&input, &mut report).await;
            if self.close_logic_done != Some(input.session.trading_date) {
                self.close_of_day(&input, &mut report).await;
                self.close_logic_done = Some(input.session.trading_date);
            }
        }

        report
    }

    async fn try_entry(
        &mut self,
        input: &CycleInput<'_>,
        item: &WatchlistItem,
        gap_up: bool,
        report: &mut CycleReport,
    ) {
        let symbol = &item.ticker;
        let Some(quote) = input.prices.get(symbol) else {
            return;
        };

        let (signal_price, live_price) = if gap_up {
            (quote.open, quote.last)
        } else {
            (quote.last, quote.last)
        };
        if !signal_price.is_positive()
            || !live_price.is_positive()
            || signal_price < item.target_price
        {
            return;
        }

        // Guard order is fixed; the store check comes last and can never
        // be bypassed.
        if self.triggers.has_triggered(symbol) {
            return;
        }

        let cost_basis = self.resolve_cost_basis(symbol).await;
        let units_held = input.sizer.units_held(cost_basis);
        if units_held >= Decimal::from_i64(item.max_units_or_default() as i64) {
            debug!(symbol = %symbol, units = %units_held, "unit cap reached, skipping entry");
            return;
        }

        let today = input.session.trading_date;
        match self
            .broker
            .get_trade_history(today - Duration::days(1), today, Some(crate::domain::Side::Buy))
            .await
        {
            Ok(history) => {
                if history.iter().any(|t| &t.symbol == symbol) {
                    debug!(symbol = %symbol, "recent broker buy found, skipping entry");
                    return;
                }
            }
            Err(e) => {
                // Without the history guard an entry is not safe this cycle.
                warn!(symbol = %symbol, error = %e, "history guard unavailable, skipping entry");
                return;
            }
        }

        match self.repo.has_buy_on(symbol, today).await {
            Ok(false) => {}
            Ok(true) => {
                debug!(symbol = %symbol, "store already has a buy today, skipping entry");
                return;
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "store guard unavailable, skipping entry");
                return;
            }
        }

        let reason = if gap_up {
            TradeReason::GapUp
        } else {
            TradeReason::Breakout
        };
        info!(
            symbol = %symbol,
            price = %live_price,
            target = %item.target_price,
            reason = reason.as_str(),
            "entry signal"
        );

        let half_unit = input.sizer.half_unit_amount(input.settings);
        match self
            .executor
            .execute_buy(
                &mut self.positions,
                symbol,
                live_price,
                half_unit,
                input.settings.price_buffer_pct,
                reason,
            )
            .await
        {
            Ok(outcome) => {
                let kind = if gap_up {
                    EntryKind::GapUp
                } else {
                    EntryKind::Breakout
                };
                self.triggers.record_entry(
                    symbol.clone(),
                    kind,
                    outcome.price,
                    chrono::Utc::now().to_rfc3339(),
                );
                report.entries.push((symbol.clone(), reason));
            }
            Err(e) => warn!(symbol = %symbol, error = %e, "entry order failed"),
        }
    }

    /// Stop-losses for positions opened today, against the live price.
    async fn intraday_stop_losses(&mut self, input: &CycleInput<'_>, report: &mut CycleReport) {
        let candidates: Vec<(Symbol, Decimal)> = self
            .triggers
            .day()
            .triggers
            .iter()
            .filter(|(_, t)| t.trigger_count >= 1 && !t.sold && t.entry_price.is_positive())
            .map(|(s, t)| (s.clone(), t.entry_price))
            .collect();

        for (symbol, entry_price) in candidates {
            let Some(quote) = input.prices.get(&symbol) else {
                continue;
            };
            if !quote.has_last() {
                continue;
            }
            let stop_pct = self.stop_loss_pct_for(&symbol, input);
            let threshold = stop_loss_threshold(entry_price, stop_pct);
            if quote.last <= threshold {
                info!(symbol = %symbol, price = %quote.last, threshold = %threshold, "intraday stop-loss");
                self.notifier.stop_loss(&symbol, quote.last, threshold);
                self.sell_everything(
                    input,
                    &symbol,
                    quote.last,
                    TradeReason::IntradayStopLoss,
                    report,
                )
                .await;
            }
        }
    }

    /// Stop-losses for positions opened before today, evaluated against the
    /// closing price inside the near-close window.
    async fn prior_day_stop_losses(&mut self, input: &CycleInput<'_>, report: &mut CycleReport) {
        let open_lots = match self.repo.query_open_lots().await {
            Ok(lots) => lots,
            Err(e) => {
                warn!(error = %e, "prior-day stop-loss skipped");
                return;
            }
        };

        let today = input.session.trading_date;
        let mut by_symbol: HashMap<Symbol, (i64, Decimal)> = HashMap::new();
        for lot in open_lots {
            if lot.key.open_date >= today {
                continue;
            }
            let entry = by_symbol
                .entry(lot.key.symbol.clone())
                .or_insert((0, Decimal::zero()));
            entry.0 += lot.net_quantity;
            entry.1 += lot.total_cost;
        }

        for (symbol, (quantity, total_cost)) in by_symbol {
            if quantity <= 0 || self.triggers.was_sold_today(&symbol) {
                continue;
            }
            let Some(quote) = input.prices.get(&symbol) else {
                continue;
            };
            if !quote.has_last() {
                continue;
            }
            let avg_cost = total_cost / Decimal::from_i64(quantity);
            let stop_pct = self.stop_loss_pct_for(&symbol, input);
            let threshold = stop_loss_threshold(avg_cost, stop_pct);
            if quote.last <= threshold {
                info!(symbol = %symbol, price = %quote.last, threshold = %threshold, "prior-day stop-loss");
                self.notifier.stop_loss(&symbol, quote.last, threshold);
                self.sell_everything(
                    input,
                    &symbol,
                    quote.last,
                    TradeReason::PriorDayStopLoss,
                    report,
                )
                .await;
            }
        }
    }

    /// Close-of-day decision for every symbol bought today: pyramid when
    /// the close beats the entry, cut the whole position otherwise. Runs
    /// unconditionally for today's entries; unit caps are not re-checked.
    async fn close_of_day(&mut self, input: &CycleInput<'_>, report: &mut CycleReport) {
        let todays_entries: Vec<(Symbol, Decimal)> = self
            .triggers
            .day()
            .triggers
            .iter()
            .filter(|(_, t)| t.trigger_count >= 1 && !t.sold && t.entry_price.is_positive())
            .map(|(s, t)| (s.clone(), t.entry_price))
            .collect();

        for (symbol, entry_price) in todays_entries {
            let Some(quote) = input.prices.get(&symbol) else {
                warn!(symbol = %symbol, "no close price, skipping close-of-day decision");
                continue;
            };
            if !quote.has_last() {
                continue;
            }

            let pyramid = quote.last > entry_price;
            self.notifier
                .close_decision(&symbol, pyramid, quote.last, entry_price);
            if pyramid {
                info!(symbol = %symbol, close = %quote.last, entry = %entry_price, "close above entry, pyramiding");
                let half_unit = input.sizer.half_unit_amount(input.settings);
                match self
                    .executor
                    .execute_buy(
                        &mut self.positions,
                        &symbol,
                        quote.last,
                        half_unit,
                        input.settings.price_buffer_pct,
                        TradeReason::Pyramid,
                    )
                    .await
                {
                    Ok(_) => report.pyramids.push(symbol.clone()),
                    Err(e) => warn!(symbol = %symbol, error = %e, "pyramid order failed"),
                }
            } else {
                info!(symbol = %symbol, close = %quote.last, entry = %entry_price, "close at or below entry, cutting");
                self.sell_everything(input, &symbol, quote.last, TradeReason::CloseCut, report)
                    .await;
            }
        }
    }

    async fn sell_everything(
        &mut self,
        input: &CycleInput<'_>,
        symbol: &Symbol,
        reference_price: Decimal,
        reason: TradeReason,
        report: &mut CycleReport,
    ) {
        let mut quantity = self.positions.quantity(symbol);
        if quantity <= 0 {
            if let Ok(Some(holding)) = self.repo.query_holding(symbol).await {
                quantity = holding.quantity;
            }
        }
        if quantity <= 0 {
            warn!(symbol = %symbol, "no known quantity to sell");
            return;
        }

        match self
            .executor
            .execute_sell(
                &mut self.positions,
                symbol,
                reference_price,
                quantity,
                input.settings.price_buffer_pct,
                reason,
            )
            .await
        {
            Ok(_) => {
                self.triggers.mark_sold(symbol);
                report.exits.push((symbol.clone(), reason));
            }
            Err(e) => warn!(symbol = %symbol, error = %e, "exit order failed"),
        }
    }

    fn stop_loss_pct_for(&self, symbol: &Symbol, input: &CycleInput<'_>) -> Decimal {
        input
            .watchlist
            .iter()
            .find(|item| &item.ticker == symbol)
            .and_then(|item| item.stop_loss_pct)
            .unwrap_or(input.settings.stop_loss_pct)
    }

    async fn resolve_cost_basis(&self, symbol: &Symbol) -> Decimal {
        let ledger_cost = self.repo.open_cost_basis(symbol).await.ok();
        let holdings_cost = match self.repo.query_holding(symbol).await {
            Ok(holding) => holding.map(|h| h.purchase_amount),
            Err(_) => None,
        };
        cost_basis_with_fallback(ledger_cost, holdings_cost, self.positions.cost_basis(symbol))
    }
}

/// `entry * (1 - pct/100)`; a price exactly at the threshold triggers.
pub fn stop_loss_threshold(entry_price: Decimal, stop_pct: Decimal) -> Decimal {
    entry_price - entry_price.pct_of(stop_pct)
}
