//! Full trading-day flows through the public API: entry in the morning,
//! the close-of-day decision, and trigger persistence across a restart.

use breakwatch::broker::{MockBroker, VenueDetector};
use breakwatch::config::TradingSettings;
use breakwatch::db::{init_db, Repository};
use breakwatch::domain::{Decimal, Holding, LendingClass, Quote, Side, Symbol, Venue};
use breakwatch::execution::{OrderExecutor, TradeReason};
use breakwatch::notify::Notifier;
use breakwatch::sizing::PositionSizer;
use breakwatch::strategy::{CycleInput, FileTriggerStore, MarketSession, StrategyEngine, TriggerLedger};
use breakwatch::sync::SyncService;
use breakwatch::watchlist::WatchlistItem;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

fn day() -> NaiveDate {
    "2026-02-04".parse().unwrap()
}

fn quote(last: &str, open: &str) -> Quote {
    Quote {
        last: d(last),
        open: d(open),
        high: d(last),
        low: d(last),
    }
}

fn session(opening_minute: bool, near_close: bool) -> MarketSession {
    MarketSession {
        trading_date: day(),
        is_open: true,
        is_opening_minute: opening_minute,
        is_near_close: near_close,
    }
}

fn watch(ticker: &str, target: &str) -> Vec<WatchlistItem> {
    vec![WatchlistItem {
        ticker: Symbol::new(ticker),
        target_price: d(target),
        stop_loss_pct: None,
        max_units: None,
        added_date: None,
    }]
}

fn price_map(symbol: &str, q: Quote) -> HashMap<Symbol, Quote> {
    HashMap::from([(Symbol::new(symbol), q)])
}

async fn engine_at(dir: &Path, broker: Arc<MockBroker>) -> (Arc<Repository>, StrategyEngine) {
    let db_path = dir.join("flow.db").to_string_lossy().to_string();
    let pool = init_db(&db_path).await.unwrap();
    let repo = Arc::new(Repository::new(pool));
    let executor = OrderExecutor::new(
        broker.clone(),
        Arc::new(VenueDetector::new()),
        Notifier::disabled(),
    );
    let triggers = TriggerLedger::load_for(
        Box::new(FileTriggerStore::new(dir.join("triggers.json"))),
        day(),
    );
    let engine = StrategyEngine::new(broker, repo.clone(), executor, triggers, Notifier::disabled());
    (repo, engine)
}

async fn run(
    engine: &mut StrategyEngine,
    sess: MarketSession,
    watchlist: &[WatchlistItem],
    prices: &HashMap<Symbol, Quote>,
    settings: &TradingSettings,
) -> breakwatch::strategy::CycleReport {
    engine
        .run_cycle(CycleInput {
            session: sess,
            watchlist,
            prices,
            sizer: PositionSizer::new(d("100000")),
            settings,
        })
        .await
}

#[tokio::test]
async fn breakout_then_pyramid_then_restart_keeps_trigger() {
    let dir = TempDir::new().unwrap();
    let broker = Arc::new(MockBroker::new());
    let symbol = Symbol::new("AAPL");
    broker
        .set_quote(
            symbol.clone(),
            breakwatch::domain::Venue::Nasdaq,
            quote("186", "180"),
        )
        .await;

    let (_repo, mut engine) = engine_at(dir.path(), broker.clone()).await;
    let watchlist = watch("AAPL", "185");
    let settings = TradingSettings::default();

    // Morning breakout.
    let prices = price_map("AAPL", quote("186", "180"));
    let report = run(&mut engine, session(false, false), &watchlist, &prices, &settings).await;
    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.entries[0].1, TradeReason::Breakout);

    // Near the close the price holds above entry: pyramid, not cut.
    let prices = price_map("AAPL", quote("190", "180"));
    let report = run(&mut engine, session(false, true), &watchlist, &prices, &settings).await;
    assert_eq!(report.pyramids, vec![symbol.clone()]);
    assert!(report.exits.is_empty());

    let submitted = broker.submitted_orders().await;
    assert_eq!(submitted.len(), 2);
    assert!(submitted.iter().all(|o| o.side == Side::Buy));

    // Restart: a fresh ledger over the same file still knows the trigger.
    drop(engine);
    let reloaded = TriggerLedger::load_for(
        Box::new(FileTriggerStore::new(dir.path().join("triggers.json"))),
        day(),
    );
    assert!(reloaded.has_triggered(&symbol));

    // Fresh engine on the same state: no duplicate entry.
    let (_repo, mut engine) = engine_at(dir.path(), broker.clone()).await;
    let prices = price_map("AAPL", quote("186", "180"));
    let report = run(&mut engine, session(false, false), &watchlist, &prices, &settings).await;
    assert!(report.entries.is_empty());
    assert_eq!(broker.submitted_orders().await.len(), 2);
}

#[tokio::test]
async fn synced_holdings_feed_the_unit_cap() {
    let dir = TempDir::new().unwrap();
    let broker = Arc::new(MockBroker::new());
    let symbol = Symbol::new("AAPL");
    broker
        .set_quote(symbol.clone(), Venue::Nasdaq, quote("186", "180"))
        .await;
    // A full unit (5% of 100k) already held, known only to the broker's
    // holdings feed; no lots and no local positions.
    broker
        .set_holdings(vec![Holding {
            symbol: symbol.clone(),
            name: "Apple".to_string(),
            quantity: 27,
            avg_cost: d("185"),
            current_price: d("186"),
            purchase_amount: d("5000"),
            valuation: d("5022"),
            lending_class: LendingClass::Cash,
            currency: "USD".to_string(),
            venue: Venue::Nasdaq,
            snapshot_date: day(),
        }])
        .await;

    let (repo, mut engine) = engine_at(dir.path(), broker.clone()).await;
    let sync = SyncService::new(broker.clone(), repo.clone());
    let synced = sync.sync_holdings().await.unwrap();
    assert_eq!(synced.len(), 1);

    let watchlist = watch("AAPL", "185");
    let settings = TradingSettings::default();
    let prices = price_map("AAPL", quote("186", "180"));
    let report = run(&mut engine, session(false, false), &watchlist, &prices, &settings).await;

    // The snapshot's purchase amount fills the cost-basis gap and blocks
    // the entry at the one-unit cap.
    assert!(report.entries.is_empty());
    assert!(broker.submitted_orders().await.is_empty());
}

#[tokio::test]
async fn entry_then_stop_loss_then_quiet_close() {
    let dir = TempDir::new().unwrap();
    let broker = Arc::new(MockBroker::new());
    let symbol = Symbol::new("AAPL");
    broker
        .set_quote(
            symbol.clone(),
            breakwatch::domain::Venue::Nasdaq,
            quote("186", "180"),
        )
        .await;

    let (_repo, mut engine) = engine_at(dir.path(), broker.clone()).await;
    let watchlist = watch("AAPL", "185");
    let settings = TradingSettings::default();

    let prices = price_map("AAPL", quote("186", "180"));
    let report = run(&mut engine, session(false, false), &watchlist, &prices, &settings).await;
    assert_eq!(report.entries.len(), 1);

    let bought = broker.submitted_orders().await[0].quantity;
    broker.set_sellable(symbol.clone(), bought).await;

    // Price falls through the 3% stop on the entry fill price.
    let prices = price_map("AAPL", quote("178", "180"));
    let report = run(&mut engine, session(false, false), &watchlist, &prices, &settings).await;
    assert_eq!(report.exits.len(), 1);
    assert_eq!(report.exits[0].1, TradeReason::IntradayStopLoss);

    let submitted = broker.submitted_orders().await;
    assert_eq!(submitted.len(), 2);
    assert_eq!(submitted[1].side, Side::Sell);
    assert_eq!(submitted[1].quantity, bought);

    // Sold symbols get no close-of-day decision and no re-entry.
    let prices = price_map("AAPL", quote("190", "180"));
    let report = run(&mut engine, session(false, true), &watchlist, &prices, &settings).await;
    assert!(report.entries.is_empty());
    assert!(report.pyramids.is_empty());
    assert!(report.exits.is_empty());
    assert_eq!(broker.submitted_orders().await.len(), 2);
}
