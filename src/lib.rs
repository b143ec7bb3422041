pub mod broker;
pub mod config;
pub mod db;
pub mod domain;
pub mod execution;
pub mod ledger;
pub mod monitor;
pub mod notify;
pub mod pricing;
pub mod sizing;
pub mod strategy;
pub mod sync;
pub mod watchlist;

pub use broker::{BrokerClient, BrokerError, MockBroker, RestBroker, Throttle, VenueDetector};
pub use config::{Config, ConfigError, TradingSettings};
pub use db::{init_db, Repository};
pub use domain::{
    DayTriggers, Decimal, EntryKind, Holding, LendingClass, Lot, LotKey, Quote, Side, Symbol,
    TradeRecord, TriggerRecord, Venue,
};
pub use execution::{OrderExecutor, PositionBook, TradeReason};
pub use ledger::LotBook;
pub use monitor::Monitor;
pub use notify::Notifier;
pub use pricing::{PriceCache, PricePoller};
pub use sizing::PositionSizer;
pub use strategy::{MarketSession, StrategyEngine, TriggerLedger};
pub use sync::SyncService;
