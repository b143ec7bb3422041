//! Strategy: session clock, trigger dedup ledger, and the decision engine.

pub mod clock;
pub mod engine;
pub mod triggers;

pub use clock::MarketSession;
pub use engine::{stop_loss_threshold, CycleInput, CycleReport, StrategyEngine};
pub use triggers::{FileTriggerStore, TriggerLedger, TriggerStore, TriggerStoreError};
