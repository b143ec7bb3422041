//! Core domain types shared across the crate.

pub mod decimal;
pub mod lot;
pub mod market;
pub mod primitives;
pub mod trade;
pub mod trigger;

pub use decimal::Decimal;
pub use lot::{Lot, LotKey};
pub use market::{Holding, Quote};
pub use primitives::{LendingClass, Side, Symbol, Venue};
pub use trade::TradeRecord;
pub use trigger::{DayTriggers, EntryKind, TriggerRecord};
