//! Order execution and the local position cache.

pub mod executor;
pub mod positions;

pub use executor::{
    buffered_price, buy_quantity, ExecutionError, ExecutionOutcome, OrderExecutor, TradeReason,
};
pub use positions::{Position, PositionBook};
