//! Broker abstraction: quotes, trade history, holdings, and order entry.

use crate::domain::{Decimal, Holding, Quote, Side, Symbol, TradeRecord, Venue};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;

pub mod mock;
pub mod rest;
pub mod throttle;
pub mod venue;

pub use mock::MockBroker;
pub use rest::RestBroker;
pub use throttle::Throttle;
pub use venue::VenueDetector;

/// Acknowledgement of a submitted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderReceipt {
    pub order_id: String,
}

/// Broker client trait.
///
/// Every call may fail transiently; callers treat a failure as "no data
/// this cycle" rather than a fatal condition. Implementations own their own
/// retry/backoff and rate limiting.
#[async_trait]
pub trait BrokerClient: Send + Sync + fmt::Debug {
    /// Fetch a live quote for a symbol on a venue.
    async fn get_quote(&self, symbol: &Symbol, venue: Venue) -> Result<Quote, BrokerError>;

    /// Fetch executed trades in a date range (inclusive), optionally
    /// filtered by side.
    async fn get_trade_history(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        side: Option<Side>,
    ) -> Result<Vec<TradeRecord>, BrokerError>;

    /// Fetch the live holdings feed.
    async fn get_holdings(&self) -> Result<Vec<Holding>, BrokerError>;

    /// Submit a limit order. Fire-and-forget once acknowledged.
    async fn submit_order(
        &self,
        symbol: &Symbol,
        venue: Venue,
        side: Side,
        quantity: i64,
        price: Decimal,
    ) -> Result<OrderReceipt, BrokerError>;

    /// Quantity currently available to sell for a symbol.
    async fn get_sellable_quantity(&self, symbol: &Symbol) -> Result<i64, BrokerError>;

    /// Cash available for new purchases.
    async fn get_buying_power(&self) -> Result<Decimal, BrokerError>;
}

/// Error type for broker operations.
#[derive(Debug, Clone)]
pub enum BrokerError {
    /// Network error (connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (429 rate limit, 5xx server error)
    HttpError { status: u16, message: String },
    /// Broker-level rejection (error code in an otherwise OK response)
    Rejected { code: String, message: String },
    /// Parsing error (invalid JSON or malformed response)
    ParseError(String),
    /// Authentication/token failure
    AuthError(String),
    /// Rate limit exceeded
    RateLimited,
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            BrokerError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            BrokerError::Rejected { code, message } => {
                write!(f, "Broker rejected ({}): {}", code, message)
            }
            BrokerError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            BrokerError::AuthError(msg) => write!(f, "Auth error: {}", msg),
            BrokerError::RateLimited => write!(f, "Rate limited"),
        }
    }
}

impl std::error::Error for BrokerError {}
