//! Cascading venue detection with a per-symbol memo cache.

use super::{BrokerClient, BrokerError};
use crate::domain::{Symbol, Venue};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// Resolves which venue a symbol trades on by trying each venue in a fixed
/// order and caching the first that returns a usable quote.
#[derive(Debug)]
pub struct VenueDetector {
    cache: Mutex<HashMap<Symbol, Venue>>,
}

impl VenueDetector {
    pub fn new() -> Self {
        VenueDetector {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Detect the venue for a symbol, consulting the cache first.
    pub async fn detect(
        &self,
        broker: &dyn BrokerClient,
        symbol: &Symbol,
    ) -> Result<Venue, BrokerError> {
        if let Some(&venue) = self.cache.lock().await.get(symbol) {
            return Ok(venue);
        }

        for venue in Venue::all() {
            match broker.get_quote(symbol, venue).await {
                Ok(quote) if quote.has_last() => {
                    debug!(symbol = %symbol, venue = %venue, "venue detected");
                    self.cache.lock().await.insert(symbol.clone(), venue);
                    return Ok(venue);
                }
                Ok(_) => continue,
                Err(_) => continue,
            }
        }
        Err(BrokerError::Rejected {
            code: "VENUE".to_string(),
            message: format!("no venue quotes {}", symbol),
        })
    }

    /// Drop all cached detections (e.g., at day rollover).
    pub async fn clear(&self) {
        self.cache.lock().await.clear();
    }
}

impl Default for VenueDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MockBroker;
    use crate::domain::{Decimal, Quote};

    fn quote(last: &str) -> Quote {
        let d = |s| Decimal::from_str_canonical(s).unwrap();
        Quote {
            last: d(last),
            open: d(last),
            high: d(last),
            low: d(last),
        }
    }

    #[tokio::test]
    async fn test_detects_first_quoting_venue() {
        let broker = MockBroker::new();
        broker
            .set_quote(Symbol::new("XOM"), Venue::Nyse, quote("110.5"))
            .await;

        let detector = VenueDetector::new();
        let venue = detector
            .detect(&broker, &Symbol::new("XOM"))
            .await
            .unwrap();
        assert_eq!(venue, Venue::Nyse);
    }

    #[tokio::test]
    async fn test_detection_is_memoized() {
        let broker = MockBroker::new();
        broker
            .set_quote(Symbol::new("AAPL"), Venue::Nasdaq, quote("185"))
            .await;

        let detector = VenueDetector::new();
        detector.detect(&broker, &Symbol::new("AAPL")).await.unwrap();
        let calls_after_first = broker.quote_call_count().await;
        detector.detect(&broker, &Symbol::new("AAPL")).await.unwrap();
        assert_eq!(broker.quote_call_count().await, calls_after_first);
    }

    #[tokio::test]
    async fn test_unknown_symbol_errors() {
        let broker = MockBroker::new();
        let detector = VenueDetector::new();
        assert!(detector
            .detect(&broker, &Symbol::new("ZZZZ"))
            .await
            .is_err());
    }
}
