//! Shared price cache and the background quote poller.
//!
//! The poller owns all quote fetching; the monitoring loop only reads the
//! cache and never blocks on the network for prices.

use crate::broker::{BrokerClient, VenueDetector};
use crate::domain::{Decimal, Quote, Symbol};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Lock-protected symbol → latest-quote map.
#[derive(Debug, Default)]
pub struct PriceCache {
    quotes: RwLock<HashMap<Symbol, Quote>>,
}

impl PriceCache {
    pub fn new() -> Self {
        PriceCache::default()
    }

    pub async fn get(&self, symbol: &Symbol) -> Option<Quote> {
        self.quotes.read().await.get(symbol).copied()
    }

    /// Snapshot for one strategy cycle, so every check in the cycle sees
    /// consistent prices.
    pub async fn snapshot(&self) -> HashMap<Symbol, Quote> {
        self.quotes.read().await.clone()
    }

    /// Symbol → last price for every cached quote with a usable last,
    /// the shape the lot-metrics refresh consumes.
    pub async fn last_prices(&self) -> HashMap<Symbol, Decimal> {
        self.quotes
            .read()
            .await
            .iter()
            .filter(|(_, quote)| quote.has_last())
            .map(|(symbol, quote)| (symbol.clone(), quote.last))
            .collect()
    }

    pub async fn update(&self, symbol: Symbol, quote: Quote) {
        self.quotes.write().await.insert(symbol, quote);
    }

    pub async fn clear(&self) {
        self.quotes.write().await.clear();
    }
}

/// Polls quotes for the watched symbols on its own interval.
pub struct PricePoller {
    broker: Arc<dyn BrokerClient>,
    venues: Arc<VenueDetector>,
    cache: Arc<PriceCache>,
    /// Watched symbols, swapped out whenever the watchlist reloads.
    symbols: Arc<RwLock<Vec<Symbol>>>,
}

impl PricePoller {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        venues: Arc<VenueDetector>,
        cache: Arc<PriceCache>,
        symbols: Arc<RwLock<Vec<Symbol>>>,
    ) -> Self {
        PricePoller {
            broker,
            venues,
            cache,
            symbols,
        }
    }

    /// One polling pass over the current symbol set. A failed symbol keeps
    /// its previous cached quote.
    pub async fn poll_once(&self) {
        let symbols = self.symbols.read().await.clone();
        for symbol in symbols {
            let venue = match self.venues.detect(self.broker.as_ref(), &symbol).await {
                Ok(venue) => venue,
                Err(e) => {
                    debug!(symbol = %symbol, error = %e, "venue detection failed");
                    continue;
                }
            };
            match self.broker.get_quote(&symbol, venue).await {
                Ok(quote) if quote.has_last() => {
                    self.cache.update(symbol, quote).await;
                }
                Ok(_) => debug!(symbol = %symbol, "quote had no last price"),
                Err(e) => warn!(symbol = %symbol, error = %e, "quote fetch failed"),
            }
        }
    }

    /// Run forever on the given interval. Spawned as a detached task.
    pub async fn run(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.poll_once().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MockBroker;
    use crate::domain::{Decimal, Venue};

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
    async fn test_last_prices_skips_quotes_without_last() {
        let cache = PriceCache::new();
        cache.update(Symbol::new("AAPL"), quote("185.5")).await;
        let mut stale = quote("0");
        stale.open = Decimal::from_str_canonical("100").unwrap();
        cache.update(Symbol::new("NVDA"), stale).await;

        let prices = cache.last_prices().await;
        assert_eq!(prices.len(), 1);
        assert_eq!(
            prices.get(&Symbol::new("AAPL")),
            Some(&Decimal::from_str_canonical("185.5").unwrap())
        );
    }

    #[tokio::test]
    async fn test_poll_once_fills_cache() {
        let broker = Arc::new(MockBroker::new());
        broker
            .set_quote(Symbol::new("AAPL"), Venue::Nasdaq, quote("185.5"))
            .await;
        let cache = Arc::new(PriceCache::new());
        let symbols = Arc::new(RwLock::new(vec![Symbol::new("AAPL"), Symbol::new("MISS")]));

        let poller = PricePoller::new(
            broker,
            Arc::new(VenueDetector::new()),
            cache.clone(),
            symbols,
        );
        poller.poll_once().await;

        assert!(cache.get(&Symbol::new("AAPL")).await.is_some());
        assert!(cache.get(&Symbol::new("MISS")).await.is_none());
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_quote() {
        let broker = Arc::new(MockBroker::new());
        let cache = Arc::new(PriceCache::new());
        cache.update(Symbol::new("AAPL"), quote("185.5")).await;
        let symbols = Arc::new(RwLock::new(vec![Symbol::new("AAPL")]));

        let poller = PricePoller::new(
            broker,
            Arc::new(VenueDetector::new()),
            cache.clone(),
            symbols,
        );
        poller.poll_once().await;

        assert_eq!(
            cache.get(&Symbol::new("AAPL")).await,
            Some(quote("185.5"))
        );
    }
}
