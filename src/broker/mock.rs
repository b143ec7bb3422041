//! Mock broker for tests: canned data in, submitted orders recorded.

use super::{BrokerClient, BrokerError, OrderReceipt};
use crate::domain::{Decimal, Holding, Quote, Side, Symbol, TradeRecord, Venue};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// An order the mock accepted, for assertion in tests.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedOrder {
    pub symbol: Symbol,
    pub venue: Venue,
    pub side: Side,
    pub quantity: i64,
    pub price: Decimal,
}

#[derive(Debug, Default)]
struct MockState {
    quotes: HashMap<(Symbol, Venue), Quote>,
    history: Vec<TradeRecord>,
    holdings: Vec<Holding>,
    sellable: HashMap<Symbol, i64>,
    buying_power: Decimal,
    submitted: Vec<SubmittedOrder>,
    quote_calls: usize,
    fail_orders: bool,
}

/// In-memory `BrokerClient` for tests.
#[derive(Debug, Default)]
pub struct MockBroker {
    state: Mutex<MockState>,
}

impl MockBroker {
    pub fn new() -> Self {
        MockBroker::default()
    }

    pub async fn set_quote(&self, symbol: Symbol, venue: Venue, quote: Quote) {
        self.state.lock().await.quotes.insert((symbol, venue), quote);
    }

    pub async fn set_history(&self, trades: Vec<TradeRecord>) {
        self.state.lock().await.history = trades;
    }

    pub async fn set_holdings(&self, holdings: Vec<Holding>) {
        self.state.lock().await.holdings = holdings;
    }

    pub async fn set_sellable(&self, symbol: Symbol, quantity: i64) {
        self.state.lock().await.sellable.insert(symbol, quantity);
    }

    pub async fn set_buying_power(&self, amount: Decimal) {
        self.state.lock().await.buying_power = amount;
    }

    pub async fn set_fail_orders(&self, fail: bool) {
        self.state.lock().await.fail_orders = fail;
    }

    pub async fn submitted_orders(&self) -> Vec<SubmittedOrder> {
        self.state.lock().await.submitted.clone()
    }

    pub async fn quote_call_count(&self) -> usize {
        self.state.lock().await.quote_calls
    }
}

#[async_trait]
impl BrokerClient for MockBroker {
    async fn get_quote(&self, symbol: &Symbol, venue: Venue) -> Result<Quote, BrokerError> {
        let mut state = self.state.lock().await;
        state.quote_calls += 1;
        state
            .quotes
            .get(&(symbol.clone(), venue))
            .copied()
            .ok_or_else(|| BrokerError::Rejected {
                code: "QUOTE".to_string(),
                message: format!("no quote for {} on {}", symbol, venue),
            })
    }

    async fn get_trade_history(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        side: Option<Side>,
    ) -> Result<Vec<TradeRecord>, BrokerError> {
        let state = self.state.lock().await;
        Ok(state
            .history
            .iter()
            .filter(|t| t.trade_date >= from && t.trade_date <= to)
            .filter(|t| side.map(|s| t.side == s).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn get_holdings(&self) -> Result<Vec<Holding>, BrokerError> {
        Ok(self.state.lock().await.holdings.clone())
    }

    async fn submit_order(
        &self,
        symbol: &Symbol,
        venue: Venue,
        side: Side,
        quantity: i64,
        price: Decimal,
    ) -> Result<OrderReceipt, BrokerError> {
        let mut state = self.state.lock().await;
        if state.fail_orders {
            return Err(BrokerError::Rejected {
                code: "MOCK".to_string(),
                message: "order rejected".to_string(),
            });
        }
        state.submitted.push(SubmittedOrder {
            symbol: symbol.clone(),
            venue,
            side,
            quantity,
            price,
        });
        Ok(OrderReceipt {
            order_id: format!("mock-{}", state.submitted.len()),
        })
    }

    async fn get_sellable_quantity(&self, symbol: &Symbol) -> Result<i64, BrokerError> {
        Ok(self
            .state
            .lock()
            .await
            .sellable
            .get(symbol)
            .copied()
            .unwrap_or(0))
    }

    async fn get_buying_power(&self) -> Result<Decimal, BrokerError> {
        Ok(self.state.lock().await.buying_power)
    }
}
