//! Order execution: price buffering, share sizing, oversell protection.

use super::positions::PositionBook;
use crate::broker::{BrokerClient, BrokerError, VenueDetector};
use crate::domain::{Decimal, Side, Symbol};
use crate::notify::Notifier;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Why an order is being placed; carried into logs and notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeReason {
    Breakout,
    GapUp,
    Pyramid,
    IntradayStopLoss,
    PriorDayStopLoss,
    CloseCut,
}

impl TradeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeReason::Breakout => "breakout",
            TradeReason::GapUp => "gap-up",
            TradeReason::Pyramid => "pyramid",
            TradeReason::IntradayStopLoss => "intraday stop-loss",
            TradeReason::PriorDayStopLoss => "prior-day stop-loss",
            TradeReason::CloseCut => "close cut",
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
    #[error("nothing sellable for {0}")]
    NothingSellable(Symbol),
}

/// A successfully submitted order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub order_id: String,
    pub quantity: i64,
    pub price: Decimal,
}

/// Buffered limit price: pay up slightly on buys, give up slightly on
/// sells, so marketable limits fill without chasing. Rounded to cents.
pub fn buffered_price(reference: Decimal, side: Side, buffer_pct: Decimal) -> Decimal {
    let buffer = reference.pct_of(buffer_pct);
    let price = match side {
        Side::Buy => reference + buffer,
        Side::Sell => reference - buffer,
    };
    price.round_to_cents()
}

/// Share count for a buy: the half-unit dollar amount at the buffered
/// price, floored, never below one share.
pub fn buy_quantity(half_unit_amount: Decimal, price: Decimal) -> i64 {
    if !price.is_positive() {
        return 0;
    }
    (half_unit_amount / price).floor_to_i64().max(1)
}

/// Turns strategy decisions into orders. Failures are returned, not
/// retried: the next cycle re-evaluates and may retry naturally.
pub struct OrderExecutor {
    broker: Arc<dyn BrokerClient>,
    venues: Arc<VenueDetector>,
    notifier: Notifier,
}

impl OrderExecutor {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        venues: Arc<VenueDetector>,
        notifier: Notifier,
    ) -> Self {
        OrderExecutor {
            broker,
            venues,
            notifier,
        }
    }

    /// Submit a half-unit buy at the live price plus buffer. Updates the
    /// position cache on success.
    pub async fn execute_buy(
        &self,
        positions: &mut PositionBook,
        symbol: &Symbol,
        reference_price: Decimal,
        half_unit_amount: Decimal,
        buffer_pct: Decimal,
        reason: TradeReason,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let price = buffered_price(reference_price, Side::Buy, buffer_pct);
        let quantity = buy_quantity(half_unit_amount, price);
        let venue = self.venues.detect(self.broker.as_ref(), symbol).await?;

        info!(
            symbol = %symbol,
            quantity,
            price = %price,
            reason = reason.as_str(),
            "submitting buy order"
        );
        match self
            .broker
            .submit_order(symbol, venue, Side::Buy, quantity, price)
            .await
        {
            Ok(receipt) => {
                positions.apply_buy(symbol, quantity, price);
                self.notifier
                    .order_submitted(symbol, Side::Buy, quantity, price, reason.as_str());
                Ok(ExecutionOutcome {
                    order_id: receipt.order_id,
                    quantity,
                    price,
                })
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "buy order failed");
                self.notifier
                    .order_failed(symbol, Side::Buy, reason.as_str(), &e.to_string());
                Err(e.into())
            }
        }
    }

    /// Submit a sell at the live price minus buffer, capped at the
    /// broker-reported sellable quantity. Updates the position cache on
    /// success.
    pub async fn execute_sell(
        &self,
        positions: &mut PositionBook,
        symbol: &Symbol,
        reference_price: Decimal,
        requested_quantity: i64,
        buffer_pct: Decimal,
        reason: TradeReason,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let sellable = self.broker.get_sellable_quantity(symbol).await?;
        let quantity = requested_quantity.min(sellable);
        if quantity <= 0 {
            warn!(symbol = %symbol, requested_quantity, sellable, "nothing sellable");
            return Err(ExecutionError::NothingSellable(symbol.clone()));
        }

        let price = buffered_price(reference_price, Side::Sell, buffer_pct);
        let venue = self.venues.detect(self.broker.as_ref(), symbol).await?;

        info!(
            symbol = %symbol,
            quantity,
            price = %price,
            reason = reason.as_str(),
            "submitting sell order"
        );
        match self
            .broker
            .submit_order(symbol, venue, Side::Sell, quantity, price)
            .await
        {
            Ok(receipt) => {
                positions.apply_sell(symbol, quantity);
                self.notifier
                    .order_submitted(symbol, Side::Sell, quantity, price, reason.as_str());
                Ok(ExecutionOutcome {
                    order_id: receipt.order_id,
                    quantity,
                    price,
                })
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "sell order failed");
                self.notifier
                    .order_failed(symbol, Side::Sell, reason.as_str(), &e.to_string());
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MockBroker;
    use crate::domain::{Quote, Venue};

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_buffered_price_rounds_to_cents() {
        // 100.10 * 1.005 = 100.6005 -> 100.60
        assert_eq!(
            buffered_price(d("100.10"), Side::Buy, d("0.5")),
            d("100.60")
        );
        // 100.10 * 0.995 = 99.5995 -> 99.60
        assert_eq!(
            buffered_price(d("100.10"), Side::Sell, d("0.5")),
            d("99.60")
        );
    }

    #[test]
    fn test_buy_quantity_floors_with_minimum_one() {
        assert_eq!(buy_quantity(d("5000"), d("185.50")), 26);
        // An expensive share still buys one.
        assert_eq!(buy_quantity(d("500"), d("900")), 1);
        assert_eq!(buy_quantity(d("5000"), Decimal::zero()), 0);
    }

    async fn executor_with(broker: Arc<MockBroker>) -> OrderExecutor {
        OrderExecutor::new(
            broker,
            Arc::new(VenueDetector::new()),
            Notifier::disabled(),
        )
    }

    fn quote(last: &str) -> Quote {
        Quote {
            last: d(last),
            open: d(last),
            high: d(last),
            low: d(last),
        }
    }

    #[tokio::test]
    async fn test_execute_buy_updates_positions() {
        let broker = Arc::new(MockBroker::new());
        broker
            .set_quote(Symbol::new("AAPL"), Venue::Nasdaq, quote("185.50"))
            .await;
        let executor = executor_with(broker.clone()).await;
        let mut positions = PositionBook::new();

        let outcome = executor
            .execute_buy(
                &mut positions,
                &Symbol::new("AAPL"),
                d("185.50"),
                d("5000"),
                d("0.5"),
                TradeReason::Breakout,
            )
            .await
            .unwrap();

        // 185.50 * 1.005 = 186.43 (rounded); floor(5000 / 186.43) = 26
        assert_eq!(outcome.price, d("186.43"));
        assert_eq!(outcome.quantity, 26);
        assert_eq!(positions.quantity(&Symbol::new("AAPL")), 26);

        let submitted = broker.submitted_orders().await;
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].side, Side::Buy);
    }

    #[tokio::test]
    async fn test_execute_sell_caps_at_sellable() {
        let broker = Arc::new(MockBroker::new());
        broker
            .set_quote(Symbol::new("AAPL"), Venue::Nasdaq, quote("100"))
            .await;
        broker.set_sellable(Symbol::new("AAPL"), 6).await;
        let executor = executor_with(broker.clone()).await;
        let mut positions = PositionBook::new();
        positions.apply_buy(&Symbol::new("AAPL"), 10, d("100"));

        let outcome = executor
            .execute_sell(
                &mut positions,
                &Symbol::new("AAPL"),
                d("100"),
                10,
                d("0.5"),
                TradeReason::CloseCut,
            )
            .await
            .unwrap();

        assert_eq!(outcome.quantity, 6);
        assert_eq!(positions.quantity(&Symbol::new("AAPL")), 4);
    }

    #[tokio::test]
    async fn test_execute_sell_refuses_zero_sellable() {
        let broker = Arc::new(MockBroker::new());
        broker
            .set_quote(Symbol::new("AAPL"), Venue::Nasdaq, quote("100"))
            .await;
        let executor = executor_with(broker.clone()).await;
        let mut positions = PositionBook::new();

        let result = executor
            .execute_sell(
                &mut positions,
                &Symbol::new("AAPL"),
                d("100"),
                10,
                d("0.5"),
                TradeReason::CloseCut,
            )
            .await;
        assert!(matches!(result, Err(ExecutionError::NothingSellable(_))));
        assert!(broker.submitted_orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_order_leaves_positions_untouched() {
        let broker = Arc::new(MockBroker::new());
        broker
            .set_quote(Symbol::new("AAPL"), Venue::Nasdaq, quote("185.50"))
            .await;
        broker.set_fail_orders(true).await;
        let executor = executor_with(broker.clone()).await;
        let mut positions = PositionBook::new();

        let result = executor
            .execute_buy(
                &mut positions,
                &Symbol::new("AAPL"),
                d("185.50"),
                d("5000"),
                d("0.5"),
                TradeReason::Breakout,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(positions.quantity(&Symbol::new("AAPL")), 0);
    }
}
