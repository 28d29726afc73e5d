// src/exchange/paper.rs
//
// In-memory exchange used for dry runs and tests. Serves preloaded
// candles and fills orders at the latest known price (or the limit
// price when one is set).
use crate::domain::errors::{ExchangeError, ExchangeResult};
use crate::domain::models::{
    AccountBalance, Candle, OrderConfirmation, OrderKind, TradeOrder,
};
use crate::exchange::client::{ExchangeClient, Granularity};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub struct PaperExchange {
    candles: Mutex<HashMap<String, Vec<Candle>>>,
    last_prices: Mutex<HashMap<String, f64>>,
    balance: Mutex<AccountBalance>,
    next_order_id: AtomicU64,
}

impl PaperExchange {
    pub fn new(initial_balance: f64, currency: &str) -> Self {
        Self {
            candles: Mutex::new(HashMap::new()),
            last_prices: Mutex::new(HashMap::new()),
            balance: Mutex::new(AccountBalance::new(initial_balance, currency)),
            next_order_id: AtomicU64::new(1),
        }
    }

    /// Preload the candle feed for a symbol; the last close becomes the
    /// fill price for market orders.
    pub fn load_candles(&self, symbol: &str, candles: Vec<Candle>) {
        if let Some(last) = candles.last() {
            self.set_price(symbol, last.close.to_f64().unwrap_or_default());
        }
        let mut feeds = match self.candles.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        feeds.insert(symbol.to_string(), candles);
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        let mut prices = match self.last_prices.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        prices.insert(symbol.to_string(), price);
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn fetch_candles(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _granularity: Granularity,
    ) -> ExchangeResult<Vec<Candle>> {
        let feeds = match self.candles.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let candles = feeds
            .get(symbol)
            .ok_or_else(|| ExchangeError::InvalidSymbol(symbol.to_string()))?;
        Ok(candles
            .iter()
            .filter(|c| c.start >= start && c.start < end)
            .cloned()
            .collect())
    }

    async fn place_order(&self, order: &TradeOrder) -> ExchangeResult<OrderConfirmation> {
        let fill_price = match (order.kind, order.limit_price) {
            (OrderKind::Limit, Some(limit)) => limit,
            _ => {
                let prices = match self.last_prices.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                prices.get(&order.symbol).copied().ok_or_else(|| {
                    ExchangeError::Order(format!("no price known for {}", order.symbol))
                })?
            }
        };

        if order.size <= 0.0 {
            return Err(ExchangeError::Order(format!(
                "non-positive order size {}",
                order.size
            )));
        }

        let id = self.next_order_id.fetch_add(1, Ordering::SeqCst);
        log::debug!(
            "paper fill: {} {} {:.6} @ {:.2}",
            order.symbol,
            order.side,
            order.size,
            fill_price
        );
        Ok(OrderConfirmation {
            order_id: format!("paper-{id}"),
            client_order_id: order.client_order_id.clone(),
            fill_price,
            filled_size: order.size,
            timestamp: Utc::now(),
        })
    }

    async fn get_balance(&self) -> ExchangeResult<AccountBalance> {
        let balance = match self.balance.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(balance.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::OrderSide;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn candle(offset_hours: i64, close: rust_decimal::Decimal) -> Candle {
        Candle {
            start: Utc::now() - Duration::hours(offset_hours),
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1_000_000),
        }
    }

    #[tokio::test]
    async fn serves_candles_within_the_window() {
        let exchange = PaperExchange::new(10_000.0, "USD");
        exchange.load_candles(
            "BTC-USD",
            vec![candle(30, dec!(100)), candle(10, dec!(110)), candle(1, dec!(120))],
        );

        let fetched = exchange
            .fetch_candles(
                "BTC-USD",
                Utc::now() - Duration::hours(12),
                Utc::now(),
                Granularity::OneHour,
            )
            .await
            .unwrap();
        assert_eq!(fetched.len(), 2);

        let missing = exchange
            .fetch_candles("DOGE-USD", Utc::now() - Duration::hours(1), Utc::now(), Granularity::OneHour)
            .await;
        assert!(matches!(missing, Err(ExchangeError::InvalidSymbol(_))));
    }

    #[tokio::test]
    async fn fills_market_orders_at_last_price() {
        let exchange = PaperExchange::new(10_000.0, "USD");
        exchange.set_price("BTC-USD", 50_000.0);

        let order = TradeOrder {
            symbol: "BTC-USD".to_string(),
            side: OrderSide::Buy,
            kind: OrderKind::Market,
            size: 0.1,
            limit_price: None,
            stop_loss: None,
            take_profit: None,
            client_order_id: Some("c-1".to_string()),
            metadata: HashMap::new(),
        };
        let fill = exchange.place_order(&order).await.unwrap();
        assert_eq!(fill.fill_price, 50_000.0);
        assert_eq!(fill.filled_size, 0.1);
        assert_eq!(fill.client_order_id.as_deref(), Some("c-1"));

        // Limit orders fill at the limit.
        let limit = TradeOrder {
            kind: OrderKind::Limit,
            limit_price: Some(49_500.0),
            ..order
        };
        let fill = exchange.place_order(&limit).await.unwrap();
        assert_eq!(fill.fill_price, 49_500.0);
    }

    #[tokio::test]
    async fn order_ids_are_unique() {
        let exchange = PaperExchange::new(10_000.0, "USD");
        exchange.set_price("BTC-USD", 50_000.0);
        let order = TradeOrder {
            symbol: "BTC-USD".to_string(),
            side: OrderSide::Sell,
            kind: OrderKind::Market,
            size: 1.0,
            limit_price: None,
            stop_loss: None,
            take_profit: None,
            client_order_id: None,
            metadata: HashMap::new(),
        };
        let a = exchange.place_order(&order).await.unwrap();
        let b = exchange.place_order(&order).await.unwrap();
        assert_ne!(a.order_id, b.order_id);
    }
}
