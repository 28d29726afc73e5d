// src/notify/mod.rs
//
// Outbound notifications. Delivery is best effort: failures are logged
// by the caller and never abort a trading cycle.
use crate::domain::errors::{AppError, AppResult};
use crate::domain::models::{CloseReason, TradeOrder, TradingSignal};
use async_trait::async_trait;
use serde_json::json;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str, payload: serde_json::Value) -> AppResult<()>;
}

/// Human-readable line plus a structured payload for a fused signal and
/// the order it produced.
pub fn compose_signal_notification(
    signal: &TradingSignal,
    order: &TradeOrder,
) -> (String, serde_json::Value) {
    let message = format!(
        "{} {} {:.6} @ {:.2} (signal {}, strength {:.2}, confidence {:.2})",
        order.side, order.symbol, order.size, signal.entry_price, signal.signal,
        signal.strength, signal.confidence
    );
    let payload = json!({
        "symbol": order.symbol,
        "side": order.side.as_str(),
        "size": order.size,
        "entry_price": signal.entry_price,
        "stop_loss": order.stop_loss,
        "take_profit": order.take_profit,
        "signal": signal.signal.to_string(),
        "strength": signal.strength,
        "confidence": signal.confidence,
        "metadata": order.metadata,
    });
    (message, payload)
}

pub fn compose_close_notification(
    symbol: &str,
    reason: CloseReason,
    exit_price: f64,
    pnl: f64,
) -> (String, serde_json::Value) {
    let message = format!("closed {symbol} @ {exit_price:.2} ({reason}), pnl {pnl:+.2}");
    let payload = json!({
        "symbol": symbol,
        "reason": reason.to_string(),
        "exit_price": exit_price,
        "pnl": pnl,
    });
    (message, payload)
}

/// Default sink: write notifications to the log.
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn notify(&self, message: &str, payload: serde_json::Value) -> AppResult<()> {
        log::info!("notification: {message}");
        log::debug!("notification payload: {payload}");
        Ok(())
    }
}

/// Fan-out to several sinks; the first failure is surfaced after every
/// sink has been attempted.
pub struct CompositeNotifier {
    sinks: Vec<Box<dyn Notifier>>,
}

impl CompositeNotifier {
    pub fn new(sinks: Vec<Box<dyn Notifier>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl Notifier for CompositeNotifier {
    async fn notify(&self, message: &str, payload: serde_json::Value) -> AppResult<()> {
        let deliveries = self
            .sinks
            .iter()
            .map(|sink| sink.notify(message, payload.clone()));
        let mut first_error = None;
        for result in futures_util::future::join_all(deliveries).await {
            if let Err(err) = result {
                log::warn!("notification sink failed: {err}");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(AppError::Notification(err.to_string())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{OrderKind, OrderSide, SignalKind};
    use chrono::Utc;
    use std::collections::HashMap;

    #[test]
    fn signal_notification_carries_the_order_details() {
        let signal = TradingSignal {
            symbol: "BTC-USD".to_string(),
            signal: SignalKind::StrongBuy,
            strength: 0.85,
            confidence: 0.75,
            entry_price: 50_000.0,
            stop_loss: None,
            take_profit: None,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        };
        let order = TradeOrder {
            symbol: "BTC-USD".to_string(),
            side: OrderSide::Buy,
            kind: OrderKind::Limit,
            size: 0.1333,
            limit_price: Some(50_000.0),
            stop_loss: Some(48_500.0),
            take_profit: Some(53_750.0),
            client_order_id: None,
            metadata: HashMap::new(),
        };

        let (message, payload) = compose_signal_notification(&signal, &order);
        assert!(message.contains("BTC-USD"));
        assert!(message.contains("strong_buy"));
        assert_eq!(payload["side"], "buy");
        assert_eq!(payload["stop_loss"], 48_500.0);
    }

    #[test]
    fn close_notification_reports_pnl() {
        let (message, payload) =
            compose_close_notification("ETH-USD", CloseReason::TrailingStop, 3_100.0, -42.5);
        assert!(message.contains("trailing_stop"));
        assert!(message.contains("-42.5"));
        assert_eq!(payload["pnl"], -42.5);
    }
}
