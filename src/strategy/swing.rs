// src/strategy/swing.rs
//
// Multi-day swing strategy: enters on strong fused signals in liquid
// markets, protects with a fixed stop plus a trailing stop off the best
// price seen, and exits on stop, target, stale age or a trend reversal.
use crate::domain::errors::{TradingError, TradingResult};
use crate::domain::models::{
    AccountBalance, CloseReason, MarketSnapshot, OrderKind, OrderSide, Position, RiskLimits,
    SignalKind, TradeOrder, TradingSignal,
};
use crate::risk::{fixed_stop_loss, risk_reward_take_profit, trail_stop_loss, PositionSizer};
use crate::strategy::{passes_base_checks, Strategy};
use async_trait::async_trait;
use chrono::Duration;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct SwingConfig {
    /// Global entry threshold on fused strength.
    pub min_signal_strength: f64,
    pub min_confidence: f64,
    /// Plain (non-strong) signals need this much confidence to enter.
    pub plain_entry_confidence: f64,
    /// 24h volume floor; illiquid markets are skipped.
    pub min_volume: f64,
    pub stop_loss_pct: f64,
    pub reward_ratio: f64,
    pub trailing_stop_pct: f64,
    pub max_hold_days: i64,
    pub risk_per_trade_pct: f64,
}

impl Default for SwingConfig {
    fn default() -> Self {
        Self {
            min_signal_strength: 0.7,
            min_confidence: 0.6,
            plain_entry_confidence: 0.75,
            min_volume: 1_000_000.0,
            stop_loss_pct: 3.0,
            reward_ratio: 2.5,
            trailing_stop_pct: 2.0,
            max_hold_days: 14,
            risk_per_trade_pct: 2.0,
        }
    }
}

pub struct SwingStrategy {
    config: SwingConfig,
    sizer: PositionSizer,
}

impl SwingStrategy {
    pub fn new(config: SwingConfig, limits: RiskLimits) -> Self {
        Self {
            config,
            sizer: PositionSizer::new(limits),
        }
    }

    /// Expected holding period scales down as conviction drops.
    fn estimated_hold_days(strength: f64) -> i64 {
        if strength >= 0.9 {
            7
        } else if strength >= 0.8 {
            5
        } else {
            3
        }
    }

    fn swing_entry_allowed(&self, signal: &TradingSignal, snapshot: &MarketSnapshot) -> bool {
        if signal.signal == SignalKind::Hold {
            return false;
        }
        if signal.strength < self.config.min_signal_strength
            || signal.confidence < 0.65_f64.max(self.config.min_confidence)
        {
            return false;
        }
        if snapshot.volume < self.config.min_volume {
            log::debug!(
                "{}: volume {:.0} below floor {:.0}",
                signal.symbol,
                snapshot.volume,
                self.config.min_volume
            );
            return false;
        }
        // Strong signals enter outright; plain ones need extra confidence.
        signal.signal.is_strong() || signal.confidence >= self.config.plain_entry_confidence
    }
}

#[async_trait]
impl Strategy for SwingStrategy {
    fn name(&self) -> &str {
        "swing"
    }

    async fn generate_order(
        &self,
        signal: &TradingSignal,
        snapshot: &MarketSnapshot,
        balance: &AccountBalance,
        open_position: Option<&Position>,
    ) -> TradingResult<Option<TradeOrder>> {
        if !passes_base_checks(
            signal,
            self.config.min_signal_strength,
            self.config.min_confidence,
            open_position,
        ) {
            return Ok(None);
        }
        if !self.swing_entry_allowed(signal, snapshot) {
            return Ok(None);
        }

        if signal.entry_price <= 0.0 {
            return Err(TradingError::Signal(format!(
                "{}: non-positive entry price {}",
                signal.symbol, signal.entry_price
            )));
        }

        let side = if signal.signal.is_buy() {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        };

        let stop_loss = fixed_stop_loss(signal.entry_price, side, self.config.stop_loss_pct);
        let take_profit = risk_reward_take_profit(
            signal.entry_price,
            stop_loss,
            side,
            self.config.reward_ratio,
        );
        let size = self.sizer.calculate(
            balance.available,
            signal.entry_price,
            stop_loss,
            side,
            self.config.risk_per_trade_pct,
        )?;

        let mut metadata = HashMap::new();
        metadata.insert("strategy".to_string(), self.name().to_string());
        metadata.insert("signal_strength".to_string(), format!("{:.4}", signal.strength));
        metadata.insert("confidence".to_string(), format!("{:.4}", signal.confidence));
        metadata.insert("risk_amount".to_string(), format!("{:.2}", size.risk_amount));
        metadata.insert(
            "risk_percentage".to_string(),
            format!("{:.2}", size.risk_percentage),
        );
        metadata.insert(
            "estimated_hold_days".to_string(),
            Self::estimated_hold_days(signal.strength).to_string(),
        );
        metadata.insert("market_conditions".to_string(), snapshot.trend.to_string());

        log::info!(
            "{}: swing entry {} size {:.6} @ {:.2} stop {:.2} target {:.2}",
            signal.symbol,
            side,
            size.base_size,
            signal.entry_price,
            stop_loss,
            take_profit
        );

        Ok(Some(TradeOrder {
            symbol: signal.symbol.clone(),
            side,
            kind: OrderKind::Limit,
            size: size.base_size,
            limit_price: Some(signal.entry_price),
            stop_loss: Some(stop_loss),
            take_profit: Some(take_profit),
            client_order_id: None,
            metadata,
        }))
    }

    /// Exit checks in priority order: hard stop, target, stale position,
    /// trend reversal, then the trailing stop.
    fn should_close(&self, position: &Position, snapshot: &MarketSnapshot) -> Option<CloseReason> {
        let price = snapshot.price;

        if let Some(stop) = position.stop_loss {
            let hit = match position.side {
                OrderSide::Buy => price <= stop,
                OrderSide::Sell => price >= stop,
            };
            if hit {
                return Some(CloseReason::StopLoss);
            }
        }

        if let Some(target) = position.take_profit {
            let hit = match position.side {
                OrderSide::Buy => price >= target,
                OrderSide::Sell => price <= target,
            };
            if hit {
                return Some(CloseReason::TakeProfit);
            }
        }

        let age = snapshot.timestamp - position.opened_at;
        if age >= Duration::days(self.config.max_hold_days) {
            return Some(CloseReason::MaxHoldTime);
        }

        let reversed = match position.side {
            OrderSide::Buy => snapshot.trend == crate::domain::models::TrendDirection::Bearish,
            OrderSide::Sell => snapshot.trend == crate::domain::models::TrendDirection::Bullish,
        };
        if reversed {
            return Some(CloseReason::TrendReversal);
        }

        let retrace = self.config.trailing_stop_pct / 100.0;
        match position.side {
            OrderSide::Buy => {
                if let Some(peak) = position.peak_price {
                    if price <= peak * (1.0 - retrace) {
                        return Some(CloseReason::TrailingStop);
                    }
                }
            }
            OrderSide::Sell => {
                if let Some(valley) = position.valley_price {
                    if price >= valley * (1.0 + retrace) {
                        return Some(CloseReason::TrailingStop);
                    }
                }
            }
        }

        None
    }

    fn adjust_stops(&self, position: &mut Position) {
        if let Some(stop) = position.stop_loss {
            position.stop_loss = Some(trail_stop_loss(
                stop,
                position.current_price,
                position.side,
                self.config.trailing_stop_pct,
            ));
        }
    }
}
