// src/risk/mod.rs
//
// Position sizing, stop-loss / take-profit placement and pre-trade
// validation. All math runs on f64 the same way the analysis layer does;
// amounts are converted back to Decimal at the exchange boundary.
use crate::domain::errors::{TradingError, TradingResult};
use crate::domain::models::{OrderSide, PositionSize, RiskLimits};

const KELLY_CAP: f64 = 0.25;

pub struct PositionSizer {
    limits: RiskLimits,
}

impl PositionSizer {
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Size a position from account balance, entry, stop distance and the
    /// percentage of the account to risk.
    ///
    /// The stop must sit on the losing side of the entry for the chosen
    /// side. The base size is clamped to the configured bounds, and if the
    /// notional exceeds the balance the whole position is scaled down to
    /// what the account can actually fund.
    pub fn calculate(
        &self,
        balance: f64,
        entry_price: f64,
        stop_loss_price: f64,
        side: OrderSide,
        risk_pct: f64,
    ) -> TradingResult<PositionSize> {
        if balance <= 0.0 {
            return Err(TradingError::RiskManagement(format!(
                "account balance must be positive, got {balance}"
            )));
        }
        if entry_price <= 0.0 {
            return Err(TradingError::RiskManagement(format!(
                "entry price must be positive, got {entry_price}"
            )));
        }
        match side {
            OrderSide::Buy if stop_loss_price >= entry_price => {
                return Err(TradingError::RiskManagement(format!(
                    "stop loss {stop_loss_price} must be below entry {entry_price} for a long"
                )));
            }
            OrderSide::Sell if stop_loss_price <= entry_price => {
                return Err(TradingError::RiskManagement(format!(
                    "stop loss {stop_loss_price} must be above entry {entry_price} for a short"
                )));
            }
            _ => {}
        }

        let mut risk_amount = balance * risk_pct / 100.0;
        let risk_per_unit = (entry_price - stop_loss_price).abs();

        let mut base_size = (risk_amount / risk_per_unit)
            .clamp(self.limits.min_position_size, self.limits.max_position_size);
        let mut quote_size = base_size * entry_price;
        let mut risk_percentage = risk_pct;

        // Never commit more notional than the account holds.
        if quote_size > balance {
            base_size = balance / entry_price;
            quote_size = balance;
            risk_amount = base_size * risk_per_unit;
            risk_percentage = risk_amount / balance * 100.0;
        }

        Ok(PositionSize {
            base_size,
            quote_size,
            risk_amount,
            risk_percentage,
            stop_loss_price,
        })
    }

    /// Kelly criterion fraction as a percentage of the account, capped at
    /// a quarter of the balance. `win_rate` is a probability in [0, 1].
    pub fn kelly_fraction(
        &self,
        win_rate: f64,
        avg_win: f64,
        avg_loss: f64,
    ) -> TradingResult<f64> {
        if avg_loss <= 0.0 {
            return Err(TradingError::RiskManagement(format!(
                "average loss must be positive, got {avg_loss}"
            )));
        }
        if !(0.0..=1.0).contains(&win_rate) {
            return Err(TradingError::RiskManagement(format!(
                "win rate must be in [0, 1], got {win_rate}"
            )));
        }

        let b = avg_win / avg_loss;
        let q = 1.0 - win_rate;
        let fraction = ((b * win_rate - q) / b).clamp(0.0, KELLY_CAP);
        Ok(fraction * 100.0)
    }
}

/// Fixed-percentage stop below a long entry, above a short entry.
pub fn fixed_stop_loss(entry_price: f64, side: OrderSide, stop_pct: f64) -> f64 {
    match side {
        OrderSide::Buy => entry_price * (1.0 - stop_pct / 100.0),
        OrderSide::Sell => entry_price * (1.0 + stop_pct / 100.0),
    }
}

/// Fixed-percentage target above a long entry, below a short entry.
pub fn fixed_take_profit(entry_price: f64, side: OrderSide, take_pct: f64) -> f64 {
    match side {
        OrderSide::Buy => entry_price * (1.0 + take_pct / 100.0),
        OrderSide::Sell => entry_price * (1.0 - take_pct / 100.0),
    }
}

/// Volatility-scaled stop: one ATR multiple away on the losing side.
pub fn atr_stop_loss(entry_price: f64, side: OrderSide, atr: f64, multiplier: f64) -> f64 {
    match side {
        OrderSide::Buy => entry_price - atr * multiplier,
        OrderSide::Sell => entry_price + atr * multiplier,
    }
}

/// Take-profit at a multiple of the stop distance.
pub fn risk_reward_take_profit(
    entry_price: f64,
    stop_loss_price: f64,
    side: OrderSide,
    reward_ratio: f64,
) -> f64 {
    let risk = (entry_price - stop_loss_price).abs();
    match side {
        OrderSide::Buy => entry_price + risk * reward_ratio,
        OrderSide::Sell => entry_price - risk * reward_ratio,
    }
}

/// Ladder of take-profit levels with the exit size split evenly across
/// them, up to `max_pct` per cent total profit target.
pub fn scaled_take_profits(
    entry_price: f64,
    side: OrderSide,
    levels: usize,
    max_pct: f64,
) -> Vec<(f64, f64)> {
    if levels == 0 {
        return Vec::new();
    }
    let fraction = 1.0 / levels as f64;
    (1..=levels)
        .map(|i| {
            let pct = max_pct * i as f64 / levels as f64;
            let price = match side {
                OrderSide::Buy => entry_price * (1.0 + pct / 100.0),
                OrderSide::Sell => entry_price * (1.0 - pct / 100.0),
            };
            (price, fraction)
        })
        .collect()
}

/// Ratchet a trailing stop toward the current price. The stop only ever
/// tightens: up for longs, down for shorts.
pub fn trail_stop_loss(
    current_stop: f64,
    current_price: f64,
    side: OrderSide,
    trailing_pct: f64,
) -> f64 {
    match side {
        OrderSide::Buy => current_stop.max(current_price * (1.0 - trailing_pct / 100.0)),
        OrderSide::Sell => current_stop.min(current_price * (1.0 + trailing_pct / 100.0)),
    }
}

/// Pre-trade gate over account-wide limits, checked in order: position
/// count, size bounds, funding, then the daily-loss circuit breaker.
pub struct RiskManager {
    limits: RiskLimits,
}

impl RiskManager {
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub fn validate_trade(
        &self,
        base_size: f64,
        entry_price: f64,
        open_positions: usize,
        available_balance: f64,
        daily_pnl: f64,
    ) -> TradingResult<()> {
        if open_positions >= self.limits.max_positions {
            return Err(TradingError::RiskManagement(format!(
                "maximum concurrent positions reached ({})",
                self.limits.max_positions
            )));
        }
        if base_size < self.limits.min_position_size {
            return Err(TradingError::RiskManagement(format!(
                "position size {base_size} below minimum {}",
                self.limits.min_position_size
            )));
        }
        if base_size > self.limits.max_position_size {
            return Err(TradingError::RiskManagement(format!(
                "position size {base_size} above maximum {}",
                self.limits.max_position_size
            )));
        }
        if base_size * entry_price > available_balance {
            return Err(TradingError::RiskManagement(format!(
                "insufficient balance: need {}, have {available_balance}",
                base_size * entry_price
            )));
        }

        let max_daily_loss = available_balance * self.limits.max_daily_loss_pct / 100.0;
        if daily_pnl < -max_daily_loss {
            return Err(TradingError::RiskManagement(format!(
                "daily loss limit breached: pnl {daily_pnl}, limit -{max_daily_loss}"
            )));
        }

        Ok(())
    }
}
