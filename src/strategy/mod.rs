// src/strategy/mod.rs
pub mod swing;

use crate::domain::errors::TradingResult;
use crate::domain::models::{
    AccountBalance, CloseReason, MarketSnapshot, Position, TradeOrder, TradingSignal,
};
use async_trait::async_trait;

/// Decision seam between analysis and execution. Implementations turn a
/// fused signal into an order (or decline it) and decide when an open
/// position has run its course.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Evaluate an entry. `None` means the strategy declines the signal;
    /// errors are reserved for malformed inputs.
    async fn generate_order(
        &self,
        signal: &TradingSignal,
        snapshot: &MarketSnapshot,
        balance: &AccountBalance,
        open_position: Option<&Position>,
    ) -> TradingResult<Option<TradeOrder>>;

    /// Exit check, pure over the position and the latest market view.
    fn should_close(&self, position: &Position, snapshot: &MarketSnapshot) -> Option<CloseReason>;

    /// Ratchet protective stops after a price update. Default is a no-op
    /// for strategies without trailing logic.
    fn adjust_stops(&self, _position: &mut Position) {}
}

/// Entry conditions shared by every strategy: a strong enough signal,
/// acceptable confidence and no position already open for the symbol.
pub fn passes_base_checks(
    signal: &TradingSignal,
    min_strength: f64,
    min_confidence: f64,
    open_position: Option<&Position>,
) -> bool {
    if open_position.is_some() {
        log::debug!(
            "{}: skipping signal, position already open",
            signal.symbol
        );
        return false;
    }
    if signal.strength < min_strength {
        log::debug!(
            "{}: signal strength {:.2} below threshold {:.2}",
            signal.symbol,
            signal.strength,
            min_strength
        );
        return false;
    }
    if signal.confidence < min_confidence {
        log::debug!(
            "{}: confidence {:.2} below threshold {:.2}",
            signal.symbol,
            signal.confidence,
            min_confidence
        );
        return false;
    }
    true
}
