// src/domain/models.rs
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One OHLCV period as fetched from the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub start: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Chronological candle container; immutable once fetched.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    pub symbol: String,
    pub candles: Vec<Candle>,
}

impl PriceHistory {
    pub fn new(symbol: &str, candles: Vec<Candle>) -> Self {
        Self {
            symbol: symbol.to_string(),
            candles,
        }
    }

    pub fn close_prices(&self) -> Vec<f64> {
        self.candles
            .iter()
            .map(|c| c.close.to_f64().unwrap_or_default())
            .collect()
    }

    pub fn high_prices(&self) -> Vec<f64> {
        self.candles
            .iter()
            .map(|c| c.high.to_f64().unwrap_or_default())
            .collect()
    }

    pub fn low_prices(&self) -> Vec<f64> {
        self.candles
            .iter()
            .map(|c| c.low.to_f64().unwrap_or_default())
            .collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.candles
            .iter()
            .map(|c| c.volume.to_f64().unwrap_or_default())
            .collect()
    }

    pub fn latest_close(&self) -> Option<f64> {
        self.candles.last().map(|c| c.close.to_f64().unwrap_or_default())
    }

    pub fn latest_volume(&self) -> Option<f64> {
        self.candles.last().map(|c| c.volume.to_f64().unwrap_or_default())
    }
}

/// Directional verdict from one indicator or the fused consensus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl SignalKind {
    pub fn is_buy(&self) -> bool {
        matches!(self, SignalKind::Buy | SignalKind::StrongBuy)
    }

    pub fn is_sell(&self) -> bool {
        matches!(self, SignalKind::Sell | SignalKind::StrongSell)
    }

    pub fn is_strong(&self) -> bool {
        matches!(self, SignalKind::StrongBuy | SignalKind::StrongSell)
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SignalKind::StrongBuy => write!(f, "strong_buy"),
            SignalKind::Buy => write!(f, "buy"),
            SignalKind::Hold => write!(f, "hold"),
            SignalKind::Sell => write!(f, "sell"),
            SignalKind::StrongSell => write!(f, "strong_sell"),
        }
    }
}

/// Scalar or named-field indicator output.
#[derive(Debug, Clone)]
pub enum IndicatorValue {
    Scalar(f64),
    Fields(HashMap<String, f64>),
}

impl IndicatorValue {
    pub fn scalar(&self) -> Option<f64> {
        match self {
            IndicatorValue::Scalar(v) => Some(*v),
            IndicatorValue::Fields(_) => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<f64> {
        match self {
            IndicatorValue::Scalar(_) => None,
            IndicatorValue::Fields(m) => m.get(name).copied(),
        }
    }
}

/// Result of one indicator computation over one price snapshot.
#[derive(Debug, Clone)]
pub struct IndicatorReading {
    pub value: IndicatorValue,
    pub signal: SignalKind,
    pub strength: f64,
    pub metadata: HashMap<String, f64>,
}

/// Medium-term directional classification, independent of the fused signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Bullish,
    Bearish,
    Sideways,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TrendDirection::Bullish => write!(f, "bullish"),
            TrendDirection::Bearish => write!(f, "bearish"),
            TrendDirection::Sideways => write!(f, "sideways"),
        }
    }
}

/// One full analysis cycle output for a symbol.
#[derive(Debug, Clone)]
pub struct TrendAnalysis {
    pub trend: TrendDirection,
    pub strength: f64,
    pub signal: SignalKind,
    /// Strength of the fused signal, distinct from the trend strength.
    pub signal_strength: f64,
    pub confidence: f64,
    pub indicators: HashMap<String, IndicatorReading>,
    pub timestamp: DateTime<Utc>,
}

/// Signal handed to the strategy layer; consumed once.
#[derive(Debug, Clone)]
pub struct TradingSignal {
    pub symbol: String,
    pub signal: SignalKind,
    pub strength: f64,
    pub confidence: f64,
    pub entry_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }

    pub fn opposite(&self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    Limit,
}

/// Order produced by a strategy; consumed exactly once by execution.
#[derive(Debug, Clone)]
pub struct TradeOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub size: f64,
    pub limit_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub client_order_id: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Confirmation returned by the execution step.
#[derive(Debug, Clone)]
pub struct OrderConfirmation {
    pub order_id: String,
    pub client_order_id: Option<String>,
    pub fill_price: f64,
    pub filled_size: f64,
    pub timestamp: DateTime<Utc>,
}

/// Open position; current price and unrealized pnl refresh on every tick.
/// Peak/valley track the best price seen since entry for trailing stops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: OrderSide,
    pub size: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub unrealized_pnl: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub peak_price: Option<f64>,
    pub valley_price: Option<f64>,
    pub opened_at: DateTime<Utc>,
    pub order_id: Option<String>,
}

impl Position {
    pub fn new(
        symbol: &str,
        side: OrderSide,
        size: f64,
        entry_price: f64,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            size,
            entry_price,
            current_price: entry_price,
            unrealized_pnl: 0.0,
            stop_loss: None,
            take_profit: None,
            peak_price: None,
            valley_price: None,
            opened_at,
            order_id: None,
        }
    }

    /// Refresh the mark price, unrealized pnl and the trailing peak/valley.
    pub fn update_price(&mut self, price: f64) {
        self.current_price = price;
        self.unrealized_pnl = match self.side {
            OrderSide::Buy => (price - self.entry_price) * self.size,
            OrderSide::Sell => (self.entry_price - price) * self.size,
        };

        match self.side {
            OrderSide::Buy => {
                if self.peak_price.map_or(true, |p| price > p) {
                    self.peak_price = Some(price);
                }
            }
            OrderSide::Sell => {
                if self.valley_price.map_or(true, |v| price < v) {
                    self.valley_price = Some(price);
                }
            }
        }
    }

    pub fn notional(&self) -> f64 {
        self.size * self.entry_price
    }
}

/// Account balances in the quote currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBalance {
    pub total: f64,
    pub available: f64,
    pub reserved: f64,
    pub currency: String,
    pub last_updated: DateTime<Utc>,
}

impl AccountBalance {
    pub fn new(initial: f64, currency: &str) -> Self {
        Self {
            total: initial,
            available: initial,
            reserved: 0.0,
            currency: currency.to_string(),
            last_updated: Utc::now(),
        }
    }
}

/// Reason a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
    MaxHoldTime,
    TrendReversal,
    TrailingStop,
    Manual,
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CloseReason::StopLoss => write!(f, "stop_loss"),
            CloseReason::TakeProfit => write!(f, "take_profit"),
            CloseReason::MaxHoldTime => write!(f, "max_hold_time"),
            CloseReason::TrendReversal => write!(f, "trend_reversal"),
            CloseReason::TrailingStop => write!(f, "trailing_stop"),
            CloseReason::Manual => write!(f, "manual"),
            CloseReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Immutable record of a closed position; append-only log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub side: OrderSide,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    pub pnl: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub strategy: String,
    pub reason: CloseReason,
}

/// Derived portfolio aggregate; recomputed on demand, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub total_value: f64,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
    pub total_pnl: f64,
    pub daily_pnl: f64,
    pub win_rate: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub profit_factor: f64,
}

/// Pure sizing result; never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSize {
    pub base_size: f64,
    pub quote_size: f64,
    pub risk_amount: f64,
    pub risk_percentage: f64,
    pub stop_loss_price: f64,
}

/// Session-constant risk configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_risk_per_trade_pct: f64,
    pub max_daily_loss_pct: f64,
    pub max_positions: usize,
    pub min_position_size: f64,
    pub max_position_size: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_risk_per_trade_pct: 2.0,
            max_daily_loss_pct: 5.0,
            max_positions: 5,
            min_position_size: 0.0001,
            max_position_size: 1000.0,
        }
    }
}

/// Per-symbol market view handed to strategies each cycle.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub price: f64,
    pub volume: f64,
    pub trend: TrendDirection,
    pub timestamp: DateTime<Utc>,
}
