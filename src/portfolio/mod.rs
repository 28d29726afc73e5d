// src/portfolio/mod.rs
//
// In-memory ledger: cash and reserved balances, open positions, the
// closed-trade log and derived performance metrics. All mutations either
// complete fully or leave the ledger untouched.
use crate::domain::errors::{AppResult, TradingError, TradingResult};
use crate::domain::models::{
    AccountBalance, CloseReason, PortfolioMetrics, Position, TradeRecord,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Serializable point-in-time view of the whole ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub account_balance: AccountBalance,
    pub positions: Vec<Position>,
    pub metrics: PortfolioMetrics,
    pub trade_history: Vec<TradeRecord>,
    pub daily_pnl_history: Vec<(NaiveDate, f64)>,
    pub balance_history: Vec<(NaiveDate, f64)>,
}

pub struct Portfolio {
    balance: AccountBalance,
    positions: HashMap<String, Position>,
    trade_history: Vec<TradeRecord>,
    daily_pnl: f64,
    realized_pnl: f64,
    winning_trades: usize,
    losing_trades: usize,
    peak_value: f64,
    max_drawdown: f64,
    daily_pnl_history: Vec<(NaiveDate, f64)>,
    balance_history: Vec<(NaiveDate, f64)>,
}

impl Portfolio {
    pub fn new(initial_balance: f64, currency: &str) -> Self {
        Self {
            balance: AccountBalance::new(initial_balance, currency),
            positions: HashMap::new(),
            trade_history: Vec::new(),
            daily_pnl: 0.0,
            realized_pnl: 0.0,
            winning_trades: 0,
            losing_trades: 0,
            peak_value: initial_balance,
            max_drawdown: 0.0,
            daily_pnl_history: Vec::new(),
            balance_history: Vec::new(),
        }
    }

    pub fn balance(&self) -> &AccountBalance {
        &self.balance
    }

    pub fn daily_pnl(&self) -> f64 {
        self.daily_pnl
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn position_mut(&mut self, symbol: &str) -> Option<&mut Position> {
        self.positions.get_mut(symbol)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn open_position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn open_symbols(&self) -> Vec<String> {
        self.positions.keys().cloned().collect()
    }

    /// Reserve the position's notional and register it. Fails without
    /// side effects when the cash balance cannot cover it.
    pub fn open_position(&mut self, position: Position) -> TradingResult<()> {
        let notional = position.notional();
        if notional > self.balance.available {
            return Err(TradingError::InsufficientFunds {
                required: notional,
                available: self.balance.available,
            });
        }

        self.balance.available -= notional;
        self.balance.reserved += notional;
        self.balance.last_updated = Utc::now();

        log::info!(
            "{}: opened {} {:.6} @ {:.2}, reserved {:.2}",
            position.symbol,
            position.side,
            position.size,
            position.entry_price,
            notional
        );
        self.positions.insert(position.symbol.clone(), position);
        Ok(())
    }

    /// Settle a position at the exit price: release the reservation, book
    /// the realized pnl and append the trade record.
    pub fn close_position(
        &mut self,
        symbol: &str,
        exit_price: f64,
        reason: CloseReason,
        strategy: &str,
    ) -> TradingResult<TradeRecord> {
        let position = self
            .positions
            .remove(symbol)
            .ok_or_else(|| TradingError::PositionNotFound(symbol.to_string()))?;

        let pnl = match position.side {
            crate::domain::models::OrderSide::Buy => {
                (exit_price - position.entry_price) * position.size
            }
            crate::domain::models::OrderSide::Sell => {
                (position.entry_price - exit_price) * position.size
            }
        };

        self.balance.available += position.size * exit_price;
        self.balance.reserved -= position.size * position.entry_price;
        self.balance.total += pnl;
        self.balance.last_updated = Utc::now();

        self.realized_pnl += pnl;
        self.daily_pnl += pnl;
        if pnl > 0.0 {
            self.winning_trades += 1;
        } else {
            self.losing_trades += 1;
        }

        // Drawdown runs on settled equity; the running peak never falls.
        self.peak_value = self.peak_value.max(self.balance.total);
        if self.peak_value > 0.0 {
            self.max_drawdown = self
                .max_drawdown
                .max((self.peak_value - self.balance.total) / self.peak_value);
        }

        let record = TradeRecord {
            symbol: position.symbol.clone(),
            side: position.side,
            entry_price: position.entry_price,
            exit_price,
            size: position.size,
            pnl,
            entry_time: position.opened_at,
            exit_time: Utc::now(),
            strategy: strategy.to_string(),
            reason,
        };

        log::info!(
            "{}: closed {} @ {:.2} ({}), pnl {:+.2}",
            symbol,
            position.side,
            exit_price,
            reason,
            pnl
        );
        self.trade_history.push(record.clone());
        Ok(record)
    }

    /// Refresh mark prices and unrealized pnl; no balance movement.
    pub fn update_prices(&mut self, prices: &HashMap<String, f64>) {
        for (symbol, price) in prices {
            if let Some(position) = self.positions.get_mut(symbol) {
                position.update_price(*price);
            }
        }
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.positions.values().map(|p| p.unrealized_pnl).sum()
    }

    /// Derived performance aggregate; recomputed from the trade log on
    /// every call.
    pub fn metrics(&self) -> PortfolioMetrics {
        let total_trades = self.trade_history.len();
        let win_rate = if total_trades > 0 {
            self.winning_trades as f64 / total_trades as f64 * 100.0
        } else {
            0.0
        };

        let wins: Vec<f64> = self
            .trade_history
            .iter()
            .filter(|t| t.pnl > 0.0)
            .map(|t| t.pnl)
            .collect();
        let losses: Vec<f64> = self
            .trade_history
            .iter()
            .filter(|t| t.pnl <= 0.0)
            .map(|t| t.pnl)
            .collect();

        let avg_win = mean(&wins);
        let avg_loss = mean(&losses);
        let largest_win = wins.iter().cloned().fold(0.0, f64::max);
        let largest_loss = losses.iter().cloned().fold(0.0, f64::min);

        let gross_profit: f64 = wins.iter().sum();
        let gross_loss: f64 = losses.iter().map(|l| l.abs()).sum();
        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else {
            0.0
        };

        PortfolioMetrics {
            total_value: self.balance.total + self.unrealized_pnl(),
            unrealized_pnl: self.unrealized_pnl(),
            realized_pnl: self.realized_pnl,
            total_pnl: self.realized_pnl + self.unrealized_pnl(),
            daily_pnl: self.daily_pnl,
            win_rate,
            sharpe_ratio: self.sharpe_ratio(),
            max_drawdown: self.max_drawdown * 100.0,
            total_trades,
            winning_trades: self.winning_trades,
            losing_trades: self.losing_trades,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
            profit_factor,
        }
    }

    /// Sharpe over the archived daily pnl series; zero until two days of
    /// history exist or when returns are flat.
    fn sharpe_ratio(&self) -> f64 {
        let returns: Vec<f64> = self.daily_pnl_history.iter().map(|(_, p)| *p).collect();
        if returns.len() < 2 {
            return 0.0;
        }
        let mean_return = mean(&returns);
        let variance = returns
            .iter()
            .map(|r| (r - mean_return).powi(2))
            .sum::<f64>()
            / (returns.len() as f64 - 1.0);
        let std_dev = variance.sqrt();
        if std_dev > 0.0 {
            mean_return / std_dev
        } else {
            0.0
        }
    }

    /// Archive the finished day and reset the daily counter.
    pub fn roll_daily(&mut self, date: NaiveDate) {
        self.daily_pnl_history.push((date, self.daily_pnl));
        self.balance_history.push((date, self.balance.total));
        log::info!(
            "daily rollover {date}: pnl {:+.2}, balance {:.2}",
            self.daily_pnl,
            self.balance.total
        );
        self.daily_pnl = 0.0;
    }

    pub fn snapshot(&self) -> PortfolioSnapshot {
        PortfolioSnapshot {
            account_balance: self.balance.clone(),
            positions: self.positions.values().cloned().collect(),
            metrics: self.metrics(),
            trade_history: self.trade_history.clone(),
            daily_pnl_history: self.daily_pnl_history.clone(),
            balance_history: self.balance_history.clone(),
        }
    }

    /// Write a timestamped snapshot file. Diagnostic output only; never
    /// read back.
    pub fn save_snapshot(&self, dir: &Path) -> AppResult<std::path::PathBuf> {
        std::fs::create_dir_all(dir)?;
        let filename = format!("portfolio_{}.json", Utc::now().format("%Y%m%d_%H%M%S"));
        let path = dir.join(filename);
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        std::fs::write(&path, json)?;
        log::debug!("portfolio snapshot written to {}", path.display());
        Ok(path)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
