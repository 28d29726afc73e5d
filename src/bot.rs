// src/bot.rs
//
// Orchestration loop: fetch market data, refresh open positions, run
// exits, then evaluate entries, one cycle per update interval. Errors on
// a single symbol never abort the whole cycle; only authentication
// failures terminate the session.
use crate::analysis::trend::TrendAnalyzer;
use crate::config::Config;
use crate::domain::errors::{AppError, AppResult, ExchangeError};
use crate::domain::models::{
    CloseReason, MarketSnapshot, OrderKind, Position, PriceHistory, TradeOrder, TradingSignal,
};
use crate::exchange::client::ExchangeClient;
use crate::notify::{compose_close_notification, compose_signal_notification, Notifier};
use crate::portfolio::Portfolio;
use crate::risk::RiskManager;
use crate::strategy::Strategy;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Candles fetched per cycle; enough lookback for the slowest indicator.
const HISTORY_CANDLES: i64 = 120;

pub struct TradingBot<C: ExchangeClient + 'static> {
    config: Config,
    exchange: Arc<C>,
    analyzer: TrendAnalyzer,
    strategy: Arc<dyn Strategy>,
    risk: RiskManager,
    portfolio: Portfolio,
    notifier: Arc<dyn Notifier>,
    shutdown: tokio::sync::watch::Receiver<bool>,
    current_date: NaiveDate,
    cycle_count: u64,
}

impl<C: ExchangeClient + 'static> TradingBot<C> {
    pub fn new(
        config: Config,
        exchange: Arc<C>,
        strategy: Arc<dyn Strategy>,
        notifier: Arc<dyn Notifier>,
        shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Self {
        let analyzer = TrendAnalyzer::new(config.indicator_params());
        let risk = RiskManager::new(config.risk_limits());
        let portfolio = Portfolio::new(config.trading.initial_balance, &config.trading.currency);
        Self {
            config,
            exchange,
            analyzer,
            strategy,
            risk,
            portfolio,
            notifier,
            shutdown,
            current_date: Utc::now().date_naive(),
            cycle_count: 0,
        }
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    /// Main loop: one cycle per update interval until shutdown is
    /// signalled. The in-flight cycle always completes.
    pub async fn run(&mut self) -> AppResult<()> {
        log::info!(
            "starting trading loop: {} symbols, {}s interval, dry_run={}",
            self.config.trading.symbols.len(),
            self.config.trading.update_interval_secs,
            self.config.exchange.dry_run
        );

        loop {
            if *self.shutdown.borrow() {
                log::info!("shutdown requested, stopping loop");
                break;
            }

            if let Err(err) = self.run_cycle().await {
                match &err {
                    AppError::Exchange(ExchangeError::Authentication(_)) => {
                        log::error!("authentication failure, terminating session: {err}");
                        return Err(err);
                    }
                    _ => log::error!("cycle failed: {err}"),
                }
            }

            let interval = Duration::from_secs(self.config.trading.update_interval_secs);
            let mut shutdown = self.shutdown.clone();
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {}
            }
        }
        Ok(())
    }

    /// One full trading cycle over all configured symbols.
    pub async fn run_cycle(&mut self) -> AppResult<()> {
        self.cycle_count += 1;
        self.roll_daily_if_needed();

        let histories = self.fetch_all_histories().await;
        if histories.is_empty() {
            log::warn!("no market data this cycle");
            return Ok(());
        }

        self.refresh_positions(&histories);
        self.process_exits(&histories).await?;
        self.process_entries(&histories).await?;
        self.maybe_save_snapshot();
        Ok(())
    }

    fn roll_daily_if_needed(&mut self) {
        let today = Utc::now().date_naive();
        if today != self.current_date {
            self.portfolio.roll_daily(self.current_date);
            self.current_date = today;
        }
    }

    /// Concurrent candle fetch across symbols. Per-symbol failures are
    /// logged and dropped; the batch never aborts.
    async fn fetch_all_histories(&self) -> HashMap<String, PriceHistory> {
        let granularity = self.config.granularity();
        let end = Utc::now();
        let start = end - ChronoDuration::seconds(HISTORY_CANDLES * granularity.seconds());

        let mut tasks = JoinSet::new();
        for symbol in &self.config.trading.symbols {
            let exchange = self.exchange.clone();
            let symbol = symbol.clone();
            tasks.spawn(async move {
                let result = exchange.fetch_candles(&symbol, start, end, granularity).await;
                (symbol, result)
            });
        }

        let mut histories = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((symbol, Ok(candles))) => {
                    if candles.is_empty() {
                        log::warn!("{symbol}: empty candle response");
                    } else {
                        histories.insert(symbol.clone(), PriceHistory::new(&symbol, candles));
                    }
                }
                Ok((symbol, Err(err))) => {
                    log::warn!("{symbol}: candle fetch failed: {err}");
                }
                Err(err) => log::warn!("candle fetch task panicked: {err}"),
            }
        }
        histories
    }

    /// Mark open positions to the latest close and ratchet their stops.
    fn refresh_positions(&mut self, histories: &HashMap<String, PriceHistory>) {
        let mut prices = HashMap::new();
        for (symbol, history) in histories {
            if let Some(close) = history.latest_close() {
                prices.insert(symbol.clone(), close);
            }
        }
        self.portfolio.update_prices(&prices);

        for symbol in self.portfolio.open_symbols() {
            if let Some(position) = self.portfolio.position_mut(&symbol) {
                self.strategy.adjust_stops(position);
            }
        }
    }

    async fn process_exits(
        &mut self,
        histories: &HashMap<String, PriceHistory>,
    ) -> AppResult<()> {
        for symbol in self.portfolio.open_symbols() {
            let history = match histories.get(&symbol) {
                Some(h) => h,
                None => continue,
            };
            let snapshot = match self.snapshot_for(history) {
                Some(s) => s,
                None => continue,
            };

            let reason = {
                let position = match self.portfolio.position(&symbol) {
                    Some(p) => p,
                    None => continue,
                };
                match self.strategy.should_close(position, &snapshot) {
                    Some(r) => r,
                    None => continue,
                }
            };

            if let Err(err) = self.close_position(&symbol, snapshot.price, reason).await {
                log::error!("{symbol}: close failed: {err}");
            }
        }
        Ok(())
    }

    async fn close_position(
        &mut self,
        symbol: &str,
        exit_price: f64,
        reason: CloseReason,
    ) -> AppResult<()> {
        let position = self
            .portfolio
            .position(symbol)
            .ok_or_else(|| {
                AppError::Trading(crate::domain::errors::TradingError::PositionNotFound(
                    symbol.to_string(),
                ))
            })?
            .clone();

        let fill_price = if self.config.exchange.dry_run {
            exit_price
        } else {
            let order = TradeOrder {
                symbol: symbol.to_string(),
                side: position.side.opposite(),
                kind: OrderKind::Market,
                size: position.size,
                limit_price: None,
                stop_loss: None,
                take_profit: None,
                client_order_id: None,
                metadata: HashMap::new(),
            };
            self.exchange
                .place_order(&order)
                .await
                .map_err(AppError::Exchange)?
                .fill_price
        };

        let record = self
            .portfolio
            .close_position(symbol, fill_price, reason, self.strategy.name())
            .map_err(AppError::Trading)?;

        let (message, payload) =
            compose_close_notification(symbol, reason, fill_price, record.pnl);
        if let Err(err) = self.notifier.notify(&message, payload).await {
            log::warn!("close notification failed: {err}");
        }
        Ok(())
    }

    async fn process_entries(
        &mut self,
        histories: &HashMap<String, PriceHistory>,
    ) -> AppResult<()> {
        for (symbol, history) in histories {
            let analysis = match self.analyzer.analyze(history) {
                Ok(a) => a,
                Err(err) => {
                    log::debug!("{symbol}: analysis skipped: {err}");
                    continue;
                }
            };

            let snapshot = MarketSnapshot {
                symbol: symbol.clone(),
                price: history.latest_close().unwrap_or_default(),
                volume: history.latest_volume().unwrap_or_default(),
                trend: analysis.trend,
                timestamp: Utc::now(),
            };
            if snapshot.price <= 0.0 {
                continue;
            }

            let signal = TradingSignal {
                symbol: symbol.clone(),
                signal: analysis.signal,
                strength: analysis.signal_strength,
                confidence: analysis.confidence,
                entry_price: snapshot.price,
                stop_loss: None,
                take_profit: None,
                timestamp: analysis.timestamp,
                metadata: HashMap::new(),
            };

            let order = match self
                .strategy
                .generate_order(
                    &signal,
                    &snapshot,
                    self.portfolio.balance(),
                    self.portfolio.position(symbol),
                )
                .await
            {
                Ok(Some(order)) => order,
                Ok(None) => continue,
                Err(err) => {
                    log::warn!("{symbol}: strategy declined with error: {err}");
                    continue;
                }
            };

            if let Err(err) = self.risk.validate_trade(
                order.size,
                snapshot.price,
                self.portfolio.open_position_count(),
                self.portfolio.balance().available,
                self.portfolio.daily_pnl(),
            ) {
                log::info!("{symbol}: trade rejected by risk checks: {err}");
                continue;
            }

            if let Err(err) = self.execute_entry(&signal, &order).await {
                match &err {
                    AppError::Exchange(ExchangeError::Authentication(_)) => return Err(err),
                    _ => log::error!("{symbol}: entry failed: {err}"),
                }
            }
        }
        Ok(())
    }

    async fn execute_entry(&mut self, signal: &TradingSignal, order: &TradeOrder) -> AppResult<()> {
        let confirmation = self
            .exchange
            .place_order(order)
            .await
            .map_err(AppError::Exchange)?;

        let mut position = Position::new(
            &order.symbol,
            order.side,
            confirmation.filled_size,
            confirmation.fill_price,
            confirmation.timestamp,
        );
        position.stop_loss = order.stop_loss;
        position.take_profit = order.take_profit;
        position.order_id = Some(confirmation.order_id.clone());
        position.update_price(confirmation.fill_price);

        self.portfolio
            .open_position(position)
            .map_err(AppError::Trading)?;

        let (message, payload) = compose_signal_notification(signal, order);
        if let Err(err) = self.notifier.notify(&message, payload).await {
            log::warn!("entry notification failed: {err}");
        }
        Ok(())
    }

    /// Liquidate every open position at its last mark price. Called
    /// explicitly, never as part of shutdown.
    pub async fn close_all_positions(&mut self) -> AppResult<()> {
        for symbol in self.portfolio.open_symbols() {
            let price = match self.portfolio.position(&symbol) {
                Some(p) => p.current_price,
                None => continue,
            };
            if let Err(err) = self.close_position(&symbol, price, CloseReason::Manual).await {
                log::error!("{symbol}: liquidation failed: {err}");
            }
        }
        Ok(())
    }

    fn snapshot_for(&self, history: &PriceHistory) -> Option<MarketSnapshot> {
        let price = history.latest_close()?;
        if price <= 0.0 {
            return None;
        }
        // Exits run before (and independently of) trend analysis, which
        // may fail on short histories.
        let trend = self
            .analyzer
            .analyze(history)
            .map(|a| a.trend)
            .unwrap_or(crate::domain::models::TrendDirection::Sideways);
        Some(MarketSnapshot {
            symbol: history.symbol.clone(),
            price,
            volume: history.latest_volume().unwrap_or_default(),
            trend,
            timestamp: Utc::now(),
        })
    }

    fn maybe_save_snapshot(&self) {
        let every = self.config.trading.snapshot_every_cycles;
        if every == 0 || self.cycle_count % every != 0 {
            return;
        }
        let dir = PathBuf::from(&self.config.trading.snapshot_dir);
        if let Err(err) = self.portfolio.save_snapshot(&dir) {
            log::warn!("snapshot save failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Candle, OrderSide};
    use crate::exchange::paper::PaperExchange;
    use crate::notify::ConsoleNotifier;
    use crate::strategy::swing::{SwingConfig, SwingStrategy};
    use rust_decimal::prelude::FromPrimitive;
    use rust_decimal::Decimal;

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        let start = Utc::now() - ChronoDuration::hours(closes.len() as i64);
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let price = Decimal::from_f64(c).unwrap();
                Candle {
                    start: start + ChronoDuration::hours(i as i64),
                    open: price,
                    high: price,
                    low: price,
                    close: price,
                    volume: Decimal::from_f64(5_000_000.0).unwrap(),
                }
            })
            .collect()
    }

    fn test_bot(exchange: Arc<PaperExchange>) -> TradingBot<PaperExchange> {
        let mut config = Config::default();
        config.trading.symbols = vec!["BTC-USD".to_string()];
        config.trading.snapshot_every_cycles = 0;
        let strategy = Arc::new(SwingStrategy::new(
            SwingConfig::default(),
            config.risk_limits(),
        ));
        let (_tx, rx) = tokio::sync::watch::channel(false);
        TradingBot::new(config, exchange, strategy, Arc::new(ConsoleNotifier), rx)
    }

    #[tokio::test]
    async fn cycle_survives_missing_market_data() {
        let exchange = Arc::new(PaperExchange::new(10_000.0, "USD"));
        let mut bot = test_bot(exchange);
        // No candles loaded at all; the cycle logs and carries on.
        assert!(bot.run_cycle().await.is_ok());
        assert_eq!(bot.portfolio().open_position_count(), 0);
    }

    #[tokio::test]
    async fn take_profit_exit_closes_through_the_ledger() {
        let exchange = Arc::new(PaperExchange::new(10_000.0, "USD"));
        // Price has moved well past the target.
        exchange.load_candles("BTC-USD", candles_from_closes(&[54_000.0; 30]));
        let mut bot = test_bot(exchange);

        let mut position = Position::new("BTC-USD", OrderSide::Buy, 0.1, 50_000.0, Utc::now());
        position.stop_loss = Some(48_500.0);
        position.take_profit = Some(53_750.0);
        position.update_price(50_000.0);
        bot.portfolio.open_position(position).unwrap();

        bot.run_cycle().await.unwrap();

        assert_eq!(bot.portfolio().open_position_count(), 0);
        let metrics = bot.portfolio().metrics();
        assert_eq!(metrics.winning_trades, 1);
        assert!((metrics.realized_pnl - 400.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn close_all_liquidates_at_mark() {
        let exchange = Arc::new(PaperExchange::new(10_000.0, "USD"));
        let mut bot = test_bot(exchange);

        let mut position = Position::new("BTC-USD", OrderSide::Buy, 0.1, 50_000.0, Utc::now());
        position.update_price(51_000.0);
        bot.portfolio.open_position(position).unwrap();

        bot.close_all_positions().await.unwrap();
        assert_eq!(bot.portfolio().open_position_count(), 0);
        assert!((bot.portfolio().metrics().realized_pnl - 100.0).abs() < 1e-6);
    }
}
