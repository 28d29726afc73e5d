// src/main.rs
use trend_trader::config::Config;
use trend_trader::domain::errors::{AppError, AppResult};
use trend_trader::exchange::client::RetryingClient;
use trend_trader::exchange::paper::PaperExchange;
use trend_trader::exchange::rate_limit::RateLimiter;
use trend_trader::notify::ConsoleNotifier;
use trend_trader::strategy::swing::SwingStrategy;
use trend_trader::TradingBot;

use std::sync::Arc;
use tokio::signal::ctrl_c;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    config.init_logging()?;

    log::info!("Starting trend_trader v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using {} exchange", config.exchange.name);

    if !config.exchange.dry_run {
        return Err(AppError::Config(
            "live order routing is not wired up yet; set DRY_RUN=true".to_string(),
        ));
    }

    // Dry-run exchange behind the shared throttle and retry policy
    let limiter = Arc::new(RateLimiter::new(config.rate_caps()));
    let paper = PaperExchange::new(config.trading.initial_balance, &config.trading.currency);
    let exchange = Arc::new(RetryingClient::new(paper, limiter, config.retry_config()));

    let strategy = Arc::new(SwingStrategy::new(
        config.swing_config(),
        config.risk_limits(),
    ));
    let notifier = Arc::new(ConsoleNotifier);

    // Shutdown is signalled once; the in-flight cycle completes first
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if ctrl_c().await.is_ok() {
            log::info!("Ctrl+C received, requesting shutdown");
            let _ = shutdown_tx.send(true);
        }
    });

    let mut bot = TradingBot::new(config, exchange, strategy, notifier, shutdown_rx);
    bot.run().await?;

    let metrics = bot.portfolio().metrics();
    log::info!(
        "session complete: {} trades, win rate {:.1}%, realized pnl {:+.2}",
        metrics.total_trades,
        metrics.win_rate,
        metrics.realized_pnl
    );

    log::info!("Shutdown complete. Goodbye!");
    Ok(())
}
