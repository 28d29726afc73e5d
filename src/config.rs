// src/config.rs
use crate::analysis::trend::IndicatorParams;
use crate::domain::errors::{AppError, AppResult};
use crate::domain::models::RiskLimits;
use crate::exchange::client::{Granularity, RetryConfig};
use crate::exchange::rate_limit::RateCaps;
use crate::strategy::swing::SwingConfig;
use dotenv::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Trading bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Exchange API credentials and mode
    pub exchange: ExchangeConfig,

    /// Trading configuration
    pub trading: TradingConfig,

    /// Risk management configuration
    pub risk: RiskConfig,

    /// Indicator parameters
    pub indicators: IndicatorConfig,

    /// Signal thresholds
    pub thresholds: ThresholdConfig,

    /// Request rate caps and retry policy
    pub rate_limits: RateLimitConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Exchange API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Exchange name (e.g., "coinbase")
    pub name: String,

    /// API key; may be empty in dry-run mode
    pub api_key: String,

    /// API secret; may be empty in dry-run mode
    pub api_secret: String,

    /// Simulate fills instead of sending live orders
    pub dry_run: bool,
}

/// Trading configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Trading symbols (e.g., ["BTC-USD", "ETH-USD"])
    pub symbols: Vec<String>,

    /// Candle granularity in seconds
    pub granularity_secs: i64,

    /// Seconds between trading cycles
    pub update_interval_secs: u64,

    /// Starting balance for the paper ledger
    pub initial_balance: f64,

    /// Quote currency
    pub currency: String,

    /// Directory for portfolio snapshot files
    pub snapshot_dir: String,

    /// Cycles between snapshot writes; 0 disables snapshots
    pub snapshot_every_cycles: u64,
}

/// Risk management configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Percent of the account risked per trade
    pub risk_per_trade_pct: f64,

    /// Daily loss circuit breaker, percent of the account
    pub max_daily_loss_pct: f64,

    /// Maximum number of open positions
    pub max_positions: usize,

    /// Position size bounds in base units
    pub min_position_size: f64,
    pub max_position_size: f64,

    /// Swing stop distance, percent from entry
    pub stop_loss_pct: f64,

    /// Fixed take-profit distance, percent from entry
    pub take_profit_pct: f64,

    /// Take-profit distance as a multiple of the stop distance
    pub reward_ratio: f64,

    /// Trailing stop retrace, percent off the best price
    pub trailing_stop_pct: f64,

    /// Maximum holding period in days
    pub max_hold_days: i64,
}

/// Indicator parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bollinger_period: usize,
    pub bollinger_std_dev: f64,
    pub ma_short: usize,
    pub ma_long: usize,
}

/// Signal thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Minimum fused strength to act on a signal
    pub signal_strength: f64,

    /// 24h volume floor for entries
    pub min_volume: f64,
}

/// Request rate caps and retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
    pub retry_attempts: u32,
    pub retry_base_delay_secs: f64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "warn", "error")
    pub level: String,

    /// Log to file
    pub to_file: bool,

    /// Log file path
    pub file_path: Option<String>,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let dry_run = env_or("DRY_RUN", true);
        let api_key = env::var("API_KEY").unwrap_or_default();
        let api_secret = env::var("API_SECRET").unwrap_or_default();
        if !dry_run && (api_key.is_empty() || api_secret.is_empty()) {
            return Err(AppError::Config(
                "API_KEY and API_SECRET are required for live trading".to_string(),
            ));
        }

        let exchange = ExchangeConfig {
            name: env::var("EXCHANGE_NAME").unwrap_or_else(|_| "coinbase".to_string()),
            api_key,
            api_secret,
            dry_run,
        };

        let symbols = env::var("TRADING_SYMBOLS")
            .unwrap_or_else(|_| "BTC-USD,ETH-USD".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let trading = TradingConfig {
            symbols,
            granularity_secs: env_or("CANDLE_GRANULARITY_SECS", 3_600),
            update_interval_secs: env_or("UPDATE_INTERVAL_SECS", 300),
            initial_balance: env_or("INITIAL_BALANCE", 10_000.0),
            currency: env::var("QUOTE_CURRENCY").unwrap_or_else(|_| "USD".to_string()),
            snapshot_dir: env::var("SNAPSHOT_DIR").unwrap_or_else(|_| "snapshots".to_string()),
            snapshot_every_cycles: env_or("SNAPSHOT_EVERY_CYCLES", 12),
        };

        let risk = RiskConfig {
            risk_per_trade_pct: env_or("RISK_PER_TRADE_PCT", 2.0),
            max_daily_loss_pct: env_or("MAX_DAILY_LOSS_PCT", 5.0),
            max_positions: env_or("MAX_POSITIONS", 5),
            min_position_size: env_or("MIN_POSITION_SIZE", 0.0001),
            max_position_size: env_or("MAX_POSITION_SIZE", 1_000.0),
            stop_loss_pct: env_or("STOP_LOSS_PCT", 3.0),
            take_profit_pct: env_or("TAKE_PROFIT_PCT", 4.0),
            reward_ratio: env_or("REWARD_RATIO", 2.5),
            trailing_stop_pct: env_or("TRAILING_STOP_PCT", 2.0),
            max_hold_days: env_or("MAX_HOLD_DAYS", 14),
        };

        let indicators = IndicatorConfig {
            rsi_period: env_or("RSI_PERIOD", 14),
            rsi_overbought: env_or("RSI_OVERBOUGHT", 70.0),
            rsi_oversold: env_or("RSI_OVERSOLD", 30.0),
            macd_fast: env_or("MACD_FAST", 12),
            macd_slow: env_or("MACD_SLOW", 26),
            macd_signal: env_or("MACD_SIGNAL", 9),
            bollinger_period: env_or("BOLLINGER_PERIOD", 20),
            bollinger_std_dev: env_or("BOLLINGER_STD_DEV", 2.0),
            ma_short: env_or("MA_SHORT", 10),
            ma_long: env_or("MA_LONG", 50),
        };

        let thresholds = ThresholdConfig {
            signal_strength: env_or("SIGNAL_STRENGTH_THRESHOLD", 0.7),
            min_volume: env_or("MIN_VOLUME_THRESHOLD", 1_000_000.0),
        };

        let rate_limits = RateLimitConfig {
            requests_per_second: env_or("REQUESTS_PER_SECOND", 30),
            requests_per_minute: env_or("REQUESTS_PER_MINUTE", 1_800),
            requests_per_hour: env_or("REQUESTS_PER_HOUR", 10_000),
            retry_attempts: env_or("RETRY_ATTEMPTS", 3),
            retry_base_delay_secs: env_or("RETRY_BASE_DELAY_SECS", 1.0),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            to_file: env_or("LOG_TO_FILE", false),
            file_path: env::var("LOG_FILE_PATH").ok(),
        };

        let config = Config {
            exchange,
            trading,
            risk,
            indicators,
            thresholds,
            rate_limits,
            logging,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let mut file = File::open(path)
            .map_err(|e| AppError::Config(format!("Failed to open config file: {}", e)))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = serde_json::from_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> AppResult<()> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)
            .map_err(|e| AppError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    fn validate(&self) -> AppResult<()> {
        if self.trading.symbols.is_empty() {
            return Err(AppError::Config("no trading symbols configured".to_string()));
        }
        if self.risk.risk_per_trade_pct <= 0.0 || self.risk.risk_per_trade_pct > 100.0 {
            return Err(AppError::Config(format!(
                "risk_per_trade_pct out of range: {}",
                self.risk.risk_per_trade_pct
            )));
        }
        if self.risk.min_position_size >= self.risk.max_position_size {
            return Err(AppError::Config(
                "min_position_size must be below max_position_size".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.thresholds.signal_strength) {
            return Err(AppError::Config(format!(
                "signal_strength threshold out of range: {}",
                self.thresholds.signal_strength
            )));
        }
        Granularity::from_seconds(self.trading.granularity_secs)
            .map_err(|e| AppError::Config(e.to_string()))?;
        Ok(())
    }

    pub fn granularity(&self) -> Granularity {
        // validate() already checked the value
        Granularity::from_seconds(self.trading.granularity_secs)
            .unwrap_or(Granularity::OneHour)
    }

    pub fn indicator_params(&self) -> IndicatorParams {
        IndicatorParams {
            rsi_period: self.indicators.rsi_period,
            rsi_overbought: self.indicators.rsi_overbought,
            rsi_oversold: self.indicators.rsi_oversold,
            macd_fast: self.indicators.macd_fast,
            macd_slow: self.indicators.macd_slow,
            macd_signal: self.indicators.macd_signal,
            bollinger_period: self.indicators.bollinger_period,
            bollinger_std_dev: self.indicators.bollinger_std_dev,
            ma_short: self.indicators.ma_short,
            ma_long: self.indicators.ma_long,
            ..IndicatorParams::default()
        }
    }

    pub fn risk_limits(&self) -> RiskLimits {
        RiskLimits {
            max_risk_per_trade_pct: self.risk.risk_per_trade_pct,
            max_daily_loss_pct: self.risk.max_daily_loss_pct,
            max_positions: self.risk.max_positions,
            min_position_size: self.risk.min_position_size,
            max_position_size: self.risk.max_position_size,
        }
    }

    pub fn swing_config(&self) -> SwingConfig {
        SwingConfig {
            min_signal_strength: self.thresholds.signal_strength,
            min_volume: self.thresholds.min_volume,
            stop_loss_pct: self.risk.stop_loss_pct,
            reward_ratio: self.risk.reward_ratio,
            trailing_stop_pct: self.risk.trailing_stop_pct,
            max_hold_days: self.risk.max_hold_days,
            risk_per_trade_pct: self.risk.risk_per_trade_pct,
            ..SwingConfig::default()
        }
    }

    pub fn rate_caps(&self) -> RateCaps {
        RateCaps {
            per_second: self.rate_limits.requests_per_second,
            per_minute: self.rate_limits.requests_per_minute,
            per_hour: self.rate_limits.requests_per_hour,
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.rate_limits.retry_attempts,
            base_delay: Duration::from_secs_f64(self.rate_limits.retry_base_delay_secs),
            ..RetryConfig::default()
        }
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self) -> AppResult<()> {
        let mut builder = env_logger::Builder::new();

        let log_level = match self.logging.level.to_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            _ => log::LevelFilter::Info,
        };

        builder.filter_level(log_level);

        if self.logging.to_file {
            if let Some(file_path) = &self.logging.file_path {
                let file = File::create(file_path)
                    .map_err(|e| AppError::Config(format!("Failed to create log file: {}", e)))?;

                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
        }

        builder.init();

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exchange: ExchangeConfig {
                name: "coinbase".to_string(),
                api_key: "".to_string(),
                api_secret: "".to_string(),
                dry_run: true,
            },
            trading: TradingConfig {
                symbols: vec!["BTC-USD".to_string(), "ETH-USD".to_string()],
                granularity_secs: 3_600,
                update_interval_secs: 300,
                initial_balance: 10_000.0,
                currency: "USD".to_string(),
                snapshot_dir: "snapshots".to_string(),
                snapshot_every_cycles: 12,
            },
            risk: RiskConfig {
                risk_per_trade_pct: 2.0,
                max_daily_loss_pct: 5.0,
                max_positions: 5,
                min_position_size: 0.0001,
                max_position_size: 1_000.0,
                stop_loss_pct: 3.0,
                take_profit_pct: 4.0,
                reward_ratio: 2.5,
                trailing_stop_pct: 2.0,
                max_hold_days: 14,
            },
            indicators: IndicatorConfig {
                rsi_period: 14,
                rsi_overbought: 70.0,
                rsi_oversold: 30.0,
                macd_fast: 12,
                macd_slow: 26,
                macd_signal: 9,
                bollinger_period: 20,
                bollinger_std_dev: 2.0,
                ma_short: 10,
                ma_long: 50,
            },
            thresholds: ThresholdConfig {
                signal_strength: 0.7,
                min_volume: 1_000_000.0,
            },
            rate_limits: RateLimitConfig {
                requests_per_second: 30,
                requests_per_minute: 1_800,
                requests_per_hour: 10_000,
                retry_attempts: 3,
                retry_base_delay_secs: 1.0,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                to_file: false,
                file_path: None,
            },
        }
    }
}
