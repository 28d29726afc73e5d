// src/domain/errors.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Trading error: {0}")]
    Trading(#[from] TradingError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Notification error: {0}")]
    Notification(String),
}

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Order error: {0}")]
    Order(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("API error: {0}")]
    Api(String),
}

impl ExchangeError {
    /// Authentication failures must never be retried; everything else may be.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ExchangeError::Authentication(_))
    }
}

#[derive(Error, Debug)]
pub enum TradingError {
    #[error("Strategy error: {0}")]
    Strategy(String),

    #[error("Risk management error: {0}")]
    RiskManagement(String),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("Position not found: {0}")]
    PositionNotFound(String),

    #[error("Order execution error: {0}")]
    OrderExecution(String),

    #[error("Signal error: {0}")]
    Signal(String),
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Insufficient data: need at least {required} periods, got {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Invalid indicator '{indicator}': {reason}")]
    InvalidIndicator { indicator: String, reason: String },
}

impl AnalysisError {
    pub fn invalid(indicator: &str, reason: impl Into<String>) -> Self {
        AnalysisError::InvalidIndicator {
            indicator: indicator.to_string(),
            reason: reason.into(),
        }
    }
}

// Result type aliases for convenience
pub type AppResult<T> = Result<T, AppError>;
pub type ExchangeResult<T> = Result<T, ExchangeError>;
pub type TradingResult<T> = Result<T, TradingError>;
pub type AnalysisResult<T> = Result<T, AnalysisError>;
