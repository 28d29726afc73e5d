// src/exchange/mod.rs
pub mod client;
pub mod paper;
pub mod rate_limit;

pub use client::{
    clamp_candle_window, ExchangeClient, Granularity, RetryConfig, RetryingClient,
    MAX_CANDLES_PER_REQUEST,
};
pub use paper::PaperExchange;
pub use rate_limit::{Clock, RateCaps, RateLimiter, SystemClock};
