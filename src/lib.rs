// src/lib.rs
// Main library module declarations

pub mod analysis;
pub mod bot;
pub mod config;
pub mod domain;
pub mod exchange;
pub mod notify;
pub mod portfolio;
pub mod risk;
pub mod strategy;

pub use bot::TradingBot;
pub use config::Config;
pub use domain::errors::{AppError, AppResult};
