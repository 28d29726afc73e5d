// src/analysis/mod.rs
pub mod indicators;
pub mod trend;
