//! Core domain types and logic.

pub mod backtest;
pub mod config_validation;
pub mod error;
pub mod execution;
pub mod indicator;
pub mod loader;
pub mod metrics;
pub mod monte_carlo;
pub mod ohlcv;
pub mod position;
pub mod script;
pub mod security;
pub mod signal;
pub mod sizing;
pub mod strategies;
pub mod strategy;
