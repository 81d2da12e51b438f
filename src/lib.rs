//! SMA-crossover trading bot for Bybit spot markets.
//!
//! The decision pipeline is candle -> indicators -> crossover signal ->
//! risk gate -> position transition, driven by a clock-aligned polling
//! loop. Execution is pluggable behind [`api::ExchangeClient`]: live Bybit
//! market data with simulated fills, or a fully synthetic paper exchange.

pub mod api;
pub mod config;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod recorder;
pub mod risk;
pub mod scheduler;
pub mod strategy;

pub use config::BotConfig;
pub use execution::{EngineSettings, TradingEngine};
