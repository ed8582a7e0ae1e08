//! Core domain types and logic. No I/O happens below this module.

pub mod ohlcv;
pub mod side;
pub mod money;
pub mod cleaning;
pub mod fees;
pub mod execution;
pub mod indicator;
pub mod metrics;
pub mod portfolio;
pub mod position;
pub mod backtest;
pub mod risk;
pub mod cooldown;
pub mod config_validation;
pub mod error;
