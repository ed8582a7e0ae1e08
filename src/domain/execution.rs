//! Fill price simulation.
//!
//! Slippage and spread are quoted in basis points and applied against the
//! trader: buys fill higher, sells fill lower. Negative bps model favourable
//! fills.

use std::fmt;
use std::str::FromStr;

use super::ohlcv::Bar;
use super::side::Side;

const BPS_PER_UNIT: f64 = 10_000.0;

/// Which price of the execution bar a decision fills at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExecutionMode {
    #[default]
    NextOpen,
    NextClose,
}

impl ExecutionMode {
    /// Reference (pre-slippage) price on the execution bar.
    pub fn reference_price(&self, bar: &Bar) -> f64 {
        match self {
            ExecutionMode::NextOpen => bar.open,
            ExecutionMode::NextClose => bar.close,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::NextOpen => "next_open",
            ExecutionMode::NextClose => "next_close",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "next_open" => Ok(ExecutionMode::NextOpen),
            "next_close" => Ok(ExecutionMode::NextClose),
            other => Err(format!("unknown execution mode: {other}")),
        }
    }
}

/// Adjust a reference price by slippage + spread, side-aware.
///
/// Buy: price * (1 + bps/10000). Sell: price * (1 - bps/10000).
pub fn apply_slippage_spread(
    reference_price: f64,
    side: Side,
    slippage_bps: f64,
    spread_bps: f64,
) -> f64 {
    let adj = (slippage_bps + spread_bps) / BPS_PER_UNIT;
    match side {
        Side::Buy => reference_price * (1.0 + adj),
        Side::Sell => reference_price * (1.0 - adj),
    }
}

/// Absolute deviation of `price` from `reference` in basis points.
/// A zero reference yields 0.
pub fn price_to_bps(price: f64, reference: f64) -> f64 {
    if reference == 0.0 {
        return 0.0;
    }
    ((price - reference) / reference).abs() * BPS_PER_UNIT
}

/// Result of comparing a requested price with a reference quote.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SlippageGuard {
    pub within_limit: bool,
    pub deviation_bps: f64,
    pub limit_bps: f64,
}

/// Advisory check: is `price` within `limit_bps` of `reference`?
pub fn check_slippage(price: f64, reference: f64, limit_bps: f64) -> SlippageGuard {
    let deviation_bps = price_to_bps(price, reference);
    SlippageGuard {
        within_limit: deviation_bps <= limit_bps,
        deviation_bps,
        limit_bps,
    }
}
