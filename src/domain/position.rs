//! Open positions as seen by the risk sizer.

use super::ohlcv::Bar;
use super::side::Side;

/// A position already on the book. `bars` is optional recent history used
/// for correlation damping.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OpenPosition {
    pub symbol: String,
    pub side: Side,
    pub quantity: u64,
    pub entry: f64,
    pub stop: f64,
    pub bars: Option<Vec<Bar>>,
}

impl OpenPosition {
    /// Loss per unit if the stop is hit; 0 when the stop is on the wrong side.
    pub fn risk_per_unit(&self) -> f64 {
        risk_per_unit(self.side, self.entry, self.stop)
    }

    /// Approximate capital at risk: quantity * risk per unit.
    pub fn risk_value(&self) -> f64 {
        self.quantity as f64 * self.risk_per_unit()
    }
}

/// Distance from entry to stop on the losing side, floored at 0.
pub fn risk_per_unit(side: Side, entry: f64, stop: f64) -> f64 {
    match side {
        Side::Buy => (entry - stop).max(0.0),
        Side::Sell => (stop - entry).max(0.0),
    }
}
