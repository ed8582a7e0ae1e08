//! Backtest engine.
//!
//! Replays a unit (±1 lot) position signal over a cleaned bar sequence with
//! no look-ahead: the decision keyed at bar `i` is executed on bar `i + 1`,
//! and equity at bar `i` is marked before the decision is acted on.

use std::collections::HashMap;

use super::error::TradesimError;
use super::execution::{ExecutionMode, apply_slippage_spread};
use super::fees::{FeeSchedule, Product, estimate_leg_cost};
use super::metrics::BacktestStats;
use super::ohlcv::Bar;
use super::portfolio::{EquityPoint, Fill, Ledger, Trade};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BacktestConfig {
    pub product: Product,
    pub lot_size: u32,
    pub slippage_bps: f64,
    pub spread_bps: f64,
    pub allow_short: bool,
    pub initial_cash: f64,
    pub execution: ExecutionMode,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            product: Product::EquityIntraday,
            lot_size: 1,
            slippage_bps: 1.0,
            spread_bps: 0.0,
            allow_short: false,
            initial_cash: 1_000_000.0,
            execution: ExecutionMode::NextOpen,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), TradesimError> {
        if self.lot_size == 0 {
            return Err(TradesimError::InvalidLotSize {
                lot_size: self.lot_size,
            });
        }
        for (key, value) in [("slippage_bps", self.slippage_bps), ("spread_bps", self.spread_bps)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(TradesimError::invalid(
                    "backtest",
                    key,
                    format!("{key} must be non-negative"),
                ));
            }
        }
        if !(self.initial_cash.is_finite() && self.initial_cash > 0.0) {
            return Err(TradesimError::invalid(
                "backtest",
                "initial_cash",
                "initial_cash must be positive",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BacktestResult {
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    pub stats: BacktestStats,
}

impl BacktestResult {
    pub fn empty() -> Self {
        BacktestResult {
            equity_curve: Vec::new(),
            trades: Vec::new(),
            stats: BacktestStats::empty(),
        }
    }
}

/// Clamp a raw signal value to a lot target: anything outside {-1, 0, 1}
/// becomes flat, and -1 becomes flat unless shorting is allowed.
pub fn coerce_target(raw: i64, allow_short: bool) -> i64 {
    match raw {
        1 => 1,
        -1 if allow_short => -1,
        _ => 0,
    }
}

/// Run one backtest.
///
/// `bars` must be sorted, duplicate-free and gap-filled. `desired` maps a bar
/// timestamp to the wanted position; bars without an entry hold the current
/// position. Fails only on configuration faults (see
/// [`BacktestConfig::validate`], or a product missing from `fees`), which are
/// checked before any bar is read.
pub fn run_backtest(
    bars: &[Bar],
    desired: &HashMap<i64, i64>,
    config: &BacktestConfig,
    fees: &FeeSchedule,
) -> Result<BacktestResult, TradesimError> {
    config.validate()?;
    fees.get(config.product)?;

    let Some(last) = bars.last() else {
        return Ok(BacktestResult::empty());
    };

    let mut ledger = Ledger::new(config.initial_cash, u64::from(config.lot_size));

    for pair in bars.windows(2) {
        let (current, next) = (&pair[0], &pair[1]);
        let target = desired
            .get(&current.timestamp)
            .map_or(ledger.lots, |&raw| coerce_target(raw, config.allow_short));

        ledger.record_equity(current.timestamp, current.close);

        if let Some((side, quantity)) = ledger.order_for(target) {
            let reference = config.execution.reference_price(next);
            let price =
                apply_slippage_spread(reference, side, config.slippage_bps, config.spread_bps);
            let notional = price * quantity as f64;
            let cost = estimate_leg_cost(notional, side, config.product, fees)?;
            ledger.apply(Fill {
                timestamp: next.timestamp,
                target_lots: target,
                price,
                cost: cost.total,
            });
        }
    }

    ledger.record_equity(last.timestamp, last.close);

    let stats = BacktestStats::compute(
        &ledger.equity_curve,
        config.initial_cash,
        ledger.trades.len(),
        ledger.total_costs,
        &ledger.tally,
    );

    Ok(BacktestResult {
        equity_curve: ledger.equity_curve,
        trades: ledger.trades,
        stats,
    })
}
