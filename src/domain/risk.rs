//! Risk-bounded position sizing.
//!
//! Sizing runs in a fixed order: ATR levels, per-position risk budget,
//! correlation damping against open positions, portfolio risk cap, lot
//! rounding, then an advisory slippage check. Every scale that reduced the
//! size is reported back in [`RiskBreakdown`].

use super::error::{QuoteRejection, TradesimError};
use super::execution::{SlippageGuard, check_slippage};
use super::indicator::{atr_last, pct_returns, pearson_corr};
use super::money::round_money;
use super::ohlcv::{Bar, closes};
use super::position::risk_per_unit;
pub use super::position::OpenPosition;
use super::side::Side;

const SECTION: &str = "risk";

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RiskConfig {
    /// Fraction of equity risked per position.
    pub position_risk_fraction: f64,
    /// Cap on total open risk as a fraction of equity.
    pub portfolio_risk_fraction: f64,
    pub atr_length: usize,
    pub stop_atr: f64,
    pub target_atr: f64,
    /// Trailing stop distance in ATRs; 0 disables it.
    pub trail_atr: f64,
    pub correlation_window: usize,
    pub correlation_damping: f64,
    pub correlation_floor: f64,
    pub slippage_guard_bps: f64,
    pub lot_size: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            position_risk_fraction: 0.01,
            portfolio_risk_fraction: 0.02,
            atr_length: 14,
            stop_atr: 1.5,
            target_atr: 3.0,
            trail_atr: 1.0,
            correlation_window: 40,
            correlation_damping: 0.6,
            correlation_floor: 0.2,
            slippage_guard_bps: 10.0,
            lot_size: 1,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), TradesimError> {
        if self.lot_size == 0 {
            return Err(TradesimError::InvalidLotSize {
                lot_size: self.lot_size,
            });
        }
        check_fraction("max_risk_pct", self.position_risk_fraction)?;
        check_fraction("port_max_risk_pct", self.portfolio_risk_fraction)?;
        check_fraction("corr_min_scale", self.correlation_floor)?;
        check_non_negative("sl_atr", self.stop_atr)?;
        check_non_negative("tp_atr", self.target_atr)?;
        check_non_negative("trail_atr", self.trail_atr)?;
        check_non_negative("corr_alpha", self.correlation_damping)?;
        check_non_negative("slip_bps_guard", self.slippage_guard_bps)?;
        if self.atr_length == 0 {
            return Err(TradesimError::invalid(SECTION, "atr_len", "atr_len must be at least 1"));
        }
        if self.correlation_window < 2 {
            return Err(TradesimError::invalid(
                SECTION,
                "corr_window",
                "corr_window must be at least 2",
            ));
        }
        Ok(())
    }
}

fn check_fraction(key: &str, value: f64) -> Result<(), TradesimError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(TradesimError::invalid(
            SECTION,
            key,
            format!("{key} must be between 0 and 1"),
        ));
    }
    Ok(())
}

fn check_non_negative(key: &str, value: f64) -> Result<(), TradesimError> {
    if !(value.is_finite() && value >= 0.0) {
        return Err(TradesimError::invalid(
            SECTION,
            key,
            format!("{key} must be non-negative"),
        ));
    }
    Ok(())
}

/// Inputs for one sizing call.
#[derive(Debug, Clone, Copy)]
pub struct QuoteRequest<'a> {
    pub symbol: &'a str,
    pub side: Side,
    pub price: f64,
    pub equity: f64,
    pub bars: &'a [Bar],
    pub open_positions: &'a [OpenPosition],
    /// External de-risking multiplier, clamped to [0, 1].
    pub risk_scale: f64,
    pub reference_price: Option<f64>,
}

impl<'a> QuoteRequest<'a> {
    pub fn new(symbol: &'a str, side: Side, price: f64, equity: f64, bars: &'a [Bar]) -> Self {
        QuoteRequest {
            symbol,
            side,
            price,
            equity,
            bars,
            open_positions: &[],
            risk_scale: 1.0,
            reference_price: None,
        }
    }

    pub fn with_open_positions(mut self, open_positions: &'a [OpenPosition]) -> Self {
        self.open_positions = open_positions;
        self
    }

    pub fn with_risk_scale(mut self, risk_scale: f64) -> Self {
        self.risk_scale = risk_scale;
        self
    }

    pub fn with_reference_price(mut self, reference_price: f64) -> Self {
        self.reference_price = Some(reference_price);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PriceLevels {
    pub stop: f64,
    pub target: f64,
    pub trailing: Option<f64>,
}

/// How the final quantity was reached.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RiskBreakdown {
    pub risk_per_unit: f64,
    /// equity * position fraction * risk scale, rounded to 2dp.
    pub risk_budget: f64,
    /// quantity * risk per unit, rounded to 2dp.
    pub risk_value: f64,
    pub active_portfolio_risk: f64,
    pub portfolio_budget: f64,
    pub portfolio_capped: bool,
    pub max_abs_correlation: f64,
    pub correlation_scale: f64,
    pub risk_scale: f64,
    /// A positive sub-lot size was promoted to one full lot.
    pub lot_floor_applied: bool,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RiskQuote {
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub atr: f64,
    pub levels: PriceLevels,
    /// Always a multiple of `lot_size`; 0 means "do not trade".
    pub quantity: u64,
    pub lot_size: u32,
    pub risk: RiskBreakdown,
    pub slippage_guard: Option<SlippageGuard>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum QuoteOutcome {
    Sized(RiskQuote),
    Rejected(QuoteRejection),
}

impl QuoteOutcome {
    pub fn is_sized(&self) -> bool {
        matches!(self, QuoteOutcome::Sized(_))
    }

    pub fn quote(&self) -> Option<&RiskQuote> {
        match self {
            QuoteOutcome::Sized(q) => Some(q),
            QuoteOutcome::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<QuoteRejection> {
        match self {
            QuoteOutcome::Sized(_) => None,
            QuoteOutcome::Rejected(r) => Some(*r),
        }
    }
}

/// Stop, target and trailing levels `multiple * atr` away from `price`.
pub fn price_levels(side: Side, price: f64, atr: f64, config: &RiskConfig) -> PriceLevels {
    // stop and trailing sit on the losing side, target on the winning side
    let s = side.sign();
    PriceLevels {
        stop: price - s * config.stop_atr * atr,
        target: price + s * config.target_atr * atr,
        trailing: (config.trail_atr > 0.0).then_some(price - s * config.trail_atr * atr),
    }
}

/// max(floor, 1 - damping * max_correlation)
pub fn correlation_scale(max_correlation: f64, damping: f64, floor: f64) -> f64 {
    floor.max(1.0 - damping * max_correlation)
}

/// Largest |Pearson correlation| between the candidate's returns and those of
/// any open position carrying history, over the last `window` closes.
pub fn max_abs_correlation(bars: &[Bar], open_positions: &[OpenPosition], window: usize) -> f64 {
    if open_positions.is_empty() {
        return 0.0;
    }
    let candidate = pct_returns(&tail_closes(bars, window));
    open_positions
        .iter()
        .filter_map(|p| p.bars.as_deref())
        .map(|other| pearson_corr(&candidate, &pct_returns(&tail_closes(other, window))).abs())
        .fold(0.0, f64::max)
}

fn tail_closes(bars: &[Bar], window: usize) -> Vec<f64> {
    closes(&bars[bars.len().saturating_sub(window)..])
}

/// floor(quantity * scale), never negative.
pub fn scale_quantity(quantity: u64, scale: f64) -> u64 {
    (quantity as f64 * scale).floor().max(0.0) as u64
}

/// Round down to a multiple of `lot_size`.
pub fn round_to_lot(quantity: u64, lot_size: u32) -> u64 {
    let lot = u64::from(lot_size.max(1));
    quantity / lot * lot
}

/// Size a candidate entry.
///
/// Returns `Err` only for a malformed `config`. Insufficient history and
/// degenerate stops come back as [`QuoteOutcome::Rejected`].
pub fn quote_position(
    request: &QuoteRequest<'_>,
    config: &RiskConfig,
) -> Result<QuoteOutcome, TradesimError> {
    config.validate()?;

    let atr = atr_last(request.bars, config.atr_length);
    if atr.is_nan() || atr <= 0.0 {
        return Ok(QuoteOutcome::Rejected(QuoteRejection::AtrZeroOrShortSeries));
    }

    let levels = price_levels(request.side, request.price, atr, config);
    let rpu = risk_per_unit(request.side, request.price, levels.stop);
    if rpu.is_nan() || rpu <= 0.0 {
        return Ok(QuoteOutcome::Rejected(QuoteRejection::InvalidStopLevels));
    }

    let risk_scale = if request.risk_scale.is_nan() {
        0.0
    } else {
        request.risk_scale.clamp(0.0, 1.0)
    };
    let risk_budget = request.equity * config.position_risk_fraction * risk_scale;
    let base_quantity = (risk_budget / rpu).floor().max(0.0) as u64;

    let max_abs_correlation = max_abs_correlation(
        request.bars,
        request.open_positions,
        config.correlation_window,
    );
    let corr_scale = correlation_scale(
        max_abs_correlation,
        config.correlation_damping,
        config.correlation_floor,
    );
    let mut quantity = scale_quantity(base_quantity, corr_scale);

    let active_portfolio_risk: f64 = request
        .open_positions
        .iter()
        .map(OpenPosition::risk_value)
        .sum();
    let portfolio_budget = request.equity * config.portfolio_risk_fraction;
    let remaining_budget = (portfolio_budget - active_portfolio_risk).max(0.0);

    let mut portfolio_capped = false;
    if quantity > 0 && active_portfolio_risk + quantity as f64 * rpu > portfolio_budget {
        quantity = (remaining_budget / rpu).floor().max(0.0) as u64;
        portfolio_capped = true;
    }

    let lot = u64::from(config.lot_size);
    let mut lot_floor_applied = false;
    let mut sized = round_to_lot(quantity, config.lot_size);
    if sized == 0 && quantity > 0 && lot > 1 && lot as f64 * rpu <= remaining_budget {
        sized = lot;
        lot_floor_applied = true;
    }

    let slippage_guard = request
        .reference_price
        .map(|reference| check_slippage(request.price, reference, config.slippage_guard_bps));

    Ok(QuoteOutcome::Sized(RiskQuote {
        symbol: request.symbol.to_string(),
        side: request.side,
        price: request.price,
        atr,
        levels,
        quantity: sized,
        lot_size: config.lot_size,
        risk: RiskBreakdown {
            risk_per_unit: rpu,
            risk_budget: round_money(risk_budget),
            risk_value: round_money(sized as f64 * rpu),
            active_portfolio_risk: round_money(active_portfolio_risk),
            portfolio_budget: round_money(portfolio_budget),
            portfolio_capped,
            max_abs_correlation,
            correlation_scale: corr_scale,
            risk_scale,
            lot_floor_applied,
        },
        slippage_guard,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bars with a constant true range of `2 * half_range`.
    fn steady_bars(n: i64, close: f64, half_range: f64) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                Bar::new(i * 60, close, close + half_range, close - half_range, close, 1_000.0)
            })
            .collect()
    }

    /// Bars whose closes zig-zag so returns have variance.
    fn zigzag_bars(n: i64, phase: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let close = 100.0 + ((i as usize + phase) % 3) as f64;
                Bar::new(i * 60, close, close + 5.0, close - 5.0, close, 1_000.0)
            })
            .collect()
    }

    fn open_long(quantity: u64, entry: f64, stop: f64, bars: Option<Vec<Bar>>) -> OpenPosition {
        OpenPosition {
            symbol: "OPEN".into(),
            side: Side::Buy,
            quantity,
            entry,
            stop,
            bars,
        }
    }

    #[test]
    fn base_size_from_risk_budget() {
        let bars = steady_bars(30, 100.0, 5.0);
        let req = QuoteRequest::new("NIFTY", Side::Buy, 100.0, 1_000_000.0, &bars);
        let outcome = quote_position(&req, &RiskConfig::default()).unwrap();
        let q = outcome.quote().unwrap();

        assert!((q.atr - 10.0).abs() < 1e-9);
        assert!((q.levels.stop - 85.0).abs() < 1e-9);
        assert!((q.levels.target - 130.0).abs() < 1e-9);
        assert!((q.levels.trailing.unwrap() - 90.0).abs() < 1e-9);
        assert!((q.risk.risk_per_unit - 15.0).abs() < 1e-9);
        assert_eq!(q.risk.risk_budget, 10_000.0);
        assert_eq!(q.quantity, 666);
        assert_eq!(q.risk.correlation_scale, 1.0);
        assert!(!q.risk.portfolio_capped);
        assert!(q.slippage_guard.is_none());
    }

    #[test]
    fn short_levels_are_mirrored() {
        let bars = steady_bars(30, 100.0, 5.0);
        let req = QuoteRequest::new("NIFTY", Side::Sell, 100.0, 1_000_000.0, &bars);
        let q = quote_position(&req, &RiskConfig::default()).unwrap();
        let q = q.quote().unwrap();
        assert!((q.levels.stop - 115.0).abs() < 1e-9);
        assert!((q.levels.target - 70.0).abs() < 1e-9);
        assert!((q.levels.trailing.unwrap() - 110.0).abs() < 1e-9);
        assert_eq!(q.quantity, 666);
    }

    #[test]
    fn trailing_disabled_at_zero() {
        let config = RiskConfig {
            trail_atr: 0.0,
            ..RiskConfig::default()
        };
        let levels = price_levels(Side::Buy, 100.0, 2.0, &config);
        assert_eq!(levels.trailing, None);
    }

    #[test]
    fn correlation_damping_example() {
        // ATR 10, stop 1.5 ATR, 1% of 1,000,000 → 666; damping 0.6 at |rho| 0.5 → 0.7
        let scale = correlation_scale(0.5, 0.6, 0.2);
        assert!((scale - 0.7).abs() < 1e-12);
        assert_eq!(scale_quantity(666, scale), 466);
    }

    #[test]
    fn correlation_scale_respects_floor() {
        assert_eq!(correlation_scale(1.0, 1.0, 0.2), 0.2);
        assert_eq!(correlation_scale(0.0, 0.6, 0.2), 1.0);
    }

    #[test]
    fn correlated_open_position_damps_size() {
        let bars = zigzag_bars(60, 0);
        let open = [open_long(1, 100.0, 99.0, Some(bars.clone()))];
        let req = QuoteRequest::new("A", Side::Buy, 100.0, 1_000_000.0, &bars);

        let alone = quote_position(&req, &RiskConfig::default()).unwrap();
        let damped = quote_position(&req.with_open_positions(&open), &RiskConfig::default())
            .unwrap();
        let alone = alone.quote().unwrap();
        let damped = damped.quote().unwrap();

        assert!((damped.risk.max_abs_correlation - 1.0).abs() < 1e-9);
        assert!((damped.risk.correlation_scale - 0.4).abs() < 1e-9);
        assert!(damped.quantity < alone.quantity);
    }

    #[test]
    fn open_position_without_history_is_ignored_for_correlation() {
        let bars = zigzag_bars(60, 0);
        let open = [open_long(1, 100.0, 99.0, None)];
        assert_eq!(max_abs_correlation(&bars, &open, 40), 0.0);
        assert_eq!(max_abs_correlation(&bars, &[], 40), 0.0);
    }

    #[test]
    fn portfolio_cap_shrinks_quantity() {
        let bars = steady_bars(30, 100.0, 5.0);
        // budget 20,000; 15,000 already at risk; room for 5,000 / 15 = 333
        let open = [open_long(1_000, 50.0, 35.0, None)];
        let req = QuoteRequest::new("B", Side::Buy, 100.0, 1_000_000.0, &bars)
            .with_open_positions(&open);
        let q = quote_position(&req, &RiskConfig::default()).unwrap();
        let q = q.quote().unwrap();
        assert!(q.risk.portfolio_capped);
        assert_eq!(q.quantity, 333);
        assert_eq!(q.risk.active_portfolio_risk, 15_000.0);
        assert_eq!(q.risk.portfolio_budget, 20_000.0);
    }

    #[test]
    fn exhausted_portfolio_budget_gives_zero() {
        let bars = steady_bars(30, 100.0, 5.0);
        let open = [open_long(2_000, 50.0, 35.0, None)];
        let req = QuoteRequest::new("B", Side::Buy, 100.0, 1_000_000.0, &bars)
            .with_open_positions(&open);
        let q = quote_position(&req, &RiskConfig::default()).unwrap();
        let q = q.quote().unwrap();
        assert_eq!(q.quantity, 0);
        assert!(q.risk.portfolio_capped);
    }

    #[test]
    fn lot_rounding_rounds_down() {
        let bars = steady_bars(30, 100.0, 5.0);
        let config = RiskConfig {
            lot_size: 50,
            ..RiskConfig::default()
        };
        let req = QuoteRequest::new("C", Side::Buy, 100.0, 1_000_000.0, &bars);
        let q = quote_position(&req, &config).unwrap();
        assert_eq!(q.quote().unwrap().quantity, 650);
        assert_eq!(round_to_lot(666, 50), 650);
        assert_eq!(round_to_lot(49, 50), 0);
    }

    #[test]
    fn sub_lot_promoted_when_budget_allows() {
        let bars = steady_bars(30, 100.0, 5.0);
        // per-position budget 0.1% of 1,000,000 = 1,000 → 66 units; lot 75 costs 1,125 risk
        let config = RiskConfig {
            position_risk_fraction: 0.001,
            lot_size: 75,
            ..RiskConfig::default()
        };
        let req = QuoteRequest::new("D", Side::Buy, 100.0, 1_000_000.0, &bars);
        let q = quote_position(&req, &config).unwrap();
        let q = q.quote().unwrap();
        assert_eq!(q.quantity, 75);
        assert!(q.risk.lot_floor_applied);
    }

    #[test]
    fn sub_lot_not_promoted_past_portfolio_budget() {
        let bars = steady_bars(30, 100.0, 5.0);
        let config = RiskConfig {
            position_risk_fraction: 0.001,
            portfolio_risk_fraction: 0.001,
            lot_size: 75,
            ..RiskConfig::default()
        };
        let req = QuoteRequest::new("D", Side::Buy, 100.0, 1_000_000.0, &bars);
        let q = quote_position(&req, &config).unwrap();
        let q = q.quote().unwrap();
        assert_eq!(q.quantity, 0);
        assert!(!q.risk.lot_floor_applied);
    }

    #[test]
    fn risk_scale_is_clamped() {
        let bars = steady_bars(30, 100.0, 5.0);
        let req = QuoteRequest::new("E", Side::Buy, 100.0, 1_000_000.0, &bars);

        let half = quote_position(&req.with_risk_scale(0.5), &RiskConfig::default()).unwrap();
        assert_eq!(half.quote().unwrap().quantity, 333);
        assert_eq!(half.quote().unwrap().risk.risk_scale, 0.5);

        let over = quote_position(&req.with_risk_scale(3.0), &RiskConfig::default()).unwrap();
        assert_eq!(over.quote().unwrap().risk.risk_scale, 1.0);

        let neg = quote_position(&req.with_risk_scale(-1.0), &RiskConfig::default()).unwrap();
        assert_eq!(neg.quote().unwrap().quantity, 0);
    }

    #[test]
    fn short_history_is_rejected() {
        let bars = steady_bars(1, 100.0, 5.0);
        let req = QuoteRequest::new("F", Side::Buy, 100.0, 1_000_000.0, &bars);
        let outcome = quote_position(&req, &RiskConfig::default()).unwrap();
        assert_eq!(outcome.rejection(), Some(QuoteRejection::AtrZeroOrShortSeries));
    }

    #[test]
    fn flat_history_is_rejected() {
        let bars: Vec<Bar> = (0..30).map(|i| Bar::flat(i, 100.0)).collect();
        let req = QuoteRequest::new("F", Side::Buy, 100.0, 1_000_000.0, &bars);
        let outcome = quote_position(&req, &RiskConfig::default()).unwrap();
        assert!(!outcome.is_sized());
    }

    #[test]
    fn zero_stop_multiple_is_rejected() {
        let bars = steady_bars(30, 100.0, 5.0);
        let config = RiskConfig {
            stop_atr: 0.0,
            ..RiskConfig::default()
        };
        let req = QuoteRequest::new("G", Side::Buy, 100.0, 1_000_000.0, &bars);
        let outcome = quote_position(&req, &config).unwrap();
        assert_eq!(outcome.rejection(), Some(QuoteRejection::InvalidStopLevels));
    }

    #[test]
    fn slippage_guard_is_advisory() {
        let bars = steady_bars(30, 100.0, 5.0);
        let req = QuoteRequest::new("H", Side::Buy, 100.0, 1_000_000.0, &bars)
            .with_reference_price(99.0);
        let q = quote_position(&req, &RiskConfig::default()).unwrap();
        let q = q.quote().unwrap();
        let guard = q.slippage_guard.unwrap();
        assert!(!guard.within_limit);
        assert!(guard.deviation_bps > 100.0);
        assert_eq!(q.quantity, 666);
    }

    #[test]
    fn malformed_config_is_error() {
        let bars = steady_bars(30, 100.0, 5.0);
        let req = QuoteRequest::new("I", Side::Buy, 100.0, 1_000_000.0, &bars);

        let zero_lot = RiskConfig {
            lot_size: 0,
            ..RiskConfig::default()
        };
        assert!(matches!(
            quote_position(&req, &zero_lot),
            Err(TradesimError::InvalidLotSize { .. })
        ));

        let bad_fraction = RiskConfig {
            position_risk_fraction: 1.5,
            ..RiskConfig::default()
        };
        assert!(matches!(
            quote_position(&req, &bad_fraction),
            Err(TradesimError::ConfigInvalid { .. })
        ));

        let short_window = RiskConfig {
            correlation_window: 1,
            ..RiskConfig::default()
        };
        assert!(short_window.validate().is_err());
    }
}
