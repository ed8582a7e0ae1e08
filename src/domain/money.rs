//! Deterministic rounding for monetary values.
//!
//! Round-half-up (away from zero) at a fixed number of decimal places. A small
//! nudge absorbs binary representation error so that values printed as an
//! exact half (e.g. 2.675) round up rather than down.

const HALF_NUDGE: f64 = 1e-9;

/// Round `value` to `places` decimal places, halves away from zero.
pub fn round_half_up(value: f64, places: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(places as i32);
    let scaled = value * factor;
    let nudged = scaled + scaled.signum() * HALF_NUDGE;
    let rounded = nudged.round() / factor;
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// Round to 2 decimal places.
pub fn round_money(value: f64) -> f64 {
    round_half_up(value, 2)
}
