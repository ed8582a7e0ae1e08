//! Bar cleaning: ordering, duplicates, gaps and spikes.
//!
//! The backtest expects bars that are sorted, free of duplicate timestamps and
//! (optionally) gap-filled at a fixed cadence. Every function returns a new
//! vector and leaves its input alone.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::ohlcv::Bar;

/// How `fill_missing_bars` treats a gap in the cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FillMethod {
    /// Insert flat bars at the last close with zero volume.
    #[default]
    ForwardFill,
    /// Leave gaps as they are.
    Drop,
}

impl FromStr for FillMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ffill" | "forward_fill" => Ok(FillMethod::ForwardFill),
            "drop" => Ok(FillMethod::Drop),
            other => Err(format!("unknown fill method: {other}")),
        }
    }
}

impl fmt::Display for FillMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FillMethod::ForwardFill => "ffill",
            FillMethod::Drop => "drop",
        })
    }
}

pub const DEFAULT_MAX_SPIKE_PCT: f64 = 0.15;

/// Options for [`clean_bars`]. `interval_secs` of `None` skips gap filling and
/// `max_spike_pct` of `None` skips clamping.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CleaningOptions {
    pub interval_secs: Option<i64>,
    pub fill: FillMethod,
    pub max_spike_pct: Option<f64>,
}

impl Default for CleaningOptions {
    fn default() -> Self {
        CleaningOptions {
            interval_secs: None,
            fill: FillMethod::ForwardFill,
            max_spike_pct: None,
        }
    }
}

/// Bars in ascending timestamp order. The sort is stable, so bars sharing a
/// timestamp keep their input order.
pub fn sort_bars(bars: &[Bar]) -> Vec<Bar> {
    let mut sorted = bars.to_vec();
    sorted.sort_by_key(|b| b.timestamp);
    sorted
}

/// One bar per timestamp, sorted. The last bar seen for a timestamp wins.
pub fn dedupe_bars(bars: &[Bar]) -> Vec<Bar> {
    let by_ts: BTreeMap<i64, Bar> = bars.iter().map(|b| (b.timestamp, *b)).collect();
    by_ts.into_values().collect()
}

/// Insert bars for missing slots at `interval_secs` cadence.
///
/// Each gap bar is flat at the previous close with zero volume. A
/// non-positive interval leaves the sorted bars unchanged.
pub fn fill_missing_bars(bars: &[Bar], interval_secs: i64, method: FillMethod) -> Vec<Bar> {
    let sorted = sort_bars(bars);
    if method == FillMethod::Drop || interval_secs <= 0 {
        return sorted;
    }
    let Some((first, rest)) = sorted.split_first() else {
        return sorted;
    };

    let mut out = Vec::with_capacity(sorted.len());
    out.push(*first);
    let mut last = *first;
    for bar in rest {
        let mut next = last.timestamp.checked_add(interval_secs);
        while let Some(t) = next.filter(|&t| t < bar.timestamp) {
            let gap = Bar::flat(t, last.close);
            out.push(gap);
            last = gap;
            next = t.checked_add(interval_secs);
        }
        out.push(*bar);
        last = *bar;
    }
    out
}

/// Clamp each bar's range to within `max_pct` of the previous (clamped)
/// close, keeping open and close inside the new range. The first bar is
/// passed through.
pub fn clamp_spikes(bars: &[Bar], max_pct: f64) -> Vec<Bar> {
    let sorted = sort_bars(bars);
    let Some((first, rest)) = sorted.split_first() else {
        return sorted;
    };

    let mut out = Vec::with_capacity(sorted.len());
    out.push(*first);
    let mut prev_close = first.close;
    for bar in rest {
        let upper = prev_close * (1.0 + max_pct);
        let lower = prev_close * (1.0 - max_pct);
        let high = bar.high.min(upper);
        let low = bar.low.max(lower);
        let open = bar.open.max(low).min(high);
        let close = bar.close.max(low).min(high);
        out.push(Bar {
            timestamp: bar.timestamp,
            open,
            high: high.max(open).max(close),
            low: low.min(open).min(close),
            close,
            volume: bar.volume,
        });
        prev_close = close;
    }
    out
}

/// Dedupe, then fill gaps and clamp spikes as `options` asks.
pub fn clean_bars(bars: &[Bar], options: &CleaningOptions) -> Vec<Bar> {
    let mut cleaned = dedupe_bars(bars);
    if let Some(interval) = options.interval_secs {
        cleaned = fill_missing_bars(&cleaned, interval, options.fill);
    }
    if let Some(max_pct) = options.max_spike_pct {
        cleaned = clamp_spikes(&cleaned, max_pct);
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts: i64, close: f64) -> Bar {
        Bar::new(ts, close, close + 1.0, close - 1.0, close, 100.0)
    }

    fn timestamps(bars: &[Bar]) -> Vec<i64> {
        bars.iter().map(|b| b.timestamp).collect()
    }

    #[test]
    fn sort_orders_by_timestamp() {
        let bars = [bar(3, 1.0), bar(1, 2.0), bar(2, 3.0)];
        assert_eq!(timestamps(&sort_bars(&bars)), vec![1, 2, 3]);
    }

    #[test]
    fn dedupe_keeps_last() {
        let bars = [bar(2, 10.0), bar(1, 5.0), bar(2, 11.0)];
        let out = dedupe_bars(&bars);
        assert_eq!(timestamps(&out), vec![1, 2]);
        assert_eq!(out[1].close, 11.0);
    }

    #[test]
    fn forward_fill_inserts_flat_bars() {
        let bars = [bar(0, 100.0), bar(180, 103.0)];
        let out = fill_missing_bars(&bars, 60, FillMethod::ForwardFill);
        assert_eq!(timestamps(&out), vec![0, 60, 120, 180]);
        assert_eq!(out[1], Bar::flat(60, 100.0));
        assert_eq!(out[2], Bar::flat(120, 100.0));
        assert_eq!(out[3].close, 103.0);
    }

    #[test]
    fn drop_leaves_gaps() {
        let bars = [bar(120, 1.0), bar(0, 2.0)];
        let out = fill_missing_bars(&bars, 60, FillMethod::Drop);
        assert_eq!(timestamps(&out), vec![0, 120]);
    }

    #[test]
    fn fill_handles_empty_and_bad_interval() {
        assert!(fill_missing_bars(&[], 60, FillMethod::ForwardFill).is_empty());
        let bars = [bar(0, 1.0), bar(600, 1.0)];
        assert_eq!(fill_missing_bars(&bars, 0, FillMethod::ForwardFill).len(), 2);
    }

    #[test]
    fn fill_stops_at_timestamp_limit() {
        let bars = [bar(i64::MAX - 100, 1.0), bar(i64::MAX - 1, 2.0)];
        let out = fill_missing_bars(&bars, 60, FillMethod::ForwardFill);
        assert_eq!(
            timestamps(&out),
            vec![i64::MAX - 100, i64::MAX - 40, i64::MAX - 1]
        );
    }

    #[test]
    fn off_cadence_bar_is_kept() {
        let bars = [bar(0, 1.0), bar(90, 2.0)];
        let out = fill_missing_bars(&bars, 60, FillMethod::ForwardFill);
        assert_eq!(timestamps(&out), vec![0, 60, 90]);
    }

    #[test]
    fn clamp_limits_range_to_prev_close() {
        let bars = [
            bar(0, 100.0),
            Bar::new(1, 100.0, 150.0, 60.0, 140.0, 10.0),
        ];
        let out = clamp_spikes(&bars, 0.15);
        let b = out[1];
        assert!((b.high - 115.0).abs() < 1e-9);
        assert!((b.low - 85.0).abs() < 1e-9);
        assert!((b.close - 115.0).abs() < 1e-9);
        assert_eq!(b.open, 100.0);
        assert_eq!(b.volume, 10.0);
        assert!(b.is_consistent());
    }

    #[test]
    fn clamp_chains_off_clamped_close() {
        let bars = [
            bar(0, 100.0),
            Bar::new(1, 100.0, 200.0, 100.0, 200.0, 0.0),
            Bar::new(2, 200.0, 200.0, 200.0, 200.0, 0.0),
        ];
        let out = clamp_spikes(&bars, 0.1);
        assert!((out[1].close - 110.0).abs() < 1e-9);
        assert!((out[2].close - 121.0).abs() < 1e-9);
    }

    #[test]
    fn calm_bars_pass_through_clamp() {
        let bars = [bar(0, 100.0), bar(1, 101.0), bar(2, 99.0)];
        assert_eq!(clamp_spikes(&bars, DEFAULT_MAX_SPIKE_PCT), bars.to_vec());
    }

    #[test]
    fn clean_bars_pipeline() {
        let bars = [bar(120, 3.0), bar(0, 1.0), bar(0, 2.0)];
        let options = CleaningOptions {
            interval_secs: Some(60),
            ..CleaningOptions::default()
        };
        let out = clean_bars(&bars, &options);
        assert_eq!(timestamps(&out), vec![0, 60, 120]);
        assert_eq!(out[0].close, 2.0);
        assert_eq!(out[1].close, 2.0);
    }

    #[test]
    fn fill_method_parsing() {
        assert_eq!("ffill".parse::<FillMethod>(), Ok(FillMethod::ForwardFill));
        assert_eq!("DROP".parse::<FillMethod>(), Ok(FillMethod::Drop));
        assert!("bfill".parse::<FillMethod>().is_err());
    }
}
