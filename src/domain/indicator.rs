//! Series helpers used by the sizer: EMA, ATR, returns, correlation.

use super::ohlcv::Bar;

/// Exponential moving average, k = 2/(n+1), seeded with the first value.
///
/// Every output is valid (no warmup). A length of 0 or 1, or a series of
/// fewer than two points, is returned unchanged.
pub fn ema(series: &[f64], length: usize) -> Vec<f64> {
    if length <= 1 || series.len() <= 1 {
        return series.to_vec();
    }
    let k = 2.0 / (length as f64 + 1.0);
    let mut out = Vec::with_capacity(series.len());
    let mut prev = series[0];
    out.push(prev);
    for &x in &series[1..] {
        prev = k * x + (1.0 - k) * prev;
        out.push(prev);
    }
    out
}

/// Latest ATR: EMA of true range, with true range starting at the second bar.
///
/// Returns 0 for fewer than two bars. Lengths below 2 are raised to 2.
pub fn atr_last(bars: &[Bar], length: usize) -> f64 {
    if bars.len() < 2 {
        return 0.0;
    }
    let tr: Vec<f64> = bars
        .windows(2)
        .map(|w| w[1].true_range(w[0].close))
        .collect();
    ema(&tr, length.max(2)).last().copied().unwrap_or(0.0)
}

/// Simple returns between consecutive closes. A zero previous close is
/// treated as a tiny positive number so the series stays finite.
pub fn pct_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .map(|w| {
            let base = if w[0] == 0.0 { 1e-9 } else { w[0] };
            (w[1] - w[0]) / base
        })
        .collect()
}

/// Pearson correlation over the most recent common length of `a` and `b`.
///
/// Needs at least 3 paired points and non-zero variance on both sides,
/// otherwise returns 0. The result is clamped to [-1, 1].
pub fn pearson_corr(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 3 {
        return 0.0;
    }
    let a = &a[a.len() - n..];
    let b = &b[b.len() - n..];
    let nf = n as f64;
    let ma = a.iter().sum::<f64>() / nf;
    let mb = b.iter().sum::<f64>() / nf;

    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - ma;
        let dy = y - mb;
        cov += dx * dy;
        va += dx * dx;
        vb += dy * dy;
    }
    if va <= 0.0 || vb <= 0.0 {
        return 0.0;
    }
    (cov / (va * vb).sqrt()).clamp(-1.0, 1.0)
}
