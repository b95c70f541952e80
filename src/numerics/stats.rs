//! NaN-aware descriptive statistics.
//!
//! NaN marks a missing value throughout the dense grids of the crate, so every reducer here
//! skips NaN entries and returns NaN (or `None`) when nothing is left.
use std::collections::HashMap;

use itertools::Itertools;

/// Mean of the finite-or-infinite, non-NaN values; NaN if there are none.
pub fn nanmean<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let (sum, n) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// Population standard deviation (`ddof = 0`) of the non-NaN values; NaN if there are none.
pub fn nanstd<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let kept: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
    if kept.is_empty() {
        return f64::NAN;
    }
    let mean = kept.iter().sum::<f64>() / kept.len() as f64;
    let var = kept.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / kept.len() as f64;
    var.sqrt()
}

/// Maximum of the non-NaN values; NaN if there are none.
pub fn nanmax<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold(f64::NAN, |acc, v| if acc.is_nan() || v > acc { v } else { acc })
}

/// Percentile of the non-NaN values with linear interpolation.
///
/// The value at fraction `p / 100` sits at the zero-based rank `r = p / 100 * (n - 1)` of the
/// sorted sample and is interpolated linearly between `floor(r)` and `ceil(r)`.
///
/// Arguments
/// -----------------
/// * `values`: sample, NaN entries are ignored.
/// * `p`: percentile in `[0, 100]`.
///
/// Return
/// ----------
/// * `None` when the sample has no non-NaN value or `p` is out of range.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if !(0.0..=100.0).contains(&p) {
        return None;
    }
    let sorted: Vec<f64> = values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .sorted_by(f64::total_cmp)
        .collect();
    percentile_of_sorted(&sorted, p)
}

/// [`percentile`] on an already sorted, NaN-free sample.
pub fn percentile_of_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let rank = p / 100.0 * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Median of the non-NaN values; NaN if there are none.
pub fn nanmedian(values: &[f64]) -> f64 {
    percentile(values, 50.0).unwrap_or(f64::NAN)
}

/// Most frequent value, the smallest one on ties.
pub fn mode(values: &[i64]) -> Option<i64> {
    let counts: HashMap<i64, usize> = values.iter().copied().counts();
    counts
        .into_iter()
        .max_by(|(va, ca), (vb, cb)| ca.cmp(cb).then(vb.cmp(va)))
        .map(|(v, _)| v)
}

/// Trapezoidal integral of `y` with unit spacing.
pub fn trapz(y: &[f64]) -> f64 {
    y.iter().tuple_windows().map(|(a, b)| 0.5 * (a + b)).sum()
}

/// Index of the smallest non-NaN value (first one on ties).
pub fn argmin(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .min_by(|(ia, a), (ib, b)| a.total_cmp(b).then(ia.cmp(ib)))
        .map(|(i, _)| i)
}
