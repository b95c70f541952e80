//! Two-pass regression of the overlap difference against temperature.
//!
//! Pass 1 regresses a per-day scalar (the integrated relative difference) on temperature over
//! growing chronological prefixes of the days; the evolution of its R² decides how many days
//! enter pass 2. Pass 2 regresses the relative difference of every range bin on temperature.
use itertools::Itertools;
use log::debug;

use crate::config::reference_overlap::ReferenceOverlap;
use crate::config::OverlapParams;
use crate::constants::{Celsius, REL_DIFF_MIN_OVERLAP};
use crate::numerics::least_squares::simple_linear_fit;
use crate::numerics::stats::trapz;
use crate::overlap_errors::OverlapError;

/// Straight line `value = alpha + beta * T`; NaN entries where no line could be fitted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regression {
    pub alpha: f64,
    pub beta: f64,
    pub r2: f64,
}

impl Regression {
    fn undefined() -> Self {
        Regression {
            alpha: f64::NAN,
            beta: f64::NAN,
            r2: f64::NAN,
        }
    }

    fn fit(temperature: &[Celsius], values: &[f64]) -> Self {
        match simple_linear_fit(temperature, values) {
            Ok(fit) => Regression {
                alpha: fit.intercept,
                beta: fit.slope,
                r2: fit.r2,
            },
            Err(_) => Self::undefined(),
        }
    }
}

/// `(ov_ref - ov_day) / ov_day` per bin; NaN where the day's overlap is zero.
pub fn relative_difference(reference: &ReferenceOverlap, overlap: &[f64]) -> Vec<f64> {
    reference
        .values
        .iter()
        .zip(overlap)
        .map(|(r, o)| {
            let d = (r - o) / o;
            if d.is_finite() {
                d
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// `sqrt(trapz(reldiff²))` over the bins where the reference overlap is at least 0.05.
pub fn integrated_difference(reference: &ReferenceOverlap, reldiff: &[f64]) -> f64 {
    let squares: Vec<f64> = reference
        .values
        .iter()
        .zip(reldiff)
        .filter(|(r, _)| **r >= REL_DIFF_MIN_OVERLAP)
        .map(|(_, d)| d * d)
        .collect();
    trapz(&squares).sqrt()
}

/// Pass 1: one regression per chronological prefix.
///
/// Entry `k` regresses the integrated differences of days `0..=k` on their temperatures;
/// the last entry uses every day and is the baseline of the model.
pub fn do_regression_1(temperature: &[Celsius], integrated: &[f64]) -> Vec<Regression> {
    (1..=temperature.len().min(integrated.len()))
        .map(|k| Regression::fit(&temperature[..k], &integrated[..k]))
        .collect()
}

/// Number of days entering pass 2.
///
/// The marginal gains `r2[k + 1] - r2[k]` are computed; the longest run of gains below
/// `thrsh_diff_r2` must hold at least `number_samples` gains, otherwise every day is used.
/// The index where that run ends is stepped back while the gain there is negative and is the
/// number of days kept. Fewer than `min_regression_days` days also fall back to every day.
pub fn choose_n_check_r2_diff_window(r2: &[f64], params: &OverlapParams) -> usize {
    let n_days = r2.len();
    let gains: Vec<f64> = r2.iter().tuple_windows().map(|(a, b)| b - a).collect();

    let mut best: Option<(usize, usize)> = None;
    let mut position = 0;
    for (stable, run) in &gains.iter().chunk_by(|g| **g < params.thrsh_diff_r2) {
        let len = run.count();
        if stable && best.is_none_or(|(_, l)| len > l) {
            best = Some((position, len));
        }
        position += len;
    }

    let Some((start, len)) = best.filter(|(_, len)| *len >= params.number_samples) else {
        debug!("no stable R² run of {} gains, using all {n_days} days", params.number_samples);
        return n_days;
    };

    let mut end = start + len - 1;
    while end > 0 && gains[end] < 0.0 {
        end -= 1;
    }
    if end < params.min_regression_days {
        debug!("stable R² run ends after {end} days, using all {n_days} days");
        return n_days;
    }
    debug!("stable R² run of {len} gains, using the first {end} days");
    end
}

/// Pass 2: per-bin regression of `100 * reldiff` on temperature over the selected days.
///
/// Return
/// ----------
/// * One [`Regression`] per bin (`alpha = b(z)`, `beta = a(z)`), or
///   `Err(OverlapError::DegenerateFit)` when every selected day has the same temperature.
pub fn do_regression_2(
    temperature: &[Celsius],
    reldiff: &[Vec<f64>],
) -> Result<Vec<Regression>, OverlapError> {
    let distinct = temperature
        .iter()
        .filter(|t| !t.is_nan())
        .sorted_by(|a, b| a.total_cmp(b))
        .dedup()
        .count();
    if distinct < 2 {
        return Err(OverlapError::DegenerateFit(format!(
            "{} selected day(s) share a single temperature",
            temperature.len()
        )));
    }

    let n_bins = reldiff.iter().map(|d| d.len()).min().unwrap_or(0);
    Ok((0..n_bins)
        .map(|bin| {
            let values: Vec<f64> = reldiff.iter().map(|d| 100.0 * d[bin]).collect();
            Regression::fit(temperature, &values)
        })
        .collect())
}
