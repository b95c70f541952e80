//! # Process-checks
//!
//! Quality checks of candidate fit windows inside a time window that passed the
//! [`crate::pre_checks`].
//!
//! ## Overview
//! -----------------
//! For every [`CandidateWindow`] of a time window, the time-mean of `log10|rcs|` is fitted
//! with a straight line inside the range window. Under the assumption of a homogeneous,
//! aerosol-free lower layer the line is what the signal would be with a perfect overlap, so
//! `10^(signal - fit)` below the window top is the overlap-correction factor.
//!
//! Three checks then decide whether the candidate is plausible:
//!
//! * [`check_polyfit`] – fit quality, slope and intercept bounds, plausibility of the
//!   corrected overlap,
//! * [`find_gradient_of_corrected_signal`] – the corrected signal is spatially and temporally
//!   smooth,
//! * [`find_savgol_slope`] – the corrected overlap keeps increasing with range.
//!
//! [`evaluate_time_window`] runs them for every candidate and returns one
//! [`WindowEvaluation`] per candidate, failures included.
use std::fmt;
use std::ops::Range;

use log::debug;
use nalgebra::DMatrix;

use crate::config::derived::DerivedSettings;
use crate::config::reference_overlap::ReferenceOverlap;
use crate::config::OverlapParams;
use crate::constants::{Kelvin, Meter};
use crate::numerics::least_squares::{simple_linear_fit, LinearFit, Polynomial};
use crate::numerics::savgol::savgol_derivative;
use crate::numerics::sobel::sobel;
use crate::numerics::stats::{argmin, nanmax, nanmean};
use crate::overlap_errors::OverlapError;
use crate::pre_checks::TimeWindow;
use crate::profiles::ProfileSet;

/// A (time window × range window) sub-region of a day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateWindow {
    pub time: TimeWindow,
    /// First bin of the range window
    pub range_start: usize,
    /// Last bin of the range window (inclusive)
    pub range_end: usize,
    /// Nominal lower bound (m)
    pub rng_lower: Meter,
    /// Nominal upper bound (m)
    pub rng_upper: Meter,
}

impl CandidateWindow {
    pub fn n_bins(&self) -> usize {
        self.range_end + 1 - self.range_start
    }

    pub fn bins(&self) -> Range<usize> {
        self.range_start..self.range_end + 1
    }

    /// Number of (time, range) cells covered.
    pub fn size(&self) -> usize {
        self.time.len() * self.n_bins()
    }

    pub fn length(&self) -> Meter {
        self.rng_upper - self.rng_lower
    }
}

/// Enumerate the candidate range windows of a time window.
///
/// Starts run from `min_fit_range` in steps of `d_fit_range` strictly below
/// `max_available_range`; lengths from `min_fit_length` in steps of `d_fit_length` strictly
/// below `max_fit_length`. Windows ending above the last start are dropped, as are windows
/// holding fewer than two bins. Order: start, then length, ascending.
pub fn make_candidate_windows(
    set: &ProfileSet,
    time: TimeWindow,
    max_available_range: Meter,
    params: &OverlapParams,
    derived: &DerivedSettings,
) -> Vec<CandidateWindow> {
    let steps = |from: f64, below: f64, step: f64| -> Vec<f64> {
        (0..)
            .map(|k| from + k as f64 * step)
            .take_while(|v| *v < below)
            .collect()
    };
    let begins = steps(
        derived.min_fit_range,
        max_available_range,
        derived.d_fit_range,
    );
    let lengths = steps(
        params.min_fit_length,
        derived.max_fit_length,
        derived.d_fit_length,
    );
    let Some(&last_begin) = begins.last() else {
        return Vec::new();
    };

    let mut windows = Vec::new();
    for &begin in &begins {
        for &length in &lengths {
            let stop = begin + length;
            if stop > last_begin {
                break;
            }
            let (Some(range_start), Some(range_end)) = (
                set.first_bin_at_or_above(begin),
                set.last_bin_at_or_below(stop),
            ) else {
                continue;
            };
            if range_end <= range_start {
                continue;
            }
            windows.push(CandidateWindow {
                time,
                range_start,
                range_end,
                rng_lower: begin,
                rng_upper: stop,
            });
        }
    }
    windows
}

/// Everything the checks need about one time window.
pub struct WindowContext<'a> {
    pub set: &'a ProfileSet,
    pub reference: &'a ReferenceOverlap,
    pub params: &'a OverlapParams,
    pub derived: &'a DerivedSettings,
    pub time: TimeWindow,
    pub max_available_range: Meter,
    /// Time-mean of `log10|rcs|` on every bin
    pub mean_log_signal: Vec<f64>,
    /// Bins of the stability and gradient checks
    pub stability_bins: Range<usize>,
    /// `log10|rcs|` on `time × stability_bins`
    pub log_signal: DMatrix<f64>,
    /// Mean internal temperature of the measured profiles
    pub temperature: Kelvin,
}

impl<'a> WindowContext<'a> {
    /// Prepare the shared inputs of a time window.
    ///
    /// Return
    /// ----------
    /// * `Err(OverlapError::InsufficientData)` when fewer than three bins lie between
    ///   `min_range_std_over_mean` and the maximum available range.
    pub fn new(
        set: &'a ProfileSet,
        reference: &'a ReferenceOverlap,
        params: &'a OverlapParams,
        derived: &'a DerivedSettings,
        time: TimeWindow,
        max_available_range: Meter,
    ) -> Result<Self, OverlapError> {
        let all = set.signal.log10_abs_block(time.indices(), 0..set.n_bins())?;
        let mean_log_signal = all.column_iter().map(|c| nanmean(c.iter().copied())).collect();

        let lo = set
            .first_bin_at_or_above(params.min_range_std_over_mean)
            .unwrap_or(0);
        let hi = set
            .range
            .iter()
            .rposition(|r| *r < max_available_range)
            .unwrap_or(0);
        if hi < lo + 2 {
            return Err(OverlapError::InsufficientData(format!(
                "no stability bins between {} m and {max_available_range} m",
                params.min_range_std_over_mean
            )));
        }
        let stability_bins = lo..hi + 1;
        let log_signal = all.columns(lo, stability_bins.len()).into_owned();

        let temperature = nanmean(
            time.indices()
                .filter(|t| !set.is_missing(*t))
                .map(|t| set.temperature[t]),
        );

        Ok(WindowContext {
            set,
            reference,
            params,
            derived,
            time,
            max_available_range,
            mean_log_signal,
            stability_bins,
            log_signal,
            temperature,
        })
    }

    pub fn range(&self) -> &[Meter] {
        &self.set.range
    }

    /// `log10|rcs / factor|` on `time × stability_bins`.
    pub fn corrected_log_signal(&self, factor: &[f64]) -> DMatrix<f64> {
        let lo = self.stability_bins.start;
        DMatrix::from_fn(self.log_signal.nrows(), self.log_signal.ncols(), |t, j| {
            self.log_signal[(t, j)] - factor[lo + j].log10()
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckKind {
    Polyfit,
    CorrectedGradient,
    SavgolSlope,
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckKind::Polyfit => "check_polyfit",
            CheckKind::CorrectedGradient => "find_gradient_of_corrected_signal",
            CheckKind::SavgolSlope => "find_savgol_slope",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckResult {
    pub passed: bool,
    pub score: f64,
}

impl CheckResult {
    fn failed() -> Self {
        CheckResult {
            passed: false,
            score: f64::NAN,
        }
    }
}

/// Overlap correction implied by a candidate's linear fit.
#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    pub fit: LinearFit,
    /// Degree of the lowest polynomial meeting the residual threshold
    pub order: usize,
    /// Rms residual of that polynomial
    pub residual: f64,
    /// Mean of that polynomial over the window
    pub mean_fit: f64,
    /// Correction factor per bin, 1 above the window top
    pub factor: Vec<f64>,
    /// `ov_ref * factor`
    pub corrected_overlap: Vec<f64>,
}

/// Result of [`check_polyfit`]; the correction is absent when no line could be fitted.
#[derive(Debug, Clone, PartialEq)]
pub struct PolyfitCheck {
    pub result: CheckResult,
    pub correction: Option<Correction>,
}

fn rms_residual(x: &[f64], y: &[f64], poly: &Polynomial) -> (f64, f64) {
    let residual = nanmean(x.iter().zip(y).map(|(xi, yi)| (yi - poly.eval(*xi)).powi(2))).sqrt();
    let mean_fit = nanmean(x.iter().map(|xi| poly.eval(*xi)));
    (residual, mean_fit)
}

/// Fit quality and corrected overlap plausibility of one candidate.
///
/// Polynomials of order `1..=max_poly_order` are fitted to the mean log signal of the range
/// window; the lowest order with an rms residual below `thresh_resid_rel * mean(fit)` is kept.
/// The straight line must also have a slope in `[min_expected_slope, max_expected_slope]`,
/// an intercept in `[min_expected_zero_fit_value, max_expected_zero_fit_value]` and a
/// maximum relative deviation below `thresh_resid_whole_zone` from `min_fit_range` to the
/// window top.
///
/// The correction factor is `10^(signal - line)` up to the window top and 1 above. The
/// corrected overlap must not exceed `max_overlap_value * max(ov_ref)` and, from
/// `min_overlap_valid` upwards, must stay within `thresh_overlap_valid_rel_error` of `ov_ref`.
///
/// Score: rms residual of the kept polynomial.
pub fn check_polyfit(ctx: &WindowContext, candidate: &CandidateWindow) -> PolyfitCheck {
    let params = ctx.params;
    let range = ctx.range();
    let (x, y): (Vec<f64>, Vec<f64>) = candidate
        .bins()
        .map(|r| (range[r], ctx.mean_log_signal[r]))
        .filter(|(_, v)| !v.is_nan())
        .unzip();

    let Ok(fit) = simple_linear_fit(&x, &y) else {
        return PolyfitCheck {
            result: CheckResult::failed(),
            correction: None,
        };
    };

    let mut kept = None;
    let mut last = (f64::NAN, f64::NAN, 1usize);
    for order in 1..=params.max_poly_order {
        let poly = if order == 1 {
            Polynomial::from_linear(&fit)
        } else {
            match Polynomial::fit(&x, &y, order) {
                Ok(p) => p,
                Err(_) => break,
            }
        };
        let (residual, mean_fit) = rms_residual(&x, &y, &poly);
        last = (residual, mean_fit, order);
        if residual < params.thresh_resid_rel * mean_fit {
            kept = Some(last);
            break;
        }
    }
    let (residual, mean_fit, order) = kept.unwrap_or(last);

    let slope_ok = (params.min_expected_slope..=params.max_expected_slope).contains(&fit.slope);
    let intercept_ok = (params.min_expected_zero_fit_value..=params.max_expected_zero_fit_value)
        .contains(&fit.intercept);

    let whole_zone = nanmax(
        range
            .iter()
            .zip(&ctx.mean_log_signal)
            .filter(|(r, _)| **r >= ctx.derived.min_fit_range && **r <= candidate.rng_upper)
            .map(|(r, v)| (v - fit.eval(*r)).abs() / fit.eval(*r).abs()),
    );
    let whole_zone_ok = whole_zone < params.thresh_resid_whole_zone;

    let factor: Vec<f64> = range
        .iter()
        .zip(&ctx.mean_log_signal)
        .map(|(r, v)| {
            if *r > candidate.rng_upper {
                1.0
            } else {
                10f64.powf(v - fit.eval(*r))
            }
        })
        .collect();
    let corrected_overlap: Vec<f64> = ctx
        .reference
        .values
        .iter()
        .zip(&factor)
        .map(|(ov, f)| ov * f)
        .collect();

    let max_ok = nanmax(corrected_overlap.iter().copied())
        <= params.max_overlap_value * ctx.reference.max();
    let rel_error = nanmax(
        range
            .iter()
            .zip(ctx.reference.values.iter().zip(&corrected_overlap))
            .filter(|(r, _)| **r >= ctx.derived.min_overlap_valid)
            .map(|(_, (ov, c))| (ov - c).abs() / ov.abs()),
    );
    let rel_error_ok = rel_error < params.thresh_overlap_valid_rel_error;

    let passed =
        kept.is_some() && slope_ok && intercept_ok && whole_zone_ok && max_ok && rel_error_ok;

    PolyfitCheck {
        result: CheckResult {
            passed,
            score: residual,
        },
        correction: Some(Correction {
            fit,
            order,
            residual,
            mean_fit,
            factor,
            corrected_overlap,
        }),
    }
}

/// Relative Sobel gradient magnitude of `log10|rcs / factor|`.
///
/// Bins from the window top upwards are masked (the factor jumps to 1 there), as are the
/// border rows and columns of the grid.
///
/// Return
/// ----------
/// * `(max, mean)` over the unmasked cells, NaN when nothing is left.
pub fn corrected_gradient_stats(
    grid: &DMatrix<f64>,
    first_bin: usize,
    window_top_bin: usize,
) -> (f64, f64) {
    let gradients = sobel(grid);
    let g = &gradients;
    let (rows, cols) = grid.shape();
    let last_col = cols.saturating_sub(1).min(window_top_bin.saturating_sub(first_bin));
    let cells = move || {
        (1..rows.saturating_sub(1)).flat_map(move |t| {
            (1..last_col).map(move |j| {
                g.along_range[(t, j)].hypot(g.along_time[(t, j)]) / grid[(t, j)].abs()
            })
        })
    };
    (nanmax(cells()), nanmean(cells()))
}

/// Spatio-temporal homogeneity of the corrected signal.
///
/// Passes if the maximum relative gradient is at most `max_relgrad` and the mean at most
/// `max_relgrad_mean`. Score: the maximum.
pub fn find_gradient_of_corrected_signal(
    ctx: &WindowContext,
    candidate: &CandidateWindow,
    correction: &Correction,
) -> CheckResult {
    let grid = ctx.corrected_log_signal(&correction.factor);
    let (max, mean) =
        corrected_gradient_stats(&grid, ctx.stability_bins.start, candidate.range_end);
    CheckResult {
        passed: max <= ctx.params.max_relgrad && mean <= ctx.params.max_relgrad_mean,
        score: max,
    }
}

/// Monotonicity of the corrected overlap.
///
/// The Savitzky–Golay first derivative of the corrected overlap up to `sgolay_max_range`
/// must not go below `min_slope`, unless its minimum lies above the window top.
/// Score: the minimum slope.
pub fn find_savgol_slope(
    ctx: &WindowContext,
    candidate: &CandidateWindow,
    correction: &Correction,
) -> Result<CheckResult, OverlapError> {
    let params = ctx.params;
    let top = ctx
        .set
        .last_bin_at_or_below(params.sgolay_max_range)
        .unwrap_or(0)
        .min(correction.corrected_overlap.len().saturating_sub(1));
    let slope = savgol_derivative(
        &correction.corrected_overlap[..=top],
        params.sgolay_width,
        params.sgolay_ord,
        ctx.derived.range_spacing,
    )?;
    let Some(at) = argmin(&slope) else {
        return Ok(CheckResult::failed());
    };
    Ok(CheckResult {
        passed: slope[at] >= params.min_slope || at > candidate.range_end,
        score: slope[at],
    })
}

/// Checks and products of one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowEvaluation {
    pub candidate: CandidateWindow,
    pub temperature: Kelvin,
    /// Results in evaluation order; evaluation stops at the first failure
    pub checks: Vec<(CheckKind, CheckResult)>,
    pub correction: Option<Correction>,
}

impl WindowEvaluation {
    /// Logical AND of all three checks.
    pub fn passed(&self) -> bool {
        self.checks.len() == 3 && self.checks.iter().all(|(_, c)| c.passed)
    }

    pub fn score(&self, kind: CheckKind) -> Option<f64> {
        self.checks
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, c)| c.score)
    }
}

/// Run the process-checks on every candidate of a time window.
///
/// Arguments
/// -----------------
/// * `ctx`: shared inputs of the time window.
///
/// Return
/// ----------
/// * One [`WindowEvaluation`] per candidate, in [`make_candidate_windows`] order.
pub fn evaluate_time_window(ctx: &WindowContext) -> Result<Vec<WindowEvaluation>, OverlapError> {
    let candidates = make_candidate_windows(
        ctx.set,
        ctx.time,
        ctx.max_available_range,
        ctx.params,
        ctx.derived,
    );

    let mut evaluations = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let PolyfitCheck { result, correction } = check_polyfit(ctx, &candidate);
        let mut checks = vec![(CheckKind::Polyfit, result)];
        if let (true, Some(corr)) = (result.passed, correction.as_ref()) {
            let gradient = find_gradient_of_corrected_signal(ctx, &candidate, corr);
            checks.push((CheckKind::CorrectedGradient, gradient));
            if gradient.passed {
                checks.push((CheckKind::SavgolSlope, find_savgol_slope(ctx, &candidate, corr)?));
            }
        }
        evaluations.push(WindowEvaluation {
            candidate,
            temperature: ctx.temperature,
            checks,
            correction,
        });
    }

    debug!(
        "time window {}..={}: {} of {} candidates passed",
        ctx.time.start,
        ctx.time.end,
        evaluations.iter().filter(|e| e.passed()).count(),
        evaluations.len()
    );
    Ok(evaluations)
}
