//! # Sample sorter
//!
//! Turns the evaluated candidates of a day into its overlap samples.
//!
//! ## Pipeline
//! -----------------
//! [`do_sort_checks`] applies, in order:
//!
//! 1. [`remove_failed`] – drop candidates failing a process-check. A small survivor set must
//!    additionally pass the stability tests on every productive time window.
//! 2. [`remove_outliers`] – per-bin whisker rule on the corrected overlaps, then an upper
//!    whisker on the relative-gradient and variance scores.
//! 3. ranking by the combined score of [`combined_score`], ties broken by the larger window
//!    and then the earliest start, keeping the best `max_samples_per_day`.
//!
//! Everything is deterministic: the same evaluations always give the same samples in the
//! same order.
use std::cmp::Ordering;
use std::ops::Range;

use hifitime::Epoch;
use log::debug;
use nalgebra::DMatrix;

use crate::config::OverlapParams;
use crate::constants::{Kelvin, Meter, SECONDS_PER_MINUTE};
use crate::numerics::stats::{nanmax, nanmedian, nanstd, percentile};
use crate::process_checks::{
    corrected_gradient_stats, CandidateWindow, CheckKind, WindowContext, WindowEvaluation,
};

/// Sliding sub-windows of `dt_sliding_variance` minutes over `n_profiles` profiles.
///
/// Each sub-window holds `round(dt_sliding_variance / sampling interval)` profiles (at least
/// two, at most `n_profiles`); consecutive sub-windows are shifted by one profile.
pub fn make_variance_windows(
    n_profiles: usize,
    sampling_interval: Option<f64>,
    params: &OverlapParams,
) -> Vec<Range<usize>> {
    if n_profiles == 0 {
        return Vec::new();
    }
    let per = sampling_interval
        .filter(|s| *s > 0.0)
        .map(|s| (params.dt_sliding_variance * SECONDS_PER_MINUTE / s).round() as usize)
        .unwrap_or(n_profiles)
        .clamp(2.min(n_profiles), n_profiles);
    (0..=n_profiles - per).map(|s| s..s + per).collect()
}

/// Per-column maximum over `windows` of `std(window) / |median(all rows)|`.
pub fn stdomean(grid: &DMatrix<f64>, windows: &[Range<usize>]) -> Vec<f64> {
    grid.column_iter()
        .map(|column| {
            let values: Vec<f64> = column.iter().copied().collect();
            let median = nanmedian(&values).abs();
            nanmax(
                windows
                    .iter()
                    .filter(|w| w.end <= values.len())
                    .map(|w| nanstd(values[w.clone()].iter().copied()) / median),
            )
        })
        .collect()
}

/// Variance score of a correction on a time window: [`stdomean`] of the corrected log signal
/// from the first stability bin up to `top_bin`, maximum over bins.
pub fn variance_score(ctx: &WindowContext, factor: &[f64], top_bin: usize) -> f64 {
    let grid = ctx.corrected_log_signal(factor);
    let cols = (top_bin + 1)
        .saturating_sub(ctx.stability_bins.start)
        .min(grid.ncols());
    if cols == 0 {
        return f64::NAN;
    }
    let windows = make_variance_windows(grid.nrows(), ctx.set.sampling_interval, ctx.params);
    nanmax(stdomean(&grid.columns(0, cols).into_owned(), &windows))
}

/// A candidate that passed every process-check, with its ranking inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    pub window: CandidateWindow,
    pub start: Epoch,
    pub end: Epoch,
    pub temperature: Kelvin,
    pub factor: Vec<f64>,
    pub corrected_overlap: Vec<f64>,
    pub residual: f64,
    pub mean_fit: f64,
    pub relgrad: f64,
    pub variance: f64,
}

/// An accepted candidate: the overlap correction of one time and range window.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlapSample {
    pub window: CandidateWindow,
    pub start: Epoch,
    pub end: Epoch,
    pub rng_lower: Meter,
    pub rng_upper: Meter,
    /// Mean internal temperature over the time window
    pub temperature: Kelvin,
    /// Correction factor per bin
    pub factor: Vec<f64>,
    /// Reference overlap times the factor
    pub corrected_overlap: Vec<f64>,
    /// Combined ranking score, lower is better
    pub score: f64,
}

/// Collect the passing candidates of every time window with their scores.
fn passing_candidates(windows: &[(WindowContext, Vec<WindowEvaluation>)]) -> Vec<RankedCandidate> {
    let mut out = Vec::new();
    for (ctx, evaluations) in windows {
        for evaluation in evaluations.iter().filter(|e| e.passed()) {
            let Some(correction) = evaluation.correction.as_ref() else {
                continue;
            };
            let w = evaluation.candidate;
            out.push(RankedCandidate {
                window: w,
                start: ctx.set.times[w.time.start],
                end: ctx.set.times[w.time.end],
                temperature: evaluation.temperature,
                factor: correction.factor.clone(),
                corrected_overlap: correction.corrected_overlap.clone(),
                residual: correction.residual,
                mean_fit: correction.mean_fit,
                relgrad: evaluation
                    .score(CheckKind::CorrectedGradient)
                    .unwrap_or(f64::NAN),
                variance: variance_score(ctx, &correction.factor, w.range_end),
            });
        }
    }
    out
}

/// Drop candidates that fail the stability tests on the productive time windows.
///
/// When at most `min_nb_samples_for_skipping_good_test` candidates passed the process-checks,
/// each of them must, on every time window that produced a passing candidate, keep its
/// corrected signal below `max_std_over_mean` (variance) and below `max_relgrad` /
/// `max_relgrad_mean` (gradient). Larger sets are kept as they are.
pub fn remove_failed(
    candidates: Vec<RankedCandidate>,
    windows: &[(WindowContext, Vec<WindowEvaluation>)],
    params: &OverlapParams,
) -> Vec<RankedCandidate> {
    if candidates.len() > params.min_nb_samples_for_skipping_good_test {
        return candidates;
    }
    let productive: Vec<&WindowContext> = windows
        .iter()
        .filter(|(_, e)| e.iter().any(|e| e.passed()))
        .map(|(ctx, _)| ctx)
        .collect();

    candidates
        .into_iter()
        .filter(|c| {
            productive.iter().all(|ctx| {
                let variance = variance_score(ctx, &c.factor, c.window.range_end);
                let grid = ctx.corrected_log_signal(&c.factor);
                let (max, mean) =
                    corrected_gradient_stats(&grid, ctx.stability_bins.start, c.window.range_end);
                variance < params.max_std_over_mean
                    && max <= params.max_relgrad
                    && mean <= params.max_relgrad_mean
            })
        })
        .collect()
}

/// Whisker bounds `(median, half width)` of a sample for the configured quantile.
fn whisker(values: &[f64], params: &OverlapParams) -> Option<(f64, f64)> {
    let q = 100.0 * params.outlier_quantile;
    let median = percentile(values, 50.0)?;
    let spread = percentile(values, q)? - percentile(values, 100.0 - q)?;
    Some((
        median,
        (params.whiskers_length * spread).max(params.outlier_abs_tolerance),
    ))
}

/// Per-bin outlier rule on a set of curves of equal length.
///
/// Arguments
/// -----------------
/// * `curves`: one curve per candidate (corrected overlap functions).
/// * `params`: `outlier_quantile`, `whiskers_length` and `outlier_abs_tolerance`.
///
/// Return
/// ----------
/// * A keep-mask: `true` when every non-NaN bin of the curve lies within
///   `median ± max(whiskers_length * (P(q) - P(1 - q)), outlier_abs_tolerance)` of that bin.
pub fn remove_outliers(curves: &[&[f64]], params: &OverlapParams) -> Vec<bool> {
    let n_bins = curves.iter().map(|c| c.len()).max().unwrap_or(0);
    let bounds: Vec<Option<(f64, f64)>> = (0..n_bins)
        .map(|b| {
            let column: Vec<f64> = curves
                .iter()
                .map(|c| c.get(b).copied().unwrap_or(f64::NAN))
                .collect();
            whisker(&column, params)
        })
        .collect();

    curves
        .iter()
        .map(|curve| {
            curve.iter().zip(&bounds).all(|(v, bound)| match bound {
                Some((median, half)) if !v.is_nan() => (v - median).abs() <= *half,
                _ => true,
            })
        })
        .collect()
}

/// Upper-whisker rule on a score: keeps values at most `median + half width`.
pub fn remove_score_outliers(scores: &[f64], params: &OverlapParams) -> Vec<bool> {
    match whisker(scores, params) {
        Some((median, half)) => scores
            .iter()
            .map(|s| s.is_nan() || *s <= median + half)
            .collect(),
        None => vec![true; scores.len()],
    }
}

/// Ranking score, lower is better: fit residual relative to its threshold plus variance
/// relative to its threshold.
pub fn combined_score(candidate: &RankedCandidate, params: &OverlapParams) -> f64 {
    candidate.residual / (params.thresh_resid_rel * candidate.mean_fit)
        + candidate.variance / params.max_std_over_mean
}

/// Ranking order: combined score, then larger window, then earliest time and range start.
fn rank_order(a: &(f64, &RankedCandidate), b: &(f64, &RankedCandidate)) -> Ordering {
    a.0.total_cmp(&b.0)
        .then_with(|| b.1.window.size().cmp(&a.1.window.size()))
        .then_with(|| a.1.window.time.start.cmp(&b.1.window.time.start))
        .then_with(|| a.1.window.range_start.cmp(&b.1.window.range_start))
        .then_with(|| a.1.window.range_end.cmp(&b.1.window.range_end))
}

fn keep_masked<T>(items: Vec<T>, mask: &[bool]) -> Vec<T> {
    items
        .into_iter()
        .zip(mask)
        .filter_map(|(item, keep)| keep.then_some(item))
        .collect()
}

/// Select the overlap samples of a day.
///
/// Arguments
/// -----------------
/// * `windows`: every time window that passed the pre-checks with the evaluations of its
///   candidates.
/// * `params`: sorting settings.
///
/// Return
/// ----------
/// * Up to `max_samples_per_day` samples, best first; empty when nothing survives.
pub fn do_sort_checks(
    windows: &[(WindowContext, Vec<WindowEvaluation>)],
    params: &OverlapParams,
) -> Vec<OverlapSample> {
    let candidates = passing_candidates(windows);
    let passed = candidates.len();
    let candidates = remove_failed(candidates, windows, params);
    let after_good_test = candidates.len();

    let mask = {
        let curves: Vec<&[f64]> = candidates
            .iter()
            .map(|c| c.corrected_overlap.as_slice())
            .collect();
        remove_outliers(&curves, params)
    };
    let candidates = keep_masked(candidates, &mask);

    let relgrads: Vec<f64> = candidates.iter().map(|c| c.relgrad).collect();
    let variances: Vec<f64> = candidates.iter().map(|c| c.variance).collect();
    let mask: Vec<bool> = remove_score_outliers(&relgrads, params)
        .into_iter()
        .zip(remove_score_outliers(&variances, params))
        .map(|(a, b)| a && b)
        .collect();
    let candidates = keep_masked(candidates, &mask);

    debug!(
        "{passed} candidates passed the checks, {after_good_test} the stability tests, {} the outlier removal",
        candidates.len()
    );

    let mut ranked: Vec<(f64, &RankedCandidate)> = candidates
        .iter()
        .map(|c| (combined_score(c, params), c))
        .collect();
    ranked.sort_by(rank_order);

    ranked
        .into_iter()
        .take(params.max_samples_per_day)
        .map(|(score, c)| OverlapSample {
            window: c.window,
            start: c.start,
            end: c.end,
            rng_lower: c.window.rng_lower,
            rng_upper: c.window.rng_upper,
            temperature: c.temperature,
            factor: c.factor.clone(),
            corrected_overlap: c.corrected_overlap.clone(),
            score,
        })
        .collect()
}
