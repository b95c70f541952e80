//! # Pre-checks
//!
//! Cheap gates deciding whether a time window of a [`ProfileSet`] is worth the candidate
//! window search, and how high that search may go.
//!
//! ## Overview
//! -----------------
//! A day is cut into [`TimeWindow`]s by [`make_time_windows`]. The clear-sky mask is computed
//! once per day by [`all_clear_sky`]; then [`run_pre_checks`] chains, for one window:
//!
//! 1. [`at_least_one_profile`] – the window holds at least one measured profile,
//! 2. the clear-sky mask is true on every timestamp of the window,
//! 3. [`enough_clear_range`] – cloud bases leave room for the shortest fit window,
//! 4. [`running_variance`] – sliding temporal variability stays low enough,
//! 5. [`check_grads`] – Sobel gradients of `log10|rcs|` stay low enough.
//!
//! Checks 3 to 5 each lower the **maximum available fit range**; the chain stops at the first
//! failure. A failure is an expected "no data" outcome, reported as
//! [`PreCheckOutcome::Failed`], never as an error.
use std::fmt;

use log::debug;

use crate::config::derived::DerivedSettings;
use crate::config::OverlapParams;
use crate::constants::{Meter, GRADIENT_LIMIT_OFFSET_BINS, SECONDS_PER_MINUTE};
use crate::numerics::sobel::sobel;
use crate::numerics::stats::{mode, nanmax, nanmean};
use crate::overlap_errors::OverlapError;
use crate::profiles::ProfileSet;
use crate::sample_sorter::{make_variance_windows, stdomean};
use crate::time::unix_seconds;

/// Contiguous, inclusive range of time indices analysed as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeWindow {
    pub start: usize,
    pub end: usize,
}

impl TimeWindow {
    pub fn len(&self) -> usize {
        self.indices().len()
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn indices(&self) -> std::ops::Range<usize> {
        self.start..self.end + 1
    }
}

/// Cut a day into time windows of `time_interval_length` minutes every `d_fit_time` minutes.
///
/// Every window holds the same number of profiles (the most frequent one) and lies entirely
/// inside the day.
pub fn make_time_windows(set: &ProfileSet, params: &OverlapParams) -> Vec<TimeWindow> {
    let Some(first) = set.times.first() else {
        return Vec::new();
    };
    let t0 = unix_seconds(*first);
    let offsets: Vec<f64> = set.times.iter().map(|t| unix_seconds(*t) - t0).collect();
    let last = offsets[offsets.len() - 1];
    let length = params.time_interval_length * SECONDS_PER_MINUTE;
    let shift = params.d_fit_time * SECONDS_PER_MINUTE;

    let mut raw = Vec::new();
    let mut k = 0usize;
    loop {
        let from = k as f64 * shift;
        if from > last - length {
            break;
        }
        let start = offsets.partition_point(|o| *o < from);
        let end = offsets.partition_point(|o| *o <= offsets[start] + length) - 1;
        raw.push((start, end));
        k += 1;
    }

    let spans: Vec<i64> = raw.iter().map(|(s, e)| (e - s) as i64).collect();
    let Some(span) = mode(&spans) else {
        return Vec::new();
    };
    raw.into_iter()
        .map(|(start, _)| TimeWindow {
            start,
            end: start + span as usize,
        })
        .filter(|w| w.end < set.len())
        .collect()
}

/// Name of a pre-check, reported when it stops a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreCheck {
    AtLeastOneProfile,
    AllClearSky,
    EnoughClearRange,
    RunningVariance,
    CheckGrads,
}

impl fmt::Display for PreCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PreCheck::AtLeastOneProfile => "at_least_one_profile",
            PreCheck::AllClearSky => "all_clear_sky",
            PreCheck::EnoughClearRange => "enough_clear_range",
            PreCheck::RunningVariance => "running_variance",
            PreCheck::CheckGrads => "check_grads",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PreCheckOutcome {
    Passed { max_available_range: Meter },
    Failed(PreCheck),
}

/// True if the window holds at least one measured profile.
pub fn at_least_one_profile(set: &ProfileSet, window: &TimeWindow) -> bool {
    window.indices().any(|t| !set.is_missing(t))
}

/// Per-timestamp clear-sky mask.
///
/// A timestamp is clear when it was measured, its sky condition index (if reported) is 0 and
/// the largest relative vertical gradient of `log10|rcs|` inside
/// `[clear_sky_min_range, clear_sky_max_range]` stays below `clear_sky_max_relgrad`.
pub fn all_clear_sky(set: &ProfileSet, params: &OverlapParams) -> Vec<bool> {
    let lo = set.first_bin_at_or_above(params.clear_sky_min_range);
    let hi = set.last_bin_at_or_below(params.clear_sky_max_range);

    (0..set.len())
        .map(|t| {
            if set.is_missing(t) || matches!(set.sky_condition[t], Some(s) if s != 0) {
                return false;
            }
            let (Some(lo), Some(hi)) = (lo, hi) else {
                return true;
            };
            if hi < lo + 2 {
                return true;
            }
            let logs: Vec<f64> = (lo..=hi)
                .map(|r| {
                    set.signal
                        .get(t, r)
                        .map(|v| v.abs().log10())
                        .filter(|v| v.is_finite())
                        .unwrap_or(f64::NAN)
                })
                .collect();
            let worst = nanmax(
                (1..logs.len() - 1).map(|i| 0.5 * (logs[i + 1] - logs[i - 1]).abs() / logs[i].abs()),
            );
            !worst.is_nan() && worst < params.clear_sky_max_relgrad
        })
        .collect()
}

/// Cloud base gate.
///
/// Return
/// ----------
/// * The maximum available fit range `min(lowest cloud base, max_fit_range)` when every
///   measured cloud base of the window is at least `min_fit_range + min_fit_length`.
pub fn enough_clear_range(
    set: &ProfileSet,
    window: &TimeWindow,
    params: &OverlapParams,
    derived: &DerivedSettings,
) -> Option<Meter> {
    let lowest = window
        .indices()
        .filter_map(|t| set.lowest_cloud_base[t])
        .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a| a.min(c))))?;
    if lowest < derived.min_required_range(params) {
        return None;
    }
    Some(lowest.min(params.max_fit_range))
}

/// Bin indices `[lowest stability bin, last bin <= max_available]`.
fn stability_bins(
    set: &ProfileSet,
    params: &OverlapParams,
    max_available: Meter,
) -> Option<(usize, usize)> {
    let lo = set
        .last_bin_at_or_below(params.min_range_std_over_mean)
        .unwrap_or(0);
    let hi = set.last_bin_at_or_below(max_available)?;
    (hi > lo + 2).then_some((lo, hi))
}

/// Temporal stability gate.
///
/// The first bin (from `min_range_std_over_mean` upwards) whose sliding std over median
/// reaches `max_std_over_mean` lowers the maximum available range to that bin.
pub fn running_variance(
    set: &ProfileSet,
    window: &TimeWindow,
    max_available: Meter,
    params: &OverlapParams,
    derived: &DerivedSettings,
) -> Result<Option<Meter>, OverlapError> {
    let Some((lo, hi)) = stability_bins(set, params, max_available) else {
        return Ok(None);
    };
    let grid = set.signal.log10_abs_block(window.indices(), lo..hi + 1)?;
    let windows = make_variance_windows(window.len(), set.sampling_interval, params);
    let ratio = stdomean(&grid, &windows);

    let limited = match ratio.iter().position(|v| *v >= params.max_std_over_mean) {
        Some(j) => set.range[lo + j].min(max_available),
        None => max_available,
    };
    Ok((limited >= derived.min_required_range(params)).then_some(limited))
}

/// Relative Sobel gradients of `log10|rcs|`, reduced over the interior time rows.
struct GradientProfile {
    max_range: Vec<f64>,
    max_time: Vec<f64>,
    max_magnitude: Vec<f64>,
    mean_magnitude: Vec<f64>,
}

fn gradient_profile(grid: &nalgebra::DMatrix<f64>) -> GradientProfile {
    let g = sobel(grid);
    let (rows, cols) = grid.shape();
    let interior = 1..rows.saturating_sub(1);

    let reduce = |f: &dyn Fn(usize, usize) -> f64, mean: bool| -> Vec<f64> {
        (0..cols)
            .map(|c| {
                if c == 0 || c + 1 == cols {
                    return f64::NAN;
                }
                let values = interior.clone().map(|r| f(r, c));
                if mean {
                    nanmean(values)
                } else {
                    nanmax(values)
                }
            })
            .collect()
    };

    let rel_range = |r: usize, c: usize| g.along_range[(r, c)].abs() / grid[(r, c)].abs();
    let rel_time = |r: usize, c: usize| g.along_time[(r, c)].abs() / grid[(r, c)].abs();
    let rel_mag = |r: usize, c: usize| {
        g.along_range[(r, c)].hypot(g.along_time[(r, c)]) / grid[(r, c)].abs()
    };

    GradientProfile {
        max_range: reduce(&rel_range, false),
        max_time: reduce(&rel_time, false),
        max_magnitude: reduce(&rel_mag, false),
        mean_magnitude: reduce(&rel_mag, true),
    }
}

/// Spatial/temporal gradient gate.
///
/// Three limits are derived from the relative gradients of the window:
///
/// * ten bins above the first bin whose range gradient exceeds `max_relgrad`,
/// * the same for the time gradient, when more than one bin exceeds,
/// * the top of the run of bins, starting at the bottom, whose gradient magnitude stays below
///   `max_relgrad` (maximum) and `max_relgrad_mean` (mean), when the run stops inside the
///   block.
///
/// The maximum available range becomes the smallest of them.
pub fn check_grads(
    set: &ProfileSet,
    window: &TimeWindow,
    max_available: Meter,
    params: &OverlapParams,
    derived: &DerivedSettings,
) -> Result<Option<Meter>, OverlapError> {
    let Some((lo, hi)) = stability_bins(set, params, max_available) else {
        return Ok(None);
    };
    let grid = set.signal.log10_abs_block(window.indices(), lo..hi + 1)?;
    let profile = gradient_profile(&grid);
    let rconv = &set.range[lo..=hi];
    let last = rconv.len() - 1;
    let offset_limit = |j: usize| rconv[(j + GRADIENT_LIMIT_OFFSET_BINS).min(last)];

    let exceeding = |v: &[f64]| -> Vec<usize> {
        v.iter()
            .enumerate()
            .filter(|(_, g)| **g > params.max_relgrad)
            .map(|(i, _)| i)
            .collect()
    };

    let mut limit = max_available;
    if let Some(&j) = exceeding(&profile.max_range).first() {
        limit = limit.min(offset_limit(j));
    }
    let over_time = exceeding(&profile.max_time);
    if over_time.len() > 1 {
        limit = limit.min(offset_limit(over_time[0]));
    }

    let run = (1..last)
        .take_while(|&c| {
            profile.max_magnitude[c] <= params.max_relgrad
                && profile.mean_magnitude[c] <= params.max_relgrad_mean
        })
        .count();
    let first_failing = 1 + run;
    if first_failing < last {
        limit = limit.min(rconv[first_failing - 1]);
    }

    Ok((limit >= derived.min_required_range(params)).then_some(limit))
}

/// Chain the pre-checks on one time window.
///
/// Arguments
/// -----------------
/// * `set`: the normalized day.
/// * `window`: the time window to gate.
/// * `clear_mask`: output of [`all_clear_sky`] for the day.
/// * `params`, `derived`: configuration.
///
/// Return
/// ----------
/// * [`PreCheckOutcome::Passed`] with the maximum available fit range, or the first failed
///   check. Errors only come from out-of-grid indices.
pub fn run_pre_checks(
    set: &ProfileSet,
    window: &TimeWindow,
    clear_mask: &[bool],
    params: &OverlapParams,
    derived: &DerivedSettings,
) -> Result<PreCheckOutcome, OverlapError> {
    use PreCheckOutcome::{Failed, Passed};

    if !at_least_one_profile(set, window) {
        return Ok(Failed(PreCheck::AtLeastOneProfile));
    }
    if !window.indices().all(|t| clear_mask.get(t).copied().unwrap_or(false)) {
        return Ok(Failed(PreCheck::AllClearSky));
    }
    let Some(max_available) = enough_clear_range(set, window, params, derived) else {
        return Ok(Failed(PreCheck::EnoughClearRange));
    };
    let Some(max_available) = running_variance(set, window, max_available, params, derived)?
    else {
        return Ok(Failed(PreCheck::RunningVariance));
    };
    let Some(max_available) = check_grads(set, window, max_available, params, derived)? else {
        return Ok(Failed(PreCheck::CheckGrads));
    };

    debug!(
        "time window {}..={} passed pre-checks, fit range up to {max_available} m",
        window.start, window.end
    );
    Ok(Passed {
        max_available_range: max_available,
    })
}

#[cfg(test)]
mod pre_checks_test {
    use super::*;
    use crate::profiles::test_support::{clear_set, reference, test_params};

    fn derived(set: &ProfileSet, params: &OverlapParams) -> DerivedSettings {
        DerivedSettings::resolve(params, &set.range, set.range_resolution, &reference()).unwrap()
    }

    #[test]
    fn test_time_windows() {
        let set = clear_set(180, 60.0);
        let windows = make_time_windows(&set, &test_params());
        assert_eq!(windows.len(), 5);
        assert_eq!(windows[0], TimeWindow { start: 0, end: 30 });
        assert_eq!(windows[4], TimeWindow { start: 120, end: 150 });
        assert!(windows.iter().all(|w| w.len() == 31 && !w.is_empty()));

        let reversed = TimeWindow { start: 5, end: 3 };
        assert!(reversed.is_empty());
        assert_eq!(reversed.len(), 0);
    }

    #[test]
    fn test_day_shorter_than_a_window() {
        let set = clear_set(20, 60.0);
        assert!(make_time_windows(&set, &test_params()).is_empty());
    }

    #[test]
    fn test_clear_day_passes() {
        let set = clear_set(180, 60.0);
        let params = test_params();
        let derived = derived(&set, &params);
        let mask = all_clear_sky(&set, &params);
        assert!(mask.iter().all(|c| *c));

        let window = TimeWindow { start: 0, end: 30 };
        assert_eq!(
            run_pre_checks(&set, &window, &mask, &params, &derived).unwrap(),
            PreCheckOutcome::Passed {
                max_available_range: 1500.0
            }
        );
    }

    #[test]
    fn test_cloud_limits_range() {
        let mut set = clear_set(180, 60.0);
        let params = test_params();
        let derived = derived(&set, &params);
        let window = TimeWindow { start: 0, end: 30 };

        set.lowest_cloud_base[10] = Some(1200.0);
        assert_eq!(
            enough_clear_range(&set, &window, &params, &derived),
            Some(1200.0)
        );
        // 510 m + 300 m is the lowest acceptable cloud base
        set.lowest_cloud_base[11] = Some(700.0);
        assert_eq!(enough_clear_range(&set, &window, &params, &derived), None);
    }

    #[test]
    fn test_sky_condition_and_placeholders() {
        let mut set = clear_set(40, 60.0);
        let params = test_params();
        set.sky_condition[3] = Some(1);
        set.sky_condition[4] = None;
        set.status[5] = crate::profiles::ProfileStatus::Missing;
        let mask = all_clear_sky(&set, &params);
        assert!(!mask[3]);
        assert!(mask[4]);
        assert!(!mask[5]);

        let derived = derived(&set, &params);
        let window = TimeWindow { start: 0, end: 30 };
        assert_eq!(
            run_pre_checks(&set, &window, &mask, &params, &derived).unwrap(),
            PreCheckOutcome::Failed(PreCheck::AllClearSky)
        );
    }

    #[test]
    fn test_empty_window() {
        let mut set = clear_set(40, 60.0);
        let params = test_params();
        let derived = derived(&set, &params);
        let window = TimeWindow { start: 0, end: 30 };
        for t in window.indices() {
            set.status[t] = crate::profiles::ProfileStatus::Missing;
        }
        let mask = all_clear_sky(&set, &params);
        assert_eq!(
            run_pre_checks(&set, &window, &mask, &params, &derived).unwrap(),
            PreCheckOutcome::Failed(PreCheck::AtLeastOneProfile)
        );
    }

    #[test]
    fn test_gradient_layer_limits_range() {
        let raw = {
            let mut raw = crate::profiles::test_support::clear_raw_day(40, 60.0);
            // aerosol layer top at 1200 m: signal drops by a factor of 10 over one bin
            for p in raw.profiles.iter_mut() {
                for (r, v) in raw.range.iter().zip(p.signal.iter_mut()) {
                    if *r > 1200.0 {
                        *v = v.map(|s| s / 10.0);
                    }
                }
            }
            raw
        };
        let set = ProfileSet::from_raw(raw).unwrap();
        let params = test_params();
        let derived = derived(&set, &params);
        let window = TimeWindow { start: 0, end: 30 };

        let limit = check_grads(&set, &window, 1500.0, &params, &derived)
            .unwrap()
            .unwrap();
        assert!(limit < 1215.0);
        assert!(limit >= derived.min_required_range(&params));
    }

    #[test]
    fn test_unstable_signal_fails_variance() {
        let mut raw = crate::profiles::test_support::clear_raw_day(40, 60.0);
        for (t, p) in raw.profiles.iter_mut().enumerate() {
            let scale = if t % 2 == 0 { 2.0 } else { 0.5 };
            for v in p.signal.iter_mut() {
                *v = v.map(|s| s * scale);
            }
        }
        let set = ProfileSet::from_raw(raw).unwrap();
        let params = test_params();
        let derived = derived(&set, &params);
        let window = TimeWindow { start: 0, end: 30 };
        assert_eq!(
            running_variance(&set, &window, 1500.0, &params, &derived).unwrap(),
            None
        );
    }
}
