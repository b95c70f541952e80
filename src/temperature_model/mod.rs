//! # Temperature model
//!
//! Second stage of the pipeline: turns the daily results of a date range into one
//! linear model of the overlap deviation per optical module,
//!
//! ```text
//! Dif(z) = a(z) * T + b(z)                       (percent, T in °C)
//! ov_corrected(z) = 1 / (Dif(z) / 100 / ov_ref(z) + 1 / ov_ref(z))
//! ```
//!
//! Steps
//! -----------------
//! 1. [`daily_files::check_dates_available`] and [`daily_files::check_optical_module`] list
//!    the daily results of the range and partition them by module.
//! 2. [`get_daily_medians`] reduces each day to one overlap function and one temperature.
//! 3. [`regression::do_regression_1`] and [`regression::choose_n_check_r2_diff_window`]
//!    pick the chronological prefix of days entering the model.
//! 4. [`regression::do_regression_2`] fits `a(z)` and `b(z)` bin by bin.
//!
//! Failures are per module: one module without enough data does not prevent the others
//! from being modelled.
use std::collections::BTreeMap;

use camino::Utf8Path;
use itertools::Itertools;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::reference_overlap::ReferenceOverlap;
use crate::config::OverlapParams;
use crate::constants::{Celsius, Meter, OpticalModuleId, ZERO_CELSIUS_IN_KELVIN};
use crate::daily_result::DailyResult;
use crate::numerics::stats::nanmedian;
use crate::overlap_errors::{OverlapError, RunStatus};
use crate::profiles::InstrumentMeta;
use crate::time::CalendarDate;

use self::daily_files::{
    check_dates_available, check_optical_module, read_module_results, DailyFile,
};
use self::regression::{
    choose_n_check_r2_diff_window, do_regression_1, do_regression_2, integrated_difference,
    relative_difference, Regression,
};

pub mod daily_files;
pub mod model_file;
pub mod regression;

/// One day reduced to its median overlap function.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyMedian {
    pub date: CalendarDate,
    pub temperature: Celsius,
    pub overlap: Vec<f64>,
    pub n_samples: usize,
}

/// Per-bin median overlap and median temperature of every day with enough samples.
///
/// Days with fewer than `min_nb_good_samples` rows are dropped. The order of `results` is
/// kept.
pub fn get_daily_medians(results: &[DailyResult], params: &OverlapParams) -> Vec<DailyMedian> {
    results
        .iter()
        .filter(|day| {
            let enough = !day.samples.is_empty() && day.samples.len() >= params.min_nb_good_samples;
            if !enough {
                info!(
                    "{}: {} sample(s), below {}, day skipped",
                    day.date,
                    day.samples.len(),
                    params.min_nb_good_samples
                );
            }
            enough
        })
        .map(|day| {
            let temperatures: Vec<f64> = day
                .samples
                .iter()
                .map(|s| s.internal_temperature)
                .collect();
            let overlap = (0..day.range.len())
                .map(|bin| {
                    let column: Vec<f64> = day
                        .samples
                        .iter()
                        .map(|s| s.overlap.get(bin).copied().unwrap_or(f64::NAN))
                        .collect();
                    nanmedian(&column)
                })
                .collect();
            DailyMedian {
                date: day.date,
                temperature: nanmedian(&temperatures) - ZERO_CELSIUS_IN_KELVIN,
                overlap,
                n_samples: day.samples.len(),
            }
        })
        .collect()
}

/// Regression of the integrated relative difference over every available day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    pub r2: Option<f64>,
}

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateSpan {
    pub first: CalendarDate,
    pub last: CalendarDate,
}

/// Temperature model of one optical module.
///
/// Per-bin coefficients are `None` where the regression is undefined (no valid overlap or
/// no spread of the difference).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureModel {
    pub meta: InstrumentMeta,
    pub range: Vec<Meter>,
    pub range_resolution: Meter,
    /// `a(z)`, percent per °C
    pub slope: Vec<Option<f64>>,
    /// `b(z)`, percent
    pub intercept: Vec<Option<f64>>,
    pub r2: Vec<Option<f64>>,
    pub baseline: Baseline,
    pub reference_overlap: ReferenceOverlap,
    /// Days with a daily result in the requested range
    pub available: DateSpan,
    /// Days entering the per-bin regression
    pub selected: DateSpan,
    pub n_days: usize,
    pub n_samples: usize,
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

impl TemperatureModel {
    /// Overlap function predicted at an internal temperature.
    ///
    /// Arguments
    /// -----------------
    /// * `temperature`: internal temperature of the optical module in °C.
    ///
    /// Return
    /// ----------
    /// * One value per range bin, NaN where the model has no coefficient.
    pub fn corrected_overlap(&self, temperature: Celsius) -> Vec<f64> {
        self.slope
            .iter()
            .zip(&self.intercept)
            .zip(&self.reference_overlap.values)
            .map(|((a, b), ov_ref)| match (a, b) {
                (Some(a), Some(b)) => {
                    let dif = a * temperature + b;
                    1.0 / (dif / 100.0 / ov_ref + 1.0 / ov_ref)
                }
                _ => f64::NAN,
            })
            .collect()
    }
}

fn distinct_temperatures(days: &[DailyMedian]) -> usize {
    days.iter()
        .map(|d| d.temperature)
        .filter(|t| !t.is_nan())
        .sorted_by(|a, b| a.total_cmp(b))
        .dedup()
        .count()
}

fn date_span(days: &[DailyMedian]) -> Option<DateSpan> {
    let (first, last) = days.iter().map(|d| d.date).minmax().into_option()?;
    Some(DateSpan { first, last })
}

/// Build the temperature model of one optical module from its daily result files.
///
/// Return
/// ----------
/// * `Err(OverlapError::FormatMismatch)` if the files disagree on the range geometry or do
///   not match the reference overlap.
/// * `Err(OverlapError::DegenerateFit)` when every usable day, or every selected day, has the
///   same temperature.
/// * `Err(OverlapError::InsufficientData)` with fewer than `min_distinct_temperatures`
///   distinct daily temperatures.
pub fn build_module_model(
    files: &[DailyFile],
    reference: &ReferenceOverlap,
    params: &OverlapParams,
) -> Result<TemperatureModel, OverlapError> {
    let results = read_module_results(files)?;
    let first = results
        .first()
        .ok_or_else(|| OverlapError::NoData("no daily result for the module".into()))?;
    reference.check_bins(first.range.len())?;

    let days = get_daily_medians(&results, params);
    let distinct = distinct_temperatures(&days);
    if distinct == 1 {
        return Err(OverlapError::DegenerateFit(format!(
            "{} usable day(s) share a single temperature",
            days.len()
        )));
    }
    if distinct < params.min_distinct_temperatures {
        return Err(OverlapError::InsufficientData(format!(
            "{} usable day(s) with {distinct} distinct temperature(s), {} required",
            days.len(),
            params.min_distinct_temperatures
        )));
    }

    let temperatures: Vec<Celsius> = days.iter().map(|d| d.temperature).collect();
    let reldiff: Vec<Vec<f64>> = days
        .iter()
        .map(|d| relative_difference(reference, &d.overlap))
        .collect();
    let integrated: Vec<f64> = reldiff
        .iter()
        .map(|d| integrated_difference(reference, d))
        .collect();

    let prefixes = do_regression_1(&temperatures, &integrated);
    let r2: Vec<f64> = prefixes.iter().map(|f| f.r2).collect();
    let n_selected = choose_n_check_r2_diff_window(&r2, params);
    let selected = &days[..n_selected];

    let per_bin = do_regression_2(&temperatures[..n_selected], &reldiff[..n_selected])?;
    let baseline = prefixes.last().copied().map_or(
        Baseline {
            alpha: None,
            beta: None,
            r2: None,
        },
        |f: Regression| Baseline {
            alpha: finite(f.alpha),
            beta: finite(f.beta),
            r2: finite(f.r2),
        },
    );

    let (Some(available), Some(selected_span)) = (date_span(&days), date_span(selected)) else {
        return Err(OverlapError::InsufficientData("no usable day".into()));
    };

    Ok(TemperatureModel {
        meta: first.meta.clone(),
        range: first.range.clone(),
        range_resolution: first.range_resolution,
        slope: per_bin.iter().map(|f| finite(f.beta)).collect(),
        intercept: per_bin.iter().map(|f| finite(f.alpha)).collect(),
        r2: per_bin.iter().map(|f| finite(f.r2)).collect(),
        baseline,
        reference_overlap: reference.clone(),
        available,
        selected: selected_span,
        n_days: n_selected,
        n_samples: selected.iter().map(|d| d.n_samples).sum(),
    })
}

/// Build one temperature model per optical module found in `dir` for `[date_start, date_stop]`.
///
/// Return
/// ----------
/// * The outcome of every module, or an error when no daily result is available at all.
pub fn build_temperature_models(
    dir: &Utf8Path,
    date_start: CalendarDate,
    date_stop: CalendarDate,
    reference: &ReferenceOverlap,
    params: &OverlapParams,
) -> Result<BTreeMap<OpticalModuleId, Result<TemperatureModel, OverlapError>>, OverlapError> {
    let files = check_dates_available(dir, date_start, date_stop)?;
    Ok(check_optical_module(files)
        .into_iter()
        .map(|(module, files)| {
            let outcome = build_module_model(&files, reference, params);
            match &outcome {
                Ok(model) => info!(
                    "{module}: model from {} day(s) ({} to {}), {} sample(s)",
                    model.n_days, model.selected.first, model.selected.last, model.n_samples
                ),
                Err(e) => warn!("{module}: no temperature model: {e}"),
            }
            (module, outcome)
        })
        .collect())
}

/// Produced as soon as one module has a model. Modules without enough temperature spread
/// count as empty, not as failures.
pub fn models_status(
    outcomes: &BTreeMap<OpticalModuleId, Result<TemperatureModel, OverlapError>>,
) -> RunStatus {
    let produced = outcomes.values().filter(|o| o.is_ok()).count();
    let errors = outcomes
        .values()
        .filter(|o| o.as_ref().is_err_and(|e| !e.is_expected_empty()))
        .count();
    RunStatus::from_counts(produced, errors)
}

#[cfg(test)]
mod temperature_model_test {
    use super::*;
    use crate::daily_result::DailySample;
    use crate::profiles::test_support;
    use crate::time::epoch_from_unix_rounded;
    use approx::assert_relative_eq;

    fn sample(temperature: f64, overlap: Vec<f64>) -> DailySample {
        DailySample {
            start: epoch_from_unix_rounded(test_support::T0),
            end: epoch_from_unix_rounded(test_support::T0 + 1800.0),
            rng_lower: 510.0,
            rng_upper: 810.0,
            internal_temperature: temperature,
            score: 0.5,
            overlap,
        }
    }

    fn day(day: u8, samples: Vec<DailySample>) -> DailyResult {
        DailyResult {
            date: CalendarDate::new(2023, 2, day).unwrap(),
            meta: InstrumentMeta::default(),
            range: vec![15.0, 30.0, 45.0],
            range_resolution: 15.0,
            samples,
        }
    }

    #[test]
    fn test_daily_medians() {
        let results = vec![
            day(
                1,
                vec![
                    sample(280.15, vec![0.1, 0.5, 1.0]),
                    sample(290.15, vec![0.3, 0.7, 1.0]),
                    sample(300.15, vec![0.2, 0.9, f64::NAN]),
                ],
            ),
            day(2, vec![]),
        ];
        let params = OverlapParams::default();
        let medians = get_daily_medians(&results, &params);
        assert_eq!(medians.len(), 1);
        assert_eq!(medians[0].n_samples, 3);
        assert_relative_eq!(medians[0].temperature, 17.0, epsilon = 1e-9);
        assert_relative_eq!(medians[0].overlap[0], 0.2);
        assert_relative_eq!(medians[0].overlap[1], 0.7);
        assert_relative_eq!(medians[0].overlap[2], 1.0);

        let strict = OverlapParams::builder().min_nb_good_samples(4).build().unwrap();
        assert!(get_daily_medians(&results, &strict).is_empty());
    }

    #[test]
    fn test_corrected_overlap_inverts_difference() {
        let reference = ReferenceOverlap::new(vec![0.5, 1.0, 1.0]);
        let model = TemperatureModel {
            meta: InstrumentMeta::default(),
            range: vec![15.0, 30.0, 45.0],
            range_resolution: 15.0,
            slope: vec![Some(0.1), Some(0.0), None],
            intercept: vec![Some(2.0), Some(0.0), None],
            r2: vec![Some(1.0), None, None],
            baseline: Baseline {
                alpha: None,
                beta: None,
                r2: None,
            },
            reference_overlap: reference,
            available: DateSpan {
                first: CalendarDate::new(2023, 2, 1).unwrap(),
                last: CalendarDate::new(2023, 2, 1).unwrap(),
            },
            selected: DateSpan {
                first: CalendarDate::new(2023, 2, 1).unwrap(),
                last: CalendarDate::new(2023, 2, 1).unwrap(),
            },
            n_days: 1,
            n_samples: 1,
        };

        let ov = model.corrected_overlap(10.0);
        // Dif = 3 % -> ov = ov_ref / 1.03
        assert_relative_eq!(ov[0], 0.5 / 1.03, epsilon = 1e-12);
        assert_relative_eq!(ov[1], 1.0);
        assert!(ov[2].is_nan());

        let reldiff = relative_difference(&model.reference_overlap, &ov);
        assert_relative_eq!(100.0 * reldiff[0], 3.0, epsilon = 1e-9);
    }
}
