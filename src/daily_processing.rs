//! # Daily processing
//!
//! Stage 1 of the pipeline: from L1 day-files to daily results.
//!
//! ## Overview
//! -----------------
//! [`process_day`] runs the per-day chain on a normalized [`ProfileSet`]:
//! time windows → [`crate::pre_checks`] → [`crate::process_checks`] →
//! [`crate::sample_sorter`] → [`DailyResult`].
//!
//! [`run_daily_batch`] drives it over a list of day-files: files are decoded, grouped by
//! (optical module, day), merged and processed independently. A failing day never stops the
//! batch; every outcome is collected in a [`BatchReport`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use camino::Utf8Path;
//! use overlap_probe::config::reference_overlap::ReferenceOverlap;
//! use overlap_probe::config::OverlapParams;
//! use overlap_probe::daily_processing::{collect_day_files, run_daily_batch, BatchOptions};
//!
//! let params = OverlapParams::from_config_file(Utf8Path::new("config.csv")).unwrap();
//! let reference = ReferenceOverlap::from_file(Utf8Path::new("ov_ref.txt")).unwrap();
//! let files = collect_day_files(Utf8Path::new("L1/")).unwrap();
//! let options = BatchOptions::new(Utf8Path::new("out"));
//! let report = run_daily_batch(&files, &reference, &params, &options);
//! println!("{} daily results", report.produced());
//! ```
use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};

use crate::config::derived::DerivedSettings;
use crate::config::reference_overlap::ReferenceOverlap;
use crate::config::OverlapParams;
use crate::constants::{DailyOutcomes, OpticalModuleId, DAILY_RESULT_PREFIX};
use crate::daily_result::{DailyFileName, DailyResult};
use crate::overlap_errors::{OverlapError, RunStatus};
use crate::pre_checks::{all_clear_sky, make_time_windows, run_pre_checks, PreCheckOutcome};
use crate::process_checks::{evaluate_time_window, WindowContext};
use crate::profiles::l1_csv_reader::read_day_file;
use crate::profiles::normalize::merge_days;
use crate::profiles::{ProfileSet, RawDay};
use crate::sample_sorter::do_sort_checks;
use crate::time::{epoch_from_unix_rounded, unix_seconds, CalendarDate};

/// Find the overlap samples of one day.
///
/// Arguments
/// -----------------
/// * `set`: the normalized day.
/// * `reference`: reference overlap on the same range axis.
/// * `params`: processing parameters.
///
/// Return
/// ----------
/// * `Ok(Some(result))` with at least one sample, `Ok(None)` when no time window yields a
///   sample, `Err` for a reference overlap or range axis the method cannot work with.
pub fn process_day(
    set: &ProfileSet,
    reference: &ReferenceOverlap,
    params: &OverlapParams,
) -> Result<Option<DailyResult>, OverlapError> {
    let Some(date) = set.date() else {
        info!("empty day, nothing to process");
        return Ok(None);
    };
    if set.measured_count() == 0 {
        info!("{date}: no measured profile");
        return Ok(None);
    }
    let derived = DerivedSettings::resolve(params, &set.range, set.range_resolution, reference)?;

    let clear = all_clear_sky(set, params);
    let mut evaluated = Vec::new();
    for window in make_time_windows(set, params) {
        let max_available_range = match run_pre_checks(set, &window, &clear, params, &derived)? {
            PreCheckOutcome::Passed {
                max_available_range,
            } => max_available_range,
            PreCheckOutcome::Failed(check) => {
                debug!(
                    "{date}: time window {}..={} stopped by {check}",
                    window.start, window.end
                );
                continue;
            }
        };
        let ctx = match WindowContext::new(
            set,
            reference,
            params,
            &derived,
            window,
            max_available_range,
        ) {
            Ok(ctx) => ctx,
            Err(OverlapError::InsufficientData(msg)) => {
                debug!("{date}: time window {}..={} skipped, {msg}", window.start, window.end);
                continue;
            }
            Err(e) => return Err(e),
        };
        let evaluations = evaluate_time_window(&ctx)?;
        evaluated.push((ctx, evaluations));
    }

    let samples = do_sort_checks(&evaluated, params);
    if samples.is_empty() {
        info!(
            "{date}: no overlap sample ({} time windows passed the pre-checks)",
            evaluated.len()
        );
        return Ok(None);
    }
    info!("{date}: {} overlap sample(s)", samples.len());
    Ok(Some(DailyResult::new(
        date,
        set.meta.clone(),
        set.range.clone(),
        set.range_resolution,
        &samples,
    )))
}

/// List the day-files under `input`.
///
/// A file is returned as is; a directory is walked recursively and every `.csv` file that is
/// not a daily result is returned, sorted by path.
pub fn collect_day_files(input: &Utf8Path) -> Result<Vec<Utf8PathBuf>, OverlapError> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        return Err(OverlapError::NoData(format!("{input} does not exist")));
    }

    let mut files = Vec::new();
    let mut pending = vec![input.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in dir.read_dir_utf8()? {
            let path = entry?.into_path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension() == Some("csv")
                && !path
                    .file_name()
                    .is_some_and(|n| n.starts_with(DAILY_RESULT_PREFIX))
            {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub output: Utf8PathBuf,
    /// Leave days whose daily result already exists untouched
    pub skip_existing: bool,
    /// Write the daily results; otherwise they are only returned
    pub write: bool,
}

impl BatchOptions {
    pub fn new(output: &Utf8Path) -> Self {
        BatchOptions {
            output: output.to_path_buf(),
            skip_existing: false,
            write: true,
        }
    }
}

/// What happened to one day.
#[derive(Debug, Clone, PartialEq)]
pub enum DayStatus {
    Written(Utf8PathBuf),
    /// Result computed but not written
    Computed(DailyResult),
    /// A result already existed at this path
    Skipped(Utf8PathBuf),
    NoSample,
}

/// Outcomes of a batch, per optical module and day.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub days: BTreeMap<OpticalModuleId, DailyOutcomes<DayStatus>>,
    /// Files that could not be decoded
    pub unreadable: Vec<(Utf8PathBuf, OverlapError)>,
}

impl BatchReport {
    fn statuses(&self) -> impl Iterator<Item = &Result<DayStatus, OverlapError>> {
        self.days.values().flat_map(|days| days.values())
    }

    /// Days with a daily result (written, computed or already present).
    pub fn produced(&self) -> usize {
        self.statuses()
            .filter(|s| {
                matches!(
                    s,
                    Ok(DayStatus::Written(_) | DayStatus::Computed(_) | DayStatus::Skipped(_))
                )
            })
            .count()
    }

    pub fn failed(&self) -> usize {
        self.statuses().filter(|s| s.is_err()).count() + self.unreadable.len()
    }

    /// Produced as soon as one day has a result; failed only if nothing was produced and a
    /// day or file failed with a processing error.
    pub fn status(&self) -> RunStatus {
        let errors = self
            .statuses()
            .filter(|s| s.as_ref().is_err_and(|e| !e.is_expected_empty()))
            .count()
            + self.unreadable.len();
        RunStatus::from_counts(self.produced(), errors)
    }
}

/// Process one group of day-files.
fn process_group(
    days: Vec<RawDay>,
    reference: &ReferenceOverlap,
    params: &OverlapParams,
    options: &BatchOptions,
) -> Result<DayStatus, OverlapError> {
    let set = ProfileSet::from_raw(merge_days(days)?)?;
    match process_day(&set, reference, params)? {
        None => Ok(DayStatus::NoSample),
        Some(result) if options.write => {
            Ok(DayStatus::Written(result.write_to_dir(&options.output)?))
        }
        Some(result) => Ok(DayStatus::Computed(result)),
    }
}

/// Process a list of day-files.
///
/// Arguments
/// -----------------
/// * `files`: day-files, see [`collect_day_files`].
/// * `reference`: reference overlap.
/// * `params`: processing parameters.
/// * `options`: output directory, checkpointing and write switch.
///
/// Return
/// ----------
/// * A [`BatchReport`]; decoding, format and numeric failures are isolated per file or day.
pub fn run_daily_batch(
    files: &[Utf8PathBuf],
    reference: &ReferenceOverlap,
    params: &OverlapParams,
    options: &BatchOptions,
) -> BatchReport {
    let mut report = BatchReport::default();
    let mut groups: BTreeMap<(OpticalModuleId, CalendarDate), Vec<RawDay>> = BTreeMap::new();

    for path in files {
        match read_day_file(path) {
            Ok(day) => {
                let Some(first) = day
                    .profiles
                    .iter()
                    .map(|p| unix_seconds(p.time))
                    .reduce(f64::min)
                else {
                    warn!("{path}: no profile");
                    continue;
                };
                let date = CalendarDate::of_epoch(epoch_from_unix_rounded(first));
                groups
                    .entry((day.meta.optical_module_id.clone(), date))
                    .or_default()
                    .push(day);
            }
            Err(e) => {
                warn!("{path}: {e}");
                report.unreadable.push((path.clone(), e));
            }
        }
    }

    for ((module, date), days) in groups {
        if options.skip_existing {
            let path = DailyFileName::for_day(&days[0].meta, date).path_in(&options.output);
            if path.is_file() {
                info!("{date} {module}: {path} exists, skipped");
                report
                    .days
                    .entry(module)
                    .or_default()
                    .insert(date, Ok(DayStatus::Skipped(path)));
                continue;
            }
        }

        let status = process_group(days, reference, params, options);
        match &status {
            Ok(DayStatus::Written(path)) => info!("{date} {module}: wrote {path}"),
            Ok(_) => {}
            Err(e) => warn!("{date} {module}: {e}"),
        }
        report.days.entry(module).or_default().insert(date, status);
    }
    report
}
