//! Selection of the daily results entering a temperature model.
use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use log::info;

use crate::constants::{OpticalModuleId, RANGE_RESOLUTION_TOLERANCE};
use crate::daily_result::{DailyFileName, DailyResult};
use crate::overlap_errors::OverlapError;
use crate::time::CalendarDate;

/// A daily result file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyFile {
    pub name: DailyFileName,
    pub path: Utf8PathBuf,
}

/// Daily result files under `dir` (recursively) dated within `[date_start, date_stop]`.
///
/// Return
/// ----------
/// * The files ordered by date then path, `Err(OverlapError::NoData)` when there is none and
///   `Err(OverlapError::InvalidDate)` when `date_start > date_stop`.
pub fn check_dates_available(
    dir: &Utf8Path,
    date_start: CalendarDate,
    date_stop: CalendarDate,
) -> Result<Vec<DailyFile>, OverlapError> {
    if date_start > date_stop {
        return Err(OverlapError::InvalidDate(format!(
            "start {date_start} is after stop {date_stop}"
        )));
    }
    if !dir.is_dir() {
        return Err(OverlapError::NoData(format!("{dir} is not a directory")));
    }

    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in current.read_dir_utf8()? {
            let path = entry?.into_path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            let Some(name) = path.file_name().and_then(DailyFileName::parse) else {
                continue;
            };
            if (date_start..=date_stop).contains(&name.date) {
                files.push(DailyFile { name, path });
            }
        }
    }
    if files.is_empty() {
        return Err(OverlapError::NoData(format!(
            "no daily result in {dir} between {date_start} and {date_stop}"
        )));
    }
    files.sort_by(|a, b| a.name.date.cmp(&b.name.date).then(a.path.cmp(&b.path)));
    info!(
        "{} daily result(s) available between {date_start} and {date_stop}",
        files.len()
    );
    Ok(files)
}

/// Partition daily result files by optical module.
pub fn check_optical_module(files: Vec<DailyFile>) -> BTreeMap<OpticalModuleId, Vec<DailyFile>> {
    let mut modules: BTreeMap<OpticalModuleId, Vec<DailyFile>> = BTreeMap::new();
    for file in files {
        modules
            .entry(file.name.optical_module_id.clone())
            .or_default()
            .push(file);
    }
    info!(
        "optical module(s): {}",
        modules.keys().cloned().collect::<Vec<_>>().join(", ")
    );
    modules
}

/// Read the daily results of one optical module and check they share one range geometry.
///
/// Return
/// ----------
/// * The results in file order, or `Err(OverlapError::FormatMismatch)` naming the first day
///   whose range resolution or range axis differs from the first file.
pub fn read_module_results(files: &[DailyFile]) -> Result<Vec<DailyResult>, OverlapError> {
    let results = files
        .iter()
        .map(|f| DailyResult::read_file(&f.path))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(first) = results.first() {
        for r in &results[1..] {
            let resolution_changed = (r.range_resolution - first.range_resolution).abs()
                > RANGE_RESOLUTION_TOLERANCE * first.range_resolution.abs();
            if resolution_changed || r.range.len() != first.range.len() {
                return Err(OverlapError::FormatMismatch(format!(
                    "range resolution changes from {} m ({}) to {} m ({})",
                    first.range_resolution, first.date, r.range_resolution, r.date
                )));
            }
            if r.range != first.range {
                return Err(OverlapError::FormatMismatch(format!(
                    "range axis of {} differs from {}",
                    r.date, first.date
                )));
            }
        }
    }
    Ok(results)
}
