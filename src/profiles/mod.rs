//! # Ceilometer profiles
//!
//! Typed containers for one day of range-resolved backscatter profiles.
//!
//! ## Overview
//! -----------------
//! * [`RawDay`] / [`RawProfile`] – what a decoder hands over: timestamps as read, signal
//!   bins as `Option<f64>` (`None` = missing), optional temperature and sky information.
//! * [`ProfileSet`] – the normalized day: strictly increasing timestamps without gaps
//!   (placeholders flagged [`ProfileStatus::Missing`]), a temperature for every timestamp and a
//!   dense [`SignalGrid`] (time × range) with bounds-checked accessors.
//!
//! Normalization lives in [`normalize`]; the delimited-text decoder of the L1 day-file lives in
//! [`l1_csv_reader`].
//!
//! ## Missing values
//! -----------------
//! Inside the grid a missing bin is stored as NaN so that the numeric kernels propagate it;
//! every public accessor turns it back into `None`. Nothing is ever replaced by zero.
use std::ops::Range;

use hifitime::Epoch;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::constants::{Kelvin, Meter, Seconds};
use crate::overlap_errors::OverlapError;
use crate::time::CalendarDate;

pub mod l1_csv_reader;
pub mod normalize;

/// Station and instrument attributes carried by every day-file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentMeta {
    pub optical_module_id: String,
    pub site_location: String,
    pub wigos_station_id: String,
    pub instrument_id: String,
    pub instrument_serial_number: String,
}

impl InstrumentMeta {
    /// Site name used in file names: text before the first comma, spaces as underscores.
    pub fn location(&self) -> String {
        let site = self
            .site_location
            .split(',')
            .next()
            .unwrap_or_default()
            .trim();
        if site.is_empty() {
            "unknown".to_string()
        } else {
            site.replace(' ', "_")
        }
    }
}

/// One timestamp as decoded from the instrument file.
#[derive(Debug, Clone, PartialEq)]
pub struct RawProfile {
    pub time: Epoch,
    /// Range-corrected signal per bin, `None` where the instrument reported no value
    pub signal: Vec<Option<f64>>,
    pub internal_temperature: Option<Kelvin>,
    /// Sky condition index, 0 for a clear sky
    pub sky_condition: Option<i32>,
    /// Cloud base heights, one per reported layer; negative means no cloud
    pub cloud_base: Vec<Option<Meter>>,
}

/// One decoded day-file.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDay {
    pub meta: InstrumentMeta,
    pub range: Vec<Meter>,
    pub range_resolution: Meter,
    pub profiles: Vec<RawProfile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileStatus {
    Measured,
    /// Placeholder inserted for a missing timestamp
    Missing,
}

/// Dense (time × range) signal with NaN for missing bins.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalGrid {
    data: DMatrix<f64>,
}

impl SignalGrid {
    pub(crate) fn from_matrix(data: DMatrix<f64>) -> Self {
        SignalGrid { data }
    }

    pub fn n_times(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_bins(&self) -> usize {
        self.data.ncols()
    }

    /// Signal at (time, bin); `None` when missing or out of the grid.
    pub fn get(&self, t: usize, r: usize) -> Option<f64> {
        self.data.get((t, r)).copied().filter(|v| !v.is_nan())
    }

    fn check_block(&self, times: &Range<usize>, bins: &Range<usize>) -> Result<(), OverlapError> {
        if times.start >= times.end
            || bins.start >= bins.end
            || times.end > self.n_times()
            || bins.end > self.n_bins()
        {
            return Err(OverlapError::FormatMismatch(format!(
                "block {times:?} x {bins:?} outside a {} x {} grid",
                self.n_times(),
                self.n_bins()
            )));
        }
        Ok(())
    }

    /// `log10(|signal|)` over a block; missing bins and zeros become NaN.
    pub fn log10_abs_block(
        &self,
        times: Range<usize>,
        bins: Range<usize>,
    ) -> Result<DMatrix<f64>, OverlapError> {
        self.check_block(&times, &bins)?;
        Ok(DMatrix::from_fn(times.len(), bins.len(), |i, j| {
            let v = self.data[(times.start + i, bins.start + j)].abs().log10();
            if v.is_finite() {
                v
            } else {
                f64::NAN
            }
        }))
    }

    /// Copy of a block of raw values.
    pub fn block(&self, times: Range<usize>, bins: Range<usize>) -> Result<DMatrix<f64>, OverlapError> {
        self.check_block(&times, &bins)?;
        Ok(self
            .data
            .view((times.start, bins.start), (times.len(), bins.len()))
            .into_owned())
    }
}

/// A normalized day of profiles on a common range grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileSet {
    pub meta: InstrumentMeta,
    pub range: Vec<Meter>,
    pub range_resolution: Meter,
    pub times: Vec<Epoch>,
    pub status: Vec<ProfileStatus>,
    /// Internal temperature of every timestamp, interpolated where it was not reported
    pub temperature: Vec<Kelvin>,
    pub sky_condition: Vec<Option<i32>>,
    /// Lowest cloud base (no-cloud sentinel substituted); `None` for placeholders
    pub lowest_cloud_base: Vec<Option<Meter>>,
    pub signal: SignalGrid,
    /// Nominal sampling interval; `None` with fewer than two timestamps
    pub sampling_interval: Option<Seconds>,
}

impl ProfileSet {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn n_bins(&self) -> usize {
        self.range.len()
    }

    pub fn is_missing(&self, t: usize) -> bool {
        matches!(self.status.get(t), Some(ProfileStatus::Missing) | None)
    }

    pub fn measured_count(&self) -> usize {
        self.status
            .iter()
            .filter(|s| **s == ProfileStatus::Measured)
            .count()
    }

    /// Calendar day of the first profile.
    pub fn date(&self) -> Option<CalendarDate> {
        self.times.first().map(|t| CalendarDate::of_epoch(*t))
    }

    /// Index of the last bin whose range is `<= limit`.
    pub fn last_bin_at_or_below(&self, limit: Meter) -> Option<usize> {
        self.range.iter().rposition(|r| *r <= limit)
    }

    /// Index of the first bin whose range is `>= limit`.
    pub fn first_bin_at_or_above(&self, limit: Meter) -> Option<usize> {
        self.range.iter().position(|r| *r >= limit)
    }
}


#[cfg(test)]
mod profiles_test {
    use super::*;

    #[test]
    fn test_location() {
        let meta = InstrumentMeta {
            site_location: "Payerne, Switzerland".into(),
            ..Default::default()
        };
        assert_eq!(meta.location(), "Payerne");
        let meta = InstrumentMeta {
            site_location: "De Bilt".into(),
            ..Default::default()
        };
        assert_eq!(meta.location(), "De_Bilt");
        assert_eq!(InstrumentMeta::default().location(), "unknown");
    }

    #[test]
    fn test_grid_access() {
        let grid = SignalGrid::from_matrix(DMatrix::from_row_slice(
            2,
            3,
            &[1.0, 10.0, f64::NAN, 100.0, 0.0, -1000.0],
        ));
        assert_eq!(grid.get(0, 1), Some(10.0));
        assert_eq!(grid.get(0, 2), None);
        assert_eq!(grid.get(5, 0), None);

        let logs = grid.log10_abs_block(0..2, 0..3).unwrap();
        assert_eq!(logs[(0, 1)], 1.0);
        assert!(logs[(0, 2)].is_nan());
        assert!(logs[(1, 1)].is_nan());
        assert_eq!(logs[(1, 2)], 3.0);

        assert!(grid.log10_abs_block(0..3, 0..1).is_err());
        assert!(grid.block(1..1, 0..1).is_err());
        assert_eq!(grid.block(1..2, 1..3).unwrap()[(0, 1)], -1000.0);
    }
}
