//! From decoded day-files to a [`ProfileSet`].
//!
//! Normalization validates the declared range geometry, orders the profiles, fills time gaps
//! with placeholder profiles and interpolates the internal temperature so that every
//! downstream stage sees contiguous time indices on one range grid.
use hifitime::Epoch;
use itertools::Itertools;
use log::debug;
use nalgebra::DMatrix;

use super::{ProfileSet, ProfileStatus, RawDay, RawProfile, SignalGrid};
use crate::constants::{Kelvin, NO_CLOUD_BASE, RANGE_RESOLUTION_TOLERANCE};
use crate::numerics::stats::mode;
use crate::overlap_errors::OverlapError;
use crate::time::{epoch_from_unix_rounded, unix_seconds};

/// Check the range axis against the declared resolution and every profile's bin count.
pub fn validate_geometry(raw: &RawDay) -> Result<(), OverlapError> {
    let n_bins = raw.range.len();
    if n_bins < 2 {
        return Err(OverlapError::FormatMismatch(format!(
            "range axis has {n_bins} bins"
        )));
    }
    if !(raw.range_resolution > 0.0) {
        return Err(OverlapError::FormatMismatch(format!(
            "declared range resolution {} is not positive",
            raw.range_resolution
        )));
    }
    for (lo, hi) in raw.range.iter().tuple_windows() {
        let step = hi - lo;
        if (step - raw.range_resolution).abs() > RANGE_RESOLUTION_TOLERANCE * raw.range_resolution
        {
            return Err(OverlapError::FormatMismatch(format!(
                "range step {step} between {lo} m and {hi} m does not match the declared resolution {}",
                raw.range_resolution
            )));
        }
    }
    if let Some(p) = raw.profiles.iter().find(|p| p.signal.len() != n_bins) {
        return Err(OverlapError::FormatMismatch(format!(
            "profile at {} has {} bins, the range axis has {n_bins}",
            p.time,
            p.signal.len()
        )));
    }
    Ok(())
}

/// Concatenate several decoded files of the same day.
///
/// Return
/// ----------
/// * `Err(OverlapError::FormatMismatch)` when the files disagree on instrument attributes or
///   range geometry, `Err(OverlapError::NoData)` for an empty list.
pub fn merge_days(days: Vec<RawDay>) -> Result<RawDay, OverlapError> {
    let mut iter = days.into_iter();
    let mut merged = iter
        .next()
        .ok_or_else(|| OverlapError::NoData("no day-file to merge".into()))?;
    for day in iter {
        if day.meta != merged.meta
            || day.range != merged.range
            || day.range_resolution != merged.range_resolution
        {
            return Err(OverlapError::FormatMismatch(
                "day-files of one day disagree on instrument or range geometry".into(),
            ));
        }
        merged.profiles.extend(day.profiles);
    }
    Ok(merged)
}

/// Linear interpolation of the reported temperatures onto every timestamp.
///
/// Values are carried backwards before the first and forwards after the last report.
pub fn interpolate_temperature(
    times: &[f64],
    reported: &[Option<Kelvin>],
) -> Result<Vec<Kelvin>, OverlapError> {
    let known: Vec<(f64, Kelvin)> = times
        .iter()
        .zip(reported)
        .filter_map(|(t, v)| v.filter(|v| v.is_finite()).map(|v| (*t, v)))
        .collect();
    if known.is_empty() {
        return Err(OverlapError::FormatMismatch(
            "no internal temperature reported for the day".into(),
        ));
    }

    Ok(times
        .iter()
        .map(|&t| {
            let next = known.partition_point(|(kt, _)| *kt < t);
            match (next.checked_sub(1).map(|i| known[i]), known.get(next)) {
                (_, Some(&(kt, kv))) if kt == t => kv,
                (Some((t0, v0)), Some(&(t1, v1))) => v0 + (v1 - v0) * (t - t0) / (t1 - t0),
                (Some((_, v0)), None) => v0,
                (None, Some(&(_, v1))) => v1,
                (None, None) => unreachable!("known is not empty"),
            }
        })
        .collect())
}

fn placeholder(time: Epoch, n_bins: usize) -> RawProfile {
    RawProfile {
        time,
        signal: vec![None; n_bins],
        internal_temperature: None,
        sky_condition: None,
        cloud_base: Vec::new(),
    }
}

/// Sort, round and gap-fill the profiles.
///
/// The nominal interval is the mode of the whole-second timestamp differences. A difference
/// of `k` nominal intervals (rounded) gets `k - 1` placeholders at `previous + j * interval`.
///
/// Return
/// ----------
/// * The filled profiles with their status and the nominal interval (s), or
///   `Err(OverlapError::FormatMismatch)` on duplicated timestamps.
pub fn fill_gaps(
    mut profiles: Vec<RawProfile>,
    n_bins: usize,
) -> Result<(Vec<RawProfile>, Vec<ProfileStatus>, Option<i64>), OverlapError> {
    for p in profiles.iter_mut() {
        p.time = epoch_from_unix_rounded(unix_seconds(p.time));
    }
    profiles.sort_by(|a, b| unix_seconds(a.time).total_cmp(&unix_seconds(b.time)));

    let seconds: Vec<i64> = profiles
        .iter()
        .map(|p| unix_seconds(p.time) as i64)
        .collect();
    let deltas: Vec<i64> = seconds.iter().tuple_windows().map(|(a, b)| b - a).collect();
    if let Some(pos) = deltas.iter().position(|d| *d <= 0) {
        return Err(OverlapError::FormatMismatch(format!(
            "duplicated timestamp {}",
            profiles[pos + 1].time
        )));
    }

    let Some(interval) = mode(&deltas) else {
        let status = vec![ProfileStatus::Measured; profiles.len()];
        return Ok((profiles, status, None));
    };

    let mut filled = Vec::with_capacity(profiles.len());
    let mut status = Vec::with_capacity(profiles.len());
    let mut inserted = 0usize;
    for (i, profile) in profiles.into_iter().enumerate() {
        if i > 0 {
            let gaps = (deltas[i - 1] as f64 / interval as f64).round() as i64;
            for k in 1..gaps {
                let time = epoch_from_unix_rounded((seconds[i - 1] + k * interval) as f64);
                filled.push(placeholder(time, n_bins));
                status.push(ProfileStatus::Missing);
                inserted += 1;
            }
        }
        filled.push(profile);
        status.push(ProfileStatus::Measured);
    }
    if inserted > 0 {
        debug!("inserted {inserted} placeholder profiles (nominal interval {interval} s)");
    }

    Ok((filled, status, Some(interval)))
}

impl ProfileSet {
    /// Normalize a decoded day.
    ///
    /// Arguments
    /// -----------------
    /// * `raw`: decoded day (one or several merged files).
    ///
    /// Return
    /// ----------
    /// * The gap-filled [`ProfileSet`], or `Err(OverlapError::FormatMismatch)` when the
    ///   geometry does not match its declaration, timestamps repeat or no temperature exists.
    pub fn from_raw(raw: RawDay) -> Result<Self, OverlapError> {
        validate_geometry(&raw)?;
        let n_bins = raw.range.len();

        let (profiles, status, interval) = fill_gaps(raw.profiles, n_bins)?;

        let times: Vec<Epoch> = profiles.iter().map(|p| p.time).collect();
        let seconds: Vec<f64> = times.iter().map(|t| unix_seconds(*t)).collect();
        let reported: Vec<Option<Kelvin>> = profiles
            .iter()
            .map(|p| p.internal_temperature)
            .collect();
        let temperature = if profiles.is_empty() {
            Vec::new()
        } else {
            interpolate_temperature(&seconds, &reported)?
        };

        let data = DMatrix::from_fn(profiles.len(), n_bins, |t, r| {
            profiles[t].signal[r].unwrap_or(f64::NAN)
        });

        let lowest_cloud_base = profiles
            .iter()
            .zip(&status)
            .map(|(p, s)| match s {
                ProfileStatus::Missing => None,
                ProfileStatus::Measured => Some(
                    p.cloud_base
                        .iter()
                        .map(|c| match c {
                            Some(h) if *h >= 0.0 => *h,
                            _ => NO_CLOUD_BASE,
                        })
                        .fold(NO_CLOUD_BASE, f64::min),
                ),
            })
            .collect();

        Ok(ProfileSet {
            meta: raw.meta,
            range: raw.range,
            range_resolution: raw.range_resolution,
            sky_condition: profiles.iter().map(|p| p.sky_condition).collect(),
            times,
            status,
            temperature,
            lowest_cloud_base,
            signal: SignalGrid::from_matrix(data),
            sampling_interval: interval.map(|s| s as f64),
        })
    }
}
