#![allow(dead_code)]

use std::f64::consts::{LN_10, PI};

use camino::{Utf8Path, Utf8PathBuf};
use hifitime::Epoch;
use overlap_probe::config::reference_overlap::ReferenceOverlap;
use overlap_probe::config::OverlapParams;
use overlap_probe::constants::ZERO_CELSIUS_IN_KELVIN;
use overlap_probe::daily_result::{DailyResult, DailySample};
use overlap_probe::profiles::l1_csv_reader::write_day;
use overlap_probe::profiles::{InstrumentMeta, RawDay, RawProfile};
use overlap_probe::time::CalendarDate;

/// 2023-02-14T00:00:00 UTC
pub const T0: f64 = 1_676_332_800.0;
pub const N_BINS: usize = 200;
pub const LOG_SLOPE: f64 = -1e-5 / LN_10;

pub fn range_axis() -> Vec<f64> {
    (0..N_BINS).map(|i| 15.0 * (i + 1) as f64).collect()
}

/// Raised cosine reaching full overlap at 900 m.
pub fn reference() -> ReferenceOverlap {
    ReferenceOverlap::new(
        range_axis()
            .iter()
            .map(|r| {
                if *r < 900.0 {
                    0.5 * (1.0 - (PI * r / 900.0).cos())
                } else {
                    1.0
                }
            })
            .collect(),
    )
}

/// Overlap error left in the clear-sky signal, zero from 450 m.
pub fn perturbation(r: f64) -> f64 {
    if r < 450.0 {
        0.05 * (1.0 - r / 450.0)
    } else {
        0.0
    }
}

pub fn meta() -> InstrumentMeta {
    InstrumentMeta {
        optical_module_id: "TUB120011".into(),
        site_location: "Payerne, Switzerland".into(),
        wigos_station_id: "0-20000-0-06610".into(),
        instrument_id: "A".into(),
        instrument_serial_number: "CHM120106".into(),
    }
}

/// `n_times` profiles every `interval` seconds of an aerosol-free atmosphere.
pub fn synthetic_day(n_times: usize, interval: f64, sky_condition: i32) -> RawDay {
    let range = range_axis();
    let signal: Vec<Option<f64>> = range
        .iter()
        .map(|r| Some(1e5 * 10f64.powf(LOG_SLOPE * r) * (1.0 + perturbation(*r))))
        .collect();
    RawDay {
        meta: meta(),
        range,
        range_resolution: 15.0,
        profiles: (0..n_times)
            .map(|t| RawProfile {
                time: Epoch::from_unix_seconds(T0 + interval * t as f64),
                signal: signal.clone(),
                internal_temperature: Some(300.0),
                sky_condition: Some(sky_condition),
                cloud_base: vec![Some(-1.0)],
            })
            .collect(),
    }
}

pub fn write_day_file(day: &RawDay, path: &Utf8Path) {
    let file = std::fs::File::create(path).unwrap();
    write_day(day, std::io::BufWriter::new(file)).unwrap();
}

/// Small search grid that keeps the synthetic days fast to process.
pub fn test_params() -> OverlapParams {
    OverlapParams::builder()
        .time_interval_length(30.0)
        .d_fit_time(30.0)
        .dt_sliding_variance(5.0)
        .max_fit_range(1500.0)
        .d_fit_range(60.0)
        .d_fit_length(60.0)
        .min_expected_zero_fit_value(3.0)
        .max_expected_zero_fit_value(8.0)
        .build()
        .unwrap()
}

pub fn utf8_dir(dir: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8Path::from_path(dir.path()).unwrap().to_path_buf()
}

/// Weight of the temperature dependence, vanishing at full overlap.
pub fn weight(r: f64) -> f64 {
    if r < 900.0 {
        1.0 - r / 900.0
    } else {
        0.0
    }
}

pub fn slope(r: f64) -> f64 {
    0.1 * weight(r)
}

pub fn intercept(r: f64) -> f64 {
    2.0 * weight(r)
}

/// Daily result whose overlap follows `Dif = slope * T + intercept` exactly.
pub fn linear_daily_result(date: CalendarDate, temperature: f64, n_samples: usize) -> DailyResult {
    let range = range_axis();
    let overlap: Vec<f64> = range
        .iter()
        .zip(&reference().values)
        .map(|(r, ov_ref)| {
            let dif = slope(*r) * temperature + intercept(*r);
            ov_ref / (1.0 + dif / 100.0)
        })
        .collect();
    let start = date.midnight();
    let sample = DailySample {
        start,
        end: start + hifitime::Duration::from_seconds(1800.0),
        rng_lower: 510.0,
        rng_upper: 810.0,
        internal_temperature: temperature + ZERO_CELSIUS_IN_KELVIN,
        score: 0.5,
        overlap,
    };
    DailyResult {
        date,
        meta: meta(),
        range,
        range_resolution: 15.0,
        samples: vec![sample; n_samples],
    }
}
