//! # Constants and type definitions for overlap_probe
//!
//! This module centralizes the **physical constants**, **method constants** and **common type
//! aliases** used across the crate.
//!
//! ## Overview
//!
//! - Unit aliases (metres, Kelvin, degrees Celsius, seconds)
//! - Temperature and time conversions
//! - Fixed thresholds of the overlap method (Hervo et al. 2016)
//! - Naming of the daily result and model artifacts

use std::collections::BTreeMap;

use crate::overlap_errors::OverlapError;
use crate::time::CalendarDate;

// -------------------------------------------------------------------------------------------------
// Units
// -------------------------------------------------------------------------------------------------

/// Altitude / range above the instrument, in metres
pub type Meter = f64;

/// Temperature in Kelvin (instrument internal temperature as reported)
pub type Kelvin = f64;

/// Temperature in degrees Celsius (temperature model abscissa)
pub type Celsius = f64;

/// Duration in seconds
pub type Seconds = f64;

/// Identifier of an optical module (transmit/receive unit) as written by the instrument
pub type OpticalModuleId = String;

/// Outcome of every processed day, keyed by calendar date
pub type DailyOutcomes<T> = BTreeMap<CalendarDate, Result<T, OverlapError>>;

// -------------------------------------------------------------------------------------------------
// Conversions
// -------------------------------------------------------------------------------------------------

/// 0 °C expressed in Kelvin
pub const ZERO_CELSIUS_IN_KELVIN: Kelvin = 273.15;

/// Number of seconds in a minute
pub const SECONDS_PER_MINUTE: Seconds = 60.0;

// -------------------------------------------------------------------------------------------------
// Method constants
// -------------------------------------------------------------------------------------------------

/// Cloud base height substituted when the instrument reports no cloud (negative value)
pub const NO_CLOUD_BASE: Meter = 15_000.0;

/// Reference overlap above which fit windows may start
pub const MIN_FIT_RANGE_OVERLAP: f64 = 0.6;

/// Reference overlap value considered as full overlap
pub const FULL_OVERLAP: f64 = 1.0;

/// Reference overlap above which relative differences enter the integrated score of the model
pub const REL_DIFF_MIN_OVERLAP: f64 = 0.05;

/// Bins added above the first gradient exceedance when limiting the usable range
pub const GRADIENT_LIMIT_OFFSET_BINS: usize = 10;

/// Relative tolerance between the declared range resolution and the spacing of the range axis
pub const RANGE_RESOLUTION_TOLERANCE: f64 = 0.01;

/// Typical extinction bounds (m⁻¹) used to derive the expected slope of `log10(rcs)`
pub const MAX_EXPECTED_EXTINCTION: f64 = 10e-6;
pub const MIN_EXPECTED_EXTINCTION: f64 = 0.1e-6;

/// Expected slope of `log10(rcs)` for a given extinction: `-2 σ / ln(10)`
pub fn expected_log_slope(extinction: f64) -> f64 {
    -2.0 / std::f64::consts::LN_10 * extinction
}

// -------------------------------------------------------------------------------------------------
// Artifacts
// -------------------------------------------------------------------------------------------------

/// Prefix of the daily result tables
pub const DAILY_RESULT_PREFIX: &str = "ov_results";

/// Prefix of the temperature model artifact
pub const MODEL_PREFIX: &str = "temperature_model";

/// Method attribute of the temperature model
pub const MODEL_METHOD: &str = "Based on Hervo et al. 2016";

/// Description attribute of the temperature model
pub const MODEL_DESCRIPTION: &str = "Dif(z) = a(z) * T + b(z); \
     Overlap_corrected(z) = 1 / (Dif(z) / 100 / overlap_ref(z) + 1 / overlap_ref(z)); T in degC";
