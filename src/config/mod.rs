//! # Overlap processing parameters
//!
//! This module defines the [`OverlapParams`] configuration struct and its builder, which
//! control how a day of ceilometer profiles is cut into time windows, which candidate fit
//! windows are searched, the thresholds of every quality check, how survivors are sorted and
//! how the temperature model is regressed.
//!
//! ## Purpose
//!
//! [`OverlapParams`] centralizes every tunable of the two processing stages:
//!
//! - Time windowing (`time_interval_length`, `d_fit_time`, `dt_sliding_variance`),
//! - Candidate range windows (`max_fit_range`, `min_fit_length`, optional step overrides),
//! - Clear-sky detection (`clear_sky_min_range`, `clear_sky_max_range`, `clear_sky_max_relgrad`),
//! - Stability thresholds (`max_std_over_mean`, `max_relgrad`, `max_relgrad_mean`),
//! - Fit quality (`max_poly_order`, slope/intercept bounds, residual thresholds),
//! - Corrected overlap plausibility (`max_overlap_value`, `thresh_overlap_valid_rel_error`,
//!   Savitzky–Golay slope settings),
//! - Sample sorting (`whiskers_length`, `outlier_quantile`, `max_samples_per_day`),
//! - Temperature model regression (`thrsh_diff_r2`, `number_samples`, minimum counts).
//!
//! Settings that depend on the instrument data (first fit range, full-overlap range, search
//! steps) are resolved per range axis by [`derived::DerivedSettings`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use overlap_probe::config::OverlapParams;
//!
//! let params = OverlapParams::builder()
//!     .time_interval_length(30.0)
//!     .d_fit_time(10.0)
//!     .max_fit_range(1800.0)
//!     .outlier_quantile(0.75)
//!     .build()
//!     .unwrap();
//! println!("{params:#}");
//! ```
//!
//! ## See also
//!
//! * [`config_file`] – key/value configuration file loader.
//! * [`reference_overlap::ReferenceOverlap`] – reference overlap function loader.
//! * [`crate::daily_processing::process_day`] – stage-1 entry point.
//! * [`crate::temperature_model::build_temperature_models`] – stage-2 entry point.
use std::cmp::Ordering::{Equal, Greater, Less};
use std::fmt;

use crate::constants::{
    expected_log_slope, Meter, MAX_EXPECTED_EXTINCTION, MIN_EXPECTED_EXTINCTION,
};
use crate::overlap_errors::OverlapError;

pub mod config_file;
pub mod derived;
pub mod reference_overlap;

/// Configuration of the overlap processing chain.
///
/// Fields
/// -----------------
/// **Time windowing** (minutes)
/// * `time_interval_length` – length of one analysed time window.
/// * `d_fit_time` – shift between consecutive time windows.
/// * `dt_sliding_variance` – length of the sliding sub-windows used by the variance tests.
///
/// **Range windows** (metres)
/// * `max_fit_range` – highest range a fit window may reach.
/// * `min_fit_length` – shortest fit window.
/// * `d_fit_range`, `d_fit_length` – search steps; `None` uses the rounded range resolution.
/// * `min_range_std_over_mean` – lowest range entering the variance and gradient tests.
///
/// **Clear sky**
/// * `clear_sky_min_range`, `clear_sky_max_range` – altitude window of the gradient heuristic.
/// * `clear_sky_max_relgrad` – relative vertical gradient above which a profile is cloudy.
///
/// **Stability thresholds**
/// * `max_std_over_mean` – limit of the sliding std over median of `log10(rcs)`.
/// * `max_relgrad`, `max_relgrad_mean` – limits of the relative Sobel gradient magnitude.
///
/// **Fit quality**
/// * `max_poly_order` – highest polynomial order tried by the fit check.
/// * `min_expected_slope`, `max_expected_slope` – bounds of the `log10(rcs)` slope (m⁻¹).
/// * `min_expected_zero_fit_value`, `max_expected_zero_fit_value` – bounds of the intercept.
/// * `thresh_resid_rel` – rms residual limit relative to the mean fitted value.
/// * `thresh_resid_whole_zone` – relative deviation limit from the first fit range to the
///   window top.
///
/// **Corrected overlap**
/// * `max_overlap_value` – ratio of the corrected maximum to the reference maximum.
/// * `thresh_overlap_valid_rel_error` – relative error limit in the full-overlap region.
/// * `sgolay_width`, `sgolay_ord`, `sgolay_max_range` – Savitzky–Golay settings.
/// * `min_slope` – lowest admissible slope of the corrected overlap (m⁻¹).
///
/// **Sample sorting**
/// * `min_nb_samples_for_skipping_good_test` – candidate count above which the cross-window
///   consistency tests are skipped.
/// * `whiskers_length` – whisker length in units of the quantile spread.
/// * `outlier_quantile` – upper quantile `q` of the spread `P(q) - P(1 - q)`.
/// * `outlier_abs_tolerance` – floor of the whisker half-width.
/// * `max_samples_per_day` – number of ranked survivors kept per day.
///
/// **Temperature model**
/// * `min_nb_good_samples` – minimum samples for a day to enter the model.
/// * `min_distinct_temperatures` – minimum distinct daily temperatures per module.
/// * `thrsh_diff_r2` – marginal R² gain below which the regression window stops widening.
/// * `number_samples` – minimum length of the stable R² run.
/// * `min_regression_days` – smallest accepted regression window.
///
/// Defaults
/// -----------------
/// See the [`Default`] implementation; every value can be overridden through the builder or
/// the configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlapParams {
    // --- Time windowing ---
    pub time_interval_length: f64,
    pub d_fit_time: f64,
    pub dt_sliding_variance: f64,

    // --- Range windows ---
    pub max_fit_range: Meter,
    pub min_fit_length: Meter,
    pub d_fit_range: Option<Meter>,
    pub d_fit_length: Option<Meter>,
    pub min_range_std_over_mean: Meter,

    // --- Clear sky ---
    pub clear_sky_min_range: Meter,
    pub clear_sky_max_range: Meter,
    pub clear_sky_max_relgrad: f64,

    // --- Stability ---
    pub max_std_over_mean: f64,
    pub max_relgrad: f64,
    pub max_relgrad_mean: f64,

    // --- Fit quality ---
    pub max_poly_order: usize,
    pub min_expected_slope: f64,
    pub max_expected_slope: f64,
    pub min_expected_zero_fit_value: f64,
    pub max_expected_zero_fit_value: f64,
    pub thresh_resid_rel: f64,
    pub thresh_resid_whole_zone: f64,

    // --- Corrected overlap ---
    pub max_overlap_value: f64,
    pub thresh_overlap_valid_rel_error: f64,
    pub sgolay_width: usize,
    pub sgolay_ord: usize,
    pub sgolay_max_range: Meter,
    pub min_slope: f64,

    // --- Sample sorting ---
    pub min_nb_samples_for_skipping_good_test: usize,
    pub whiskers_length: f64,
    pub outlier_quantile: f64,
    pub outlier_abs_tolerance: f64,
    pub max_samples_per_day: usize,

    // --- Temperature model ---
    pub min_nb_good_samples: usize,
    pub min_distinct_temperatures: usize,
    pub thrsh_diff_r2: f64,
    pub number_samples: usize,
    pub min_regression_days: usize,
}

impl OverlapParams {
    /// Construct a new [`OverlapParams`] with the default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new [`OverlapParamsBuilder`] starting from the defaults.
    pub fn builder() -> OverlapParamsBuilder {
        OverlapParamsBuilder::new()
    }

    /// Shortest clear extent a time window must offer, measured from the first fit range.
    pub fn min_clear_extent(&self, min_fit_range: Meter) -> Meter {
        min_fit_range + self.min_fit_length
    }
}

impl Default for OverlapParams {
    fn default() -> Self {
        OverlapParams {
            time_interval_length: 30.0,
            d_fit_time: 10.0,
            dt_sliding_variance: 5.0,

            max_fit_range: 2000.0,
            min_fit_length: 300.0,
            d_fit_range: None,
            d_fit_length: None,
            min_range_std_over_mean: 250.0,

            clear_sky_min_range: 250.0,
            clear_sky_max_range: 3000.0,
            clear_sky_max_relgrad: 0.05,

            max_std_over_mean: 0.003,
            max_relgrad: 0.0125,
            max_relgrad_mean: 0.0025,

            max_poly_order: 1,
            min_expected_slope: expected_log_slope(MAX_EXPECTED_EXTINCTION),
            max_expected_slope: expected_log_slope(MIN_EXPECTED_EXTINCTION),
            min_expected_zero_fit_value: 2.0,
            max_expected_zero_fit_value: 9.0,
            thresh_resid_rel: 0.002,
            thresh_resid_whole_zone: 0.01,

            max_overlap_value: 1.05,
            thresh_overlap_valid_rel_error: 0.05,
            sgolay_width: 11,
            sgolay_ord: 2,
            sgolay_max_range: 2500.0,
            min_slope: -2.5e-4,

            min_nb_samples_for_skipping_good_test: 20,
            whiskers_length: 1.5,
            outlier_quantile: 0.75,
            outlier_abs_tolerance: 1e-6,
            max_samples_per_day: 1,

            min_nb_good_samples: 1,
            min_distinct_temperatures: 3,
            thrsh_diff_r2: 0.01,
            number_samples: 10,
            min_regression_days: 3,
        }
    }
}

/// Builder for [`OverlapParams`], with validation.
#[derive(Debug, Clone)]
pub struct OverlapParamsBuilder {
    params: OverlapParams,
}

impl Default for OverlapParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlapParamsBuilder {
    /// Create a new builder initialized with default values.
    pub fn new() -> Self {
        Self {
            params: OverlapParams::default(),
        }
    }

    /// Continue building from existing parameters.
    pub fn from_params(params: OverlapParams) -> Self {
        Self { params }
    }

    // --- Time windowing ---
    pub fn time_interval_length(mut self, v: f64) -> Self {
        self.params.time_interval_length = v;
        self
    }
    pub fn d_fit_time(mut self, v: f64) -> Self {
        self.params.d_fit_time = v;
        self
    }
    pub fn dt_sliding_variance(mut self, v: f64) -> Self {
        self.params.dt_sliding_variance = v;
        self
    }

    // --- Range windows ---
    pub fn max_fit_range(mut self, v: Meter) -> Self {
        self.params.max_fit_range = v;
        self
    }
    pub fn min_fit_length(mut self, v: Meter) -> Self {
        self.params.min_fit_length = v;
        self
    }
    pub fn d_fit_range(mut self, v: Meter) -> Self {
        self.params.d_fit_range = Some(v);
        self
    }
    pub fn d_fit_length(mut self, v: Meter) -> Self {
        self.params.d_fit_length = Some(v);
        self
    }
    pub fn min_range_std_over_mean(mut self, v: Meter) -> Self {
        self.params.min_range_std_over_mean = v;
        self
    }

    // --- Clear sky ---
    pub fn clear_sky_min_range(mut self, v: Meter) -> Self {
        self.params.clear_sky_min_range = v;
        self
    }
    pub fn clear_sky_max_range(mut self, v: Meter) -> Self {
        self.params.clear_sky_max_range = v;
        self
    }
    pub fn clear_sky_max_relgrad(mut self, v: f64) -> Self {
        self.params.clear_sky_max_relgrad = v;
        self
    }

    // --- Stability ---
    pub fn max_std_over_mean(mut self, v: f64) -> Self {
        self.params.max_std_over_mean = v;
        self
    }
    pub fn max_relgrad(mut self, v: f64) -> Self {
        self.params.max_relgrad = v;
        self
    }
    pub fn max_relgrad_mean(mut self, v: f64) -> Self {
        self.params.max_relgrad_mean = v;
        self
    }

    // --- Fit quality ---
    pub fn max_poly_order(mut self, v: usize) -> Self {
        self.params.max_poly_order = v;
        self
    }
    pub fn min_expected_slope(mut self, v: f64) -> Self {
        self.params.min_expected_slope = v;
        self
    }
    pub fn max_expected_slope(mut self, v: f64) -> Self {
        self.params.max_expected_slope = v;
        self
    }
    pub fn min_expected_zero_fit_value(mut self, v: f64) -> Self {
        self.params.min_expected_zero_fit_value = v;
        self
    }
    pub fn max_expected_zero_fit_value(mut self, v: f64) -> Self {
        self.params.max_expected_zero_fit_value = v;
        self
    }
    pub fn thresh_resid_rel(mut self, v: f64) -> Self {
        self.params.thresh_resid_rel = v;
        self
    }
    pub fn thresh_resid_whole_zone(mut self, v: f64) -> Self {
        self.params.thresh_resid_whole_zone = v;
        self
    }

    // --- Corrected overlap ---
    pub fn max_overlap_value(mut self, v: f64) -> Self {
        self.params.max_overlap_value = v;
        self
    }
    pub fn thresh_overlap_valid_rel_error(mut self, v: f64) -> Self {
        self.params.thresh_overlap_valid_rel_error = v;
        self
    }
    pub fn sgolay_width(mut self, v: usize) -> Self {
        self.params.sgolay_width = v;
        self
    }
    pub fn sgolay_ord(mut self, v: usize) -> Self {
        self.params.sgolay_ord = v;
        self
    }
    pub fn sgolay_max_range(mut self, v: Meter) -> Self {
        self.params.sgolay_max_range = v;
        self
    }
    pub fn min_slope(mut self, v: f64) -> Self {
        self.params.min_slope = v;
        self
    }

    // --- Sample sorting ---
    pub fn min_nb_samples_for_skipping_good_test(mut self, v: usize) -> Self {
        self.params.min_nb_samples_for_skipping_good_test = v;
        self
    }
    pub fn whiskers_length(mut self, v: f64) -> Self {
        self.params.whiskers_length = v;
        self
    }
    pub fn outlier_quantile(mut self, v: f64) -> Self {
        self.params.outlier_quantile = v;
        self
    }
    pub fn outlier_abs_tolerance(mut self, v: f64) -> Self {
        self.params.outlier_abs_tolerance = v;
        self
    }
    pub fn max_samples_per_day(mut self, v: usize) -> Self {
        self.params.max_samples_per_day = v;
        self
    }

    // --- Temperature model ---
    pub fn min_nb_good_samples(mut self, v: usize) -> Self {
        self.params.min_nb_good_samples = v;
        self
    }
    pub fn min_distinct_temperatures(mut self, v: usize) -> Self {
        self.params.min_distinct_temperatures = v;
        self
    }
    pub fn thrsh_diff_r2(mut self, v: f64) -> Self {
        self.params.thrsh_diff_r2 = v;
        self
    }
    pub fn number_samples(mut self, v: usize) -> Self {
        self.params.number_samples = v;
        self
    }
    pub fn min_regression_days(mut self, v: usize) -> Self {
        self.params.min_regression_days = v;
        self
    }

    // ---- Numeric helpers for PartialOrd (handle NaN as invalid) ----

    /// Return true iff x > 0.0 and comparable (i.e., not NaN).
    #[inline]
    fn gt0(x: f64) -> bool {
        x.partial_cmp(&0.0) == Some(Greater)
    }

    /// Return true iff x >= 0.0 and comparable (i.e., not NaN).
    #[inline]
    fn ge0(x: f64) -> bool {
        matches!(x.partial_cmp(&0.0), Some(Greater) | Some(Equal))
    }

    /// Return true iff a < b and comparable (i.e., not NaN).
    #[inline]
    fn lt(a: f64, b: f64) -> bool {
        a.partial_cmp(&b) == Some(Less)
    }

    /// Finalize the builder and produce an [`OverlapParams`] instance.
    ///
    /// Validation rules
    /// -----------------
    /// * Time lengths are positive and the sliding variance window fits in a time window.
    /// * Range lengths and steps are positive, `min_fit_length < max_fit_range`,
    ///   `clear_sky_min_range < clear_sky_max_range`.
    /// * Thresholds are positive, `min_expected_slope < max_expected_slope`,
    ///   `min_expected_zero_fit_value < max_expected_zero_fit_value`.
    /// * `max_poly_order >= 1`, `sgolay_width` odd and larger than `sgolay_ord >= 1`.
    /// * `outlier_quantile ∈ [0.5, 1)`, `whiskers_length >= 0`, `outlier_abs_tolerance >= 0`.
    /// * Counts used as minimums are at least 1, `min_distinct_temperatures >= 2`.
    ///
    /// Return
    /// ----------
    /// * `Err(OverlapError::InvalidConfig)` describing the first violated rule.
    pub fn build(self) -> Result<OverlapParams, OverlapError> {
        let p = &self.params;
        let invalid = |msg: &str| Err(OverlapError::InvalidConfig(msg.to_string()));

        // --- Time windowing ---
        if !Self::gt0(p.time_interval_length)
            || !Self::gt0(p.d_fit_time)
            || !Self::gt0(p.dt_sliding_variance)
        {
            return invalid("time window lengths must be positive");
        }
        if Self::lt(p.time_interval_length, p.dt_sliding_variance) {
            return invalid("dt_sliding_variance must not exceed time_interval_length");
        }

        // --- Range windows ---
        if !Self::gt0(p.max_fit_range) || !Self::gt0(p.min_fit_length) {
            return invalid("max_fit_range and min_fit_length must be positive");
        }
        if !Self::lt(p.min_fit_length, p.max_fit_range) {
            return invalid("min_fit_length must be smaller than max_fit_range");
        }
        if p.d_fit_range.is_some_and(|v| !Self::gt0(v))
            || p.d_fit_length.is_some_and(|v| !Self::gt0(v))
        {
            return invalid("fit window search steps must be positive");
        }
        if !Self::ge0(p.min_range_std_over_mean) {
            return invalid("min_range_std_over_mean must be non-negative");
        }

        // --- Clear sky ---
        if !Self::ge0(p.clear_sky_min_range)
            || !Self::lt(p.clear_sky_min_range, p.clear_sky_max_range)
        {
            return invalid("clear-sky window must satisfy 0 <= min < max");
        }
        if !Self::gt0(p.clear_sky_max_relgrad) {
            return invalid("clear_sky_max_relgrad must be positive");
        }

        // --- Stability / fit thresholds ---
        if !Self::gt0(p.max_std_over_mean)
            || !Self::gt0(p.max_relgrad)
            || !Self::gt0(p.max_relgrad_mean)
            || !Self::gt0(p.thresh_resid_rel)
            || !Self::gt0(p.thresh_resid_whole_zone)
            || !Self::gt0(p.thresh_overlap_valid_rel_error)
            || !Self::gt0(p.max_overlap_value)
        {
            return invalid("quality thresholds must be positive");
        }
        if p.max_poly_order == 0 {
            return invalid("max_poly_order must be at least 1");
        }
        if !Self::lt(p.min_expected_slope, p.max_expected_slope) {
            return invalid("min_expected_slope must be smaller than max_expected_slope");
        }
        if !Self::lt(p.min_expected_zero_fit_value, p.max_expected_zero_fit_value) {
            return invalid(
                "min_expected_zero_fit_value must be smaller than max_expected_zero_fit_value",
            );
        }

        // --- Savitzky–Golay ---
        if p.sgolay_width % 2 == 0 || p.sgolay_ord == 0 || p.sgolay_ord >= p.sgolay_width {
            return invalid("sgolay_width must be odd and larger than sgolay_ord >= 1");
        }
        if !Self::gt0(p.sgolay_max_range) || p.min_slope.is_nan() {
            return invalid("sgolay_max_range must be positive and min_slope a number");
        }

        // --- Sorting ---
        if !(0.5..1.0).contains(&p.outlier_quantile) {
            return invalid("outlier_quantile must lie in [0.5, 1)");
        }
        if !Self::ge0(p.whiskers_length) || !Self::ge0(p.outlier_abs_tolerance) {
            return invalid("whiskers_length and outlier_abs_tolerance must be non-negative");
        }
        if p.max_samples_per_day == 0 {
            return invalid("max_samples_per_day must be at least 1");
        }

        // --- Temperature model ---
        if p.min_nb_good_samples == 0 || p.number_samples == 0 || p.min_regression_days < 2 {
            return invalid(
                "min_nb_good_samples and number_samples must be >= 1, min_regression_days >= 2",
            );
        }
        if p.min_distinct_temperatures < 2 {
            return invalid("min_distinct_temperatures must be at least 2");
        }
        if !Self::ge0(p.thrsh_diff_r2) {
            return invalid("thrsh_diff_r2 must be non-negative");
        }

        Ok(self.params)
    }
}

impl fmt::Display for OverlapParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            const PARAM_COL: usize = 48;
            writeln!(f, "Overlap Processing Parameters")?;
            writeln!(f, "-----------------------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = if s.len() < PARAM_COL {
                        " ".repeat(PARAM_COL - s.len())
                    } else {
                        " ".to_string()
                    };
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            writeln!(f, "[Time windowing]")?;
            line!("time_interval_length = {:.1} min", self.time_interval_length, "Analysed time window")?;
            line!("d_fit_time           = {:.1} min", self.d_fit_time, "Shift between time windows")?;
            line!("dt_sliding_variance  = {:.1} min", self.dt_sliding_variance, "Sliding variance sub-window")?;

            writeln!(f, "\n[Range windows]")?;
            line!("max_fit_range        = {:.1} m", self.max_fit_range, "Highest fit window top")?;
            line!("min_fit_length       = {:.1} m", self.min_fit_length, "Shortest fit window")?;
            line!("d_fit_range          = {:?}", self.d_fit_range, "Start step (None: resolution)")?;
            line!("d_fit_length         = {:?}", self.d_fit_length, "Length step (None: resolution)")?;
            line!("min_range_std_o_mean = {:.1} m", self.min_range_std_over_mean, "Lowest range of stability tests")?;

            writeln!(f, "\n[Clear sky]")?;
            line!("clear_sky_min_range  = {:.1} m", self.clear_sky_min_range, "Bottom of the heuristic window")?;
            line!("clear_sky_max_range  = {:.1} m", self.clear_sky_max_range, "Top of the heuristic window")?;
            line!("clear_sky_max_relgrad= {:.4}", self.clear_sky_max_relgrad, "Cloud gradient limit")?;

            writeln!(f, "\n[Stability]")?;
            line!("max_std_over_mean    = {:.4}", self.max_std_over_mean, "Sliding std / median limit")?;
            line!("max_relgrad          = {:.4}", self.max_relgrad, "Relative gradient limit")?;
            line!("max_relgrad_mean     = {:.4}", self.max_relgrad_mean, "Mean relative gradient limit")?;

            writeln!(f, "\n[Fit quality]")?;
            line!("max_poly_order       = {}", self.max_poly_order, "Highest polynomial order")?;
            line!("min_expected_slope   = {:.3e}", self.min_expected_slope, "Lower log10 slope bound")?;
            line!("max_expected_slope   = {:.3e}", self.max_expected_slope, "Upper log10 slope bound")?;
            line!("min_zero_fit_value   = {:.3}", self.min_expected_zero_fit_value, "Lower intercept bound")?;
            line!("max_zero_fit_value   = {:.3}", self.max_expected_zero_fit_value, "Upper intercept bound")?;
            line!("thresh_resid_rel     = {:.4}", self.thresh_resid_rel, "Relative rms residual limit")?;
            line!("thresh_resid_whole   = {:.4}", self.thresh_resid_whole_zone, "Whole zone deviation limit")?;

            writeln!(f, "\n[Corrected overlap]")?;
            line!("max_overlap_value    = {:.3}", self.max_overlap_value, "Corrected / reference maximum")?;
            line!("thresh_ov_valid_err  = {:.3}", self.thresh_overlap_valid_rel_error, "Full overlap relative error")?;
            line!("sgolay_width         = {}", self.sgolay_width, "Savitzky-Golay window")?;
            line!("sgolay_ord           = {}", self.sgolay_ord, "Savitzky-Golay order")?;
            line!("sgolay_max_range     = {:.1} m", self.sgolay_max_range, "Slope evaluation top")?;
            line!("min_slope            = {:.3e}", self.min_slope, "Lowest corrected overlap slope")?;

            writeln!(f, "\n[Sample sorting]")?;
            line!("skip_good_test_above = {}", self.min_nb_samples_for_skipping_good_test, "Consistency test cut-off")?;
            line!("whiskers_length      = {:.2}", self.whiskers_length, "Whisker length")?;
            line!("outlier_quantile     = {:.2}", self.outlier_quantile, "Spread quantile")?;
            line!("outlier_abs_tolerance= {:.1e}", self.outlier_abs_tolerance, "Whisker floor")?;
            line!("max_samples_per_day  = {}", self.max_samples_per_day, "Ranked survivors kept")?;

            writeln!(f, "\n[Temperature model]")?;
            line!("min_nb_good_samples  = {}", self.min_nb_good_samples, "Samples for a usable day")?;
            line!("min_distinct_temps   = {}", self.min_distinct_temperatures, "Distinct temperatures")?;
            line!("thrsh_diff_r2        = {:.4}", self.thrsh_diff_r2, "Marginal R² gain cut-off")?;
            line!("number_samples       = {}", self.number_samples, "Stable R² run length")?;
            line!("min_regression_days  = {}", self.min_regression_days, "Smallest regression window")?;
            Ok(())
        } else {
            write!(
                f,
                "OverlapParams(window={}min/{}min, fit={}..{}m, q={}, poly<={})",
                self.time_interval_length,
                self.d_fit_time,
                self.min_fit_length,
                self.max_fit_range,
                self.outlier_quantile,
                self.max_poly_order
            )
        }
    }
}
