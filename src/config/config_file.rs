//! Key/value configuration file.
//!
//! The file is a two-column CSV: a header line (ignored) followed by one `key,value` row per
//! option, e.g.
//!
//! ```text
//! parameter,value
//! time_interval_length,30
//! max_fit_range,1800
//! d_fit_range,15
//! ```
//!
//! Keys are the field names of [`OverlapParams`]. Absent keys keep their default, unknown keys
//! and unparsable values are configuration errors.
use std::str::FromStr;

use camino::Utf8Path;

use super::{OverlapParams, OverlapParamsBuilder};
use crate::overlap_errors::OverlapError;

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, OverlapError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| OverlapError::InvalidConfig(format!("{key}: cannot parse '{value}'")))
}

impl OverlapParamsBuilder {
    /// Apply one configuration entry by name.
    pub fn set(self, key: &str, value: &str) -> Result<Self, OverlapError> {
        let key = key.trim();
        let b = match key {
            "time_interval_length" => self.time_interval_length(parse(key, value)?),
            "d_fit_time" => self.d_fit_time(parse(key, value)?),
            "dt_sliding_variance" => self.dt_sliding_variance(parse(key, value)?),
            "max_fit_range" => self.max_fit_range(parse(key, value)?),
            "min_fit_length" => self.min_fit_length(parse(key, value)?),
            "d_fit_range" => self.d_fit_range(parse(key, value)?),
            "d_fit_length" => self.d_fit_length(parse(key, value)?),
            "min_range_std_over_mean" => self.min_range_std_over_mean(parse(key, value)?),
            "clear_sky_min_range" => self.clear_sky_min_range(parse(key, value)?),
            "clear_sky_max_range" => self.clear_sky_max_range(parse(key, value)?),
            "clear_sky_max_relgrad" => self.clear_sky_max_relgrad(parse(key, value)?),
            "max_std_over_mean" => self.max_std_over_mean(parse(key, value)?),
            "max_relgrad" => self.max_relgrad(parse(key, value)?),
            "max_relgrad_mean" => self.max_relgrad_mean(parse(key, value)?),
            "max_poly_order" => self.max_poly_order(parse(key, value)?),
            "min_expected_slope" => self.min_expected_slope(parse(key, value)?),
            "max_expected_slope" => self.max_expected_slope(parse(key, value)?),
            "min_expected_zero_fit_value" => self.min_expected_zero_fit_value(parse(key, value)?),
            "max_expected_zero_fit_value" => self.max_expected_zero_fit_value(parse(key, value)?),
            "thresh_resid_rel" => self.thresh_resid_rel(parse(key, value)?),
            "thresh_resid_whole_zone" => self.thresh_resid_whole_zone(parse(key, value)?),
            "max_overlap_value" => self.max_overlap_value(parse(key, value)?),
            "thresh_overlap_valid_rel_error" => {
                self.thresh_overlap_valid_rel_error(parse(key, value)?)
            }
            "sgolay_width" => self.sgolay_width(parse(key, value)?),
            "sgolay_ord" => self.sgolay_ord(parse(key, value)?),
            "sgolay_max_range" => self.sgolay_max_range(parse(key, value)?),
            "min_slope" => self.min_slope(parse(key, value)?),
            "min_nb_samples_for_skipping_good_test" => {
                self.min_nb_samples_for_skipping_good_test(parse(key, value)?)
            }
            "whiskers_length" => self.whiskers_length(parse(key, value)?),
            "outlier_quantile" => self.outlier_quantile(parse(key, value)?),
            "outlier_abs_tolerance" => self.outlier_abs_tolerance(parse(key, value)?),
            "max_samples_per_day" => self.max_samples_per_day(parse(key, value)?),
            // historical name of the per-day sample minimum
            "min_nb_good_samples" | "min_nb_good_samples_after_outliers_removal" => {
                self.min_nb_good_samples(parse(key, value)?)
            }
            "min_distinct_temperatures" => self.min_distinct_temperatures(parse(key, value)?),
            "thrsh_diff_r2" => self.thrsh_diff_r2(parse(key, value)?),
            "number_samples" => self.number_samples(parse(key, value)?),
            "min_regression_days" => self.min_regression_days(parse(key, value)?),
            other => {
                return Err(OverlapError::InvalidConfig(format!(
                    "unknown configuration key '{other}'"
                )))
            }
        };
        Ok(b)
    }
}

impl OverlapParams {
    /// Read and validate parameters from a key/value CSV reader.
    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, OverlapError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .flexible(true)
            .comment(Some(b'#'))
            .from_reader(reader);

        let mut builder = OverlapParams::builder();
        for record in rdr.records() {
            let record = record?;
            let key = record.get(0).unwrap_or_default();
            if key.is_empty() {
                continue;
            }
            let value = record.get(1).ok_or_else(|| {
                OverlapError::InvalidConfig(format!("{key}: missing value"))
            })?;
            builder = builder.set(key, value)?;
        }
        builder.build()
    }

    /// Read and validate parameters from a configuration file.
    ///
    /// Return
    /// ----------
    /// * `Err(OverlapError::IoError)` if the file cannot be opened,
    ///   `Err(OverlapError::InvalidConfig)` for unknown keys, bad values or failed validation.
    pub fn from_config_file(path: &Utf8Path) -> Result<Self, OverlapError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }
}
