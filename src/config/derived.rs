//! Data-dependent settings.
//!
//! Some settings of the method are not configured directly but follow from the instrument's
//! range axis and reference overlap: fit windows start where the reference overlap exceeds
//! 0.6, the full-overlap region starts where it reaches 1, and the search steps default to
//! the rounded range resolution.
use crate::config::reference_overlap::ReferenceOverlap;
use crate::config::OverlapParams;
use crate::constants::{Meter, FULL_OVERLAP, MIN_FIT_RANGE_OVERLAP};
use crate::overlap_errors::OverlapError;

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedSettings {
    /// Lowest start of a fit window
    pub min_fit_range: Meter,
    /// First range of full reference overlap
    pub min_overlap_valid: Meter,
    pub d_fit_range: Meter,
    pub d_fit_length: Meter,
    /// `max_fit_range - min_fit_range`
    pub max_fit_length: Meter,
    /// Range spacing used by the Savitzky–Golay derivative
    pub range_spacing: Meter,
}

impl DerivedSettings {
    /// Resolve the settings for one range axis.
    ///
    /// Arguments
    /// -----------------
    /// * `params`: validated parameters.
    /// * `range`: strictly increasing range axis (m).
    /// * `range_resolution`: declared resolution (m).
    /// * `reference`: reference overlap on the same axis.
    ///
    /// Return
    /// ----------
    /// * `Err(OverlapError::FormatMismatch)` when the reference overlap does not cover the axis
    ///   or never reaches the fit / full-overlap thresholds,
    ///   `Err(OverlapError::InvalidConfig)` when the fit range leaves no room for the shortest
    ///   window.
    pub fn resolve(
        params: &OverlapParams,
        range: &[Meter],
        range_resolution: Meter,
        reference: &ReferenceOverlap,
    ) -> Result<Self, OverlapError> {
        reference.check_bins(range.len())?;
        if range.len() < 2 {
            return Err(OverlapError::FormatMismatch(
                "range axis needs at least two bins".into(),
            ));
        }

        let first_range_where = |pred: &dyn Fn(f64) -> bool| {
            range
                .iter()
                .zip(&reference.values)
                .find(|(_, ov)| pred(**ov))
                .map(|(&r, _)| r)
        };

        let min_fit_range = first_range_where(&|ov| ov > MIN_FIT_RANGE_OVERLAP).ok_or_else(|| {
            OverlapError::FormatMismatch(format!(
                "reference overlap never exceeds {MIN_FIT_RANGE_OVERLAP}"
            ))
        })?;
        let min_overlap_valid = first_range_where(&|ov| ov >= FULL_OVERLAP).ok_or_else(|| {
            OverlapError::FormatMismatch("reference overlap never reaches full overlap".into())
        })?;

        let step = range_resolution.round().max(1.0);
        let max_fit_length = params.max_fit_range - min_fit_range;
        if max_fit_length <= params.min_fit_length {
            return Err(OverlapError::InvalidConfig(format!(
                "max_fit_range {} leaves no fit window of {} m above {} m",
                params.max_fit_range, params.min_fit_length, min_fit_range
            )));
        }

        Ok(DerivedSettings {
            min_fit_range,
            min_overlap_valid,
            d_fit_range: params.d_fit_range.unwrap_or(step),
            d_fit_length: params.d_fit_length.unwrap_or(step),
            max_fit_length,
            range_spacing: range[1] - range[0],
        })
    }

    /// Lowest top of the clear region a time window must offer.
    pub fn min_required_range(&self, params: &OverlapParams) -> Meter {
        params.min_clear_extent(self.min_fit_range)
    }
}

#[cfg(test)]
mod derived_test {
    use super::*;

    #[test]
    fn test_resolve_from_reference() {
        let range: Vec<f64> = (1..=200).map(|i| 15.0 * i as f64).collect();
        let values: Vec<f64> = range.iter().map(|r| (r / 900.0).min(1.0)).collect();
        let reference = ReferenceOverlap::new(values);
        let params = OverlapParams::default();

        let derived = DerivedSettings::resolve(&params, &range, 14.985, &reference).unwrap();
        // 0.6 * 900 = 540 is not strictly above 0.6
        assert_eq!(derived.min_fit_range, 555.0);
        assert_eq!(derived.min_overlap_valid, 900.0);
        assert_eq!(derived.d_fit_range, 15.0);
        assert_eq!(derived.d_fit_length, 15.0);
        assert_eq!(derived.max_fit_length, 2000.0 - 555.0);
        assert_eq!(derived.range_spacing, 15.0);
        assert_eq!(derived.min_required_range(&params), 855.0);
    }

    #[test]
    fn test_resolve_errors() {
        let range: Vec<f64> = (1..=10).map(|i| 15.0 * i as f64).collect();
        let low = ReferenceOverlap::new(vec![0.5; 10]);
        assert!(matches!(
            DerivedSettings::resolve(&OverlapParams::default(), &range, 15.0, &low),
            Err(OverlapError::FormatMismatch(_))
        ));
        let short = ReferenceOverlap::new(vec![1.0; 9]);
        assert!(matches!(
            DerivedSettings::resolve(&OverlapParams::default(), &range, 15.0, &short),
            Err(OverlapError::FormatMismatch(_))
        ));
    }
}
