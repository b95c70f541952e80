//! Reference overlap function.
//!
//! The overlap function the instrument's L1 signal was corrected with, one value per range
//! bin. On disk it is a small text file: a header line followed by one line of values
//! separated by tabs, commas or spaces.
use std::io::{BufRead, BufReader, Read};

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::overlap_errors::OverlapError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceOverlap {
    pub values: Vec<f64>,
}

impl ReferenceOverlap {
    pub fn new(values: Vec<f64>) -> Self {
        ReferenceOverlap { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Largest value of the function.
    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Parse a reference overlap from a reader (header line, then the values).
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, OverlapError> {
        let line = BufReader::new(reader)
            .lines()
            .skip(1)
            .find(|l| l.as_ref().map(|s| !s.trim().is_empty()).unwrap_or(true))
            .transpose()?
            .ok_or_else(|| {
                OverlapError::FormatMismatch("reference overlap file holds no values".into())
            })?;

        let values = line
            .split(|c: char| c == '\t' || c == ',' || c.is_whitespace())
            .filter(|tok| !tok.is_empty())
            .map(|tok| {
                tok.parse::<f64>().map_err(|_| {
                    OverlapError::FormatMismatch(format!("reference overlap value '{tok}'"))
                })
            })
            .collect::<Result<Vec<f64>, OverlapError>>()?;

        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(OverlapError::FormatMismatch(
                "reference overlap values must be finite and non-negative".into(),
            ));
        }
        Ok(ReferenceOverlap { values })
    }

    pub fn from_file(path: &Utf8Path) -> Result<Self, OverlapError> {
        Self::from_reader(std::fs::File::open(path)?)
    }

    /// Check the function covers every bin of a range axis.
    pub fn check_bins(&self, n_bins: usize) -> Result<(), OverlapError> {
        if self.values.len() != n_bins {
            return Err(OverlapError::FormatMismatch(format!(
                "reference overlap has {} bins, the data has {n_bins}",
                self.values.len()
            )));
        }
        Ok(())
    }
}
