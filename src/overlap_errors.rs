use thiserror::Error;

use crate::profiles::l1_csv_reader::ParseDayError;

#[derive(Error, Debug)]
pub enum OverlapError {
    #[error("Input does not match the declared instrument format: {0}")]
    FormatMismatch(String),

    #[error("Insufficient data to fit a temperature model: {0}")]
    InsufficientData(String),

    #[error("Degenerate temperature distribution: {0}")]
    DegenerateFit(String),

    #[error("Least-squares system is singular: {0}")]
    SingularFit(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No data found: {0}")]
    NoData(String),

    #[error("Error while reading the day file {path}: {source}")]
    ReadDayFile { path: String, source: ParseDayError },

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl PartialEq for OverlapError {
    fn eq(&self, other: &Self) -> bool {
        use OverlapError::*;
        match (self, other) {
            (FormatMismatch(a), FormatMismatch(b)) => a == b,
            (InsufficientData(a), InsufficientData(b)) => a == b,
            (DegenerateFit(a), DegenerateFit(b)) => a == b,
            (SingularFit(a), SingularFit(b)) => a == b,
            (InvalidConfig(a), InvalidConfig(b)) => a == b,
            (NoData(a), NoData(b)) => a == b,
            (InvalidDate(a), InvalidDate(b)) => a == b,
            (
                ReadDayFile {
                    path: pa,
                    source: sa,
                },
                ReadDayFile {
                    path: pb,
                    source: sb,
                },
            ) => pa == pb && sa == sb,

            // Wrapped library errors are only compared by variant
            (IoError(_), IoError(_)) => true,
            (CsvError(_), CsvError(_)) => true,
            (JsonError(_), JsonError(_)) => true,

            _ => false,
        }
    }
}

/// Overall outcome of a batch or model run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// At least one result was produced; isolated failures do not change this.
    Produced,
    /// Nothing was produced and nothing failed beyond expected-empty outcomes.
    Nothing,
    /// Nothing was produced and at least one processing error occurred.
    Failed,
}

impl RunStatus {
    /// Status from the number of results and of processing errors.
    pub fn from_counts(produced: usize, errors: usize) -> Self {
        if produced > 0 {
            RunStatus::Produced
        } else if errors > 0 {
            RunStatus::Failed
        } else {
            RunStatus::Nothing
        }
    }
}

impl OverlapError {
    /// True for outcomes meaning "nothing to process" rather than a processing failure.
    pub fn is_no_data(&self) -> bool {
        matches!(self, OverlapError::NoData(_))
    }

    /// True for outcomes where the data cannot support a result, as opposed to a processing
    /// failure.
    pub fn is_expected_empty(&self) -> bool {
        matches!(
            self,
            OverlapError::NoData(_)
                | OverlapError::InsufficientData(_)
                | OverlapError::DegenerateFit(_)
        )
    }
}
