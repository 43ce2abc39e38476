use std::path::PathBuf;

use thiserror::Error;

use crate::data::model::ScalarValue;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Error – everything the library can report
// ---------------------------------------------------------------------------

/// Errors raised by the stores, the dataset and snapshot I/O.
///
/// Duplicate and shape-mismatch errors are recoverable: ingestion collects
/// them per variable and keeps going. Everything else is surfaced to the caller.
#[derive(Error, Debug)]
pub enum Error {
    /// A scalar value already exists for this (animal, day, experiment).
    #[error(
        "duplicate observation for metric '{metric}' (animal {animal}, experiment '{experiment}', day {day}): \
         old value {old_value} from {old_path}, new value {new_value} from {new_path}",
        old_path = .old_file.display(),
        new_path = .new_file.display()
    )]
    DuplicateObservation {
        metric: String,
        animal: i64,
        day: i64,
        experiment: String,
        old_value: ScalarValue,
        new_value: ScalarValue,
        old_file: PathBuf,
        new_file: PathBuf,
    },

    /// A round table already exists for this (animal, experiment, day).
    #[error(
        "duplicate round table for metric '{metric}' (animal {animal}, experiment '{experiment}', day {day}): \
         old file {old_path}, new file {new_path}",
        old_path = .old_file.display(),
        new_path = .new_file.display()
    )]
    DuplicateRoundObservation {
        metric: String,
        animal: i64,
        experiment: String,
        day: i64,
        old_file: PathBuf,
        new_file: PathBuf,
    },

    #[error("metric '{0}' not found in dataset")]
    MetricNotFound(String),

    #[error("experiment '{0}' not found")]
    ExperimentNotFound(String),

    #[error("animal {animal} not found (experiment '{experiment}')")]
    AnimalNotFound { animal: i64, experiment: String },

    #[error("day {day} not found for animal {animal} (experiment '{experiment}')")]
    DayNotFound {
        animal: i64,
        experiment: String,
        day: i64,
    },

    /// The metric exists but is stored in the other aggregation shape.
    ///
    /// Summary and by-round metrics share one namespace. A name used by both
    /// shapes belongs to whichever shape was ingested first, so which side
    /// gets this error depends on ingestion order.
    #[error("metric '{metric}' is stored {actual}, not {expected}")]
    ShapeMismatch {
        metric: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// The metric holds text values and has no numeric matrix.
    #[error("metric '{0}' holds text values and cannot be queried as a matrix")]
    NotNumeric(String),

    /// Required metadata missing or unreadable; aborts the whole file.
    #[error("malformed file {}: {reason}", .path.display())]
    MalformedFile { path: PathBuf, reason: String },

    #[error("snapshot not found: {}", .0.display())]
    SnapshotNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether ingestion may log this error and continue with the next variable.
    pub fn is_per_variable(&self) -> bool {
        matches!(
            self,
            Error::DuplicateObservation { .. }
                | Error::DuplicateRoundObservation { .. }
                | Error::ShapeMismatch { .. }
        )
    }
}
