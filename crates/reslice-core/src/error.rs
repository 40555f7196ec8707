//! Error types for reslice-core.

use thiserror::Error;

/// Error type for grid, marker and region operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("No samples loaded")]
    EmptyBuffer,

    #[error("Degenerate region {index}: start={start}, end={end}")]
    DegenerateRegion { index: usize, start: usize, end: usize },

    #[error("Index {index} out of range (len {len})")]
    OutOfRangeIndex { index: usize, len: usize },

    #[error("Onset detection in progress")]
    DetectionInProgress,
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Reject non-finite or non-positive values with a named `InvalidParameter`.
pub(crate) fn require_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidParameter(format!(
            "{name} must be positive, got {value}"
        )))
    }
}
