use thiserror::Error;

/// Error type for invalid operations.
///
/// Missing samples and cells with too few samples for a regression are not errors:
/// they surface as `NaN` in the results. Errors are reserved for precondition
/// violations that are rejected before any computation starts.
#[derive(Error, Debug)]
pub enum RClimError {
    #[error("{0}")]
    Error(String),
    #[error("Invalid {axis} axis: {reason}")]
    InvalidAxis { axis: &'static str, reason: String },
    #[error("Shape mismatch. Expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("Grid mismatch: {0}. Regrid the operands onto a common grid before combining them")]
    GridMismatch(String),
    #[error("Wrong input units. Expected {0}, got {1}")]
    WrongUnits(String, String),
    #[error("Unsupported units '{0}'")]
    UnsupportedUnits(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Convenience type for `Result<T, RClimError>`.
pub type RClimResult<T> = Result<T, RClimError>;
