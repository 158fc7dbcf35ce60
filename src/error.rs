use thiserror::Error;

use crate::parameters::bounds::BoundsError;
use crate::parameters::parameter::ParameterError;

/// Error types for the welltest-lm library.
#[derive(Error, Debug)]
pub enum FitError {
    /// Error indicating a mismatch in vector or matrix dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Error indicating a singular (or numerically degenerate) damped system.
    #[error("Singular matrix encountered")]
    SingularMatrix,

    /// Invalid input data, e.g. empty observations or a weight outside [0, 1].
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Error for invalid parameter values.
    #[error("Invalid parameter value: {0}")]
    InvalidParameter(String),

    /// Parameter not found.
    #[error("Parameter not found: {0}")]
    ParameterNotFound(String),

    /// A parameter with the same name already exists in the set.
    #[error("Duplicate parameter: {0}")]
    DuplicateParameter(String),

    /// A derived parameter was marked for fitting.
    #[error("Derived parameter '{0}' cannot be fitted independently")]
    DerivedParameterFit(String),

    /// Error for boundary constraint violations.
    #[error("Bounds error: {0}")]
    Bounds(#[from] BoundsError),

    /// Error raised by a single parameter.
    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),

    /// Error reported by the external model evaluator.
    #[error("Model evaluation error: {0}")]
    ModelEvaluation(String),

    /// A fit run is already active for this runner.
    #[error("A fit run is already active")]
    AlreadyRunning,

    /// The evaluator panicked on the worker thread.
    #[error("Fit worker panicked: {0}")]
    WorkerPanicked(String),

    /// The worker thread went away without reporting a result.
    #[error("Fit worker disconnected before finishing")]
    WorkerDisconnected,

    /// I/O error wrapper (worker thread spawn).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for welltest-lm operations.
pub type Result<T> = std::result::Result<T, FitError>;
