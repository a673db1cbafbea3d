//! Error types for the exact solver and its optimizer.

use thiserror::Error;

/// Errors raised by the SMT solver stack.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SolverError {
    /// The solver geometry is malformed or inconsistent.
    #[error("Invalid architecture: {0}")]
    InvalidArchitecture(String),

    /// Shielding idle atoms requires a storage zone.
    #[error("No storage zone is available")]
    NoStorageZone,

    /// The backend gave up before reaching a verdict (timeout or
    /// interrupt).
    #[error("Solver was interrupted before reaching a verdict")]
    Interrupted,

    /// The optimizer exceeded its wall clock without finding any
    /// satisfiable value.
    #[error("Optimizer timed out without a result")]
    Timeout,

    /// A result document could not be parsed.
    #[error("Malformed result document: {0}")]
    MalformedResult(String),

    /// An optimizer worker failed with an error other than interruption.
    #[error("Optimizer worker for k = {k} failed: {message}")]
    WorkerFailure {
        /// The probed value.
        k: u16,
        /// The underlying error message.
        message: String,
    },
}

/// Result type for solver operations.
pub type SolverResult<T> = Result<T, SolverError>;
