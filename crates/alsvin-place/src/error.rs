//! Error types for placement and routing.

use alsvin_arch::ArchError;
use thiserror::Error;

/// Errors raised by the placer and router.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlaceError {
    /// The search exhausted its open set without reaching a goal.
    #[error("No path from start to any goal found")]
    NoPath,

    /// An architecture query failed.
    #[error(transparent)]
    Arch(#[from] ArchError),

    /// The inputs violate a precondition of the placer.
    #[error("Invalid placement input: {0}")]
    InvalidInput(String),
}

/// Result type for placement operations.
pub type PlaceResult<T> = Result<T, PlaceError>;
