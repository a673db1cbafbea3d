//! Error types for the architecture crate.

use thiserror::Error;

/// Errors raised while loading or querying an architecture.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ArchError {
    /// The hardware description is malformed or inconsistent.
    #[error("Invalid architecture: {0}")]
    InvalidArchitecture(String),

    /// A site refers to an SLM that does not exist.
    #[error("Unknown SLM id {0}")]
    UnknownSlm(u32),

    /// An entanglement-zone query was made for a storage site.
    #[error("Site is not in an entanglement zone")]
    NotAnEntanglementSite,

    /// The architecture offers no site of the requested kind.
    #[error("The architecture has no {0} site")]
    NoSuchSite(&'static str),
}

/// Result type for architecture operations.
pub type ArchResult<T> = Result<T, ArchError>;
