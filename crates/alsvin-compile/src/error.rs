//! Error types for the compilation pipeline.

use thiserror::Error;

/// Errors raised while driving the pipeline.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompileError {
    /// The circuit uses an operation the hardware cannot express.
    #[error("Invalid circuit: {0}")]
    InvalidCircuit(String),

    /// The configuration file is malformed.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A circuit-level error.
    #[error(transparent)]
    Ir(#[from] alsvin_ir::IrError),

    /// An architecture query failed.
    #[error(transparent)]
    Arch(#[from] alsvin_arch::ArchError),

    /// Placement or routing failed.
    #[error(transparent)]
    Place(#[from] alsvin_place::PlaceError),

    /// Code assembly failed.
    #[error(transparent)]
    Codegen(#[from] alsvin_codegen::CodegenError),
}

/// Result type for pipeline operations.
pub type CompileResult<T> = Result<T, CompileError>;
