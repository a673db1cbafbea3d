//! Error types for code assembly.

use alsvin_arch::ArchError;
use alsvin_ir::IrError;
use thiserror::Error;

/// Errors raised while assembling the instruction stream.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodegenError {
    /// The operation has no target-set equivalent and warnings are
    /// disabled.
    #[error("Unsupported gate '{0}' in the code assembler")]
    UnsupportedGate(String),

    /// Placement, routing, and gate layers do not line up.
    #[error("Inconsistent assembler input: {0}")]
    Inconsistent(String),

    /// A solver solution does not match the input circuit.
    #[error("Solution mismatch: {0}")]
    SolutionMismatch(String),

    /// An emitted shuttle violates the AOD order constraints.
    #[error("Illegal shuttle in instruction {instruction}: {reason}")]
    IllegalShuttle {
        /// Index of the offending instruction.
        instruction: usize,
        /// What went wrong.
        reason: String,
    },

    /// An architecture query failed.
    #[error(transparent)]
    Arch(#[from] ArchError),

    /// A circuit query failed.
    #[error(transparent)]
    Ir(#[from] IrError),
}

/// Result type for code assembly.
pub type CodegenResult<T> = Result<T, CodegenError>;
