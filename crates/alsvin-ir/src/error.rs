//! Error types for the IR crate.

use crate::op::QubitId;
use thiserror::Error;

/// Errors that can occur in IR operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IrError {
    /// The operation kind cannot be used where it was requested.
    #[error("Operation '{0}' is not supported here")]
    UnsupportedGate(String),

    /// The circuit violates a structural assumption.
    #[error("Invalid circuit: {0}")]
    InvalidCircuit(String),

    /// `execute` was called on a vertex that is not in the executable set.
    #[error("Vertex is not executable and cannot be executed")]
    NotExecutable,

    /// A vertex was referenced that is not part of the graph.
    #[error("Vertex {0:?} is not in the graph")]
    VertexNotInGraph(QubitId),

    /// The partial-order constraint cannot be satisfied by any coloring.
    #[error("Infeasible coloring: {0}")]
    InfeasibleColoring(String),

    /// A cycle was found where a DAG was required.
    #[error("The graph contains a cycle")]
    CycleDetected,

    /// An operation name in the input format was not recognized.
    #[error("Unknown operation kind '{0}'")]
    UnknownOpKind(String),

    /// The operations do not act on the qubit the query referred to.
    #[error("Operations do not act on qubit {0:?}")]
    DoesNotActOn(QubitId),
}

/// Result type for IR operations.
pub type IrResult<T> = Result<T, IrError>;
