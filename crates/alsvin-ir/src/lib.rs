//! Alsvin circuit IR and layer extraction
//!
//! This crate provides the operation model and the scheduling front end of
//! the Alsvin neutral-atom compiler:
//!
//! - **Operations**: [`Op`] as a tagged sum of [`StandardOp`],
//!   [`CompoundOp`] (register-wide homogeneous gates), and
//!   [`NonUnitaryOp`], with a small capability surface
//!   (targets/controls/params/kind/globality).
//! - **Circuits**: [`Circuit`] with the JSON input format used by the CLI.
//! - **Layer extraction**: [`Layer`] builds a dependency DAG respecting
//!   commutation and inverse cancellation and maintains the *executable
//!   set* of operations ready to fire.
//! - **Interaction-graph algorithms**: independent-set selection, edge
//!   coloring under a partial-order constraint, resting positions, and the
//!   combined layout pass in [`algorithms`].
//!
//! # Example
//!
//! ```rust
//! use alsvin_ir::{Circuit, Layer, OpKind};
//!
//! let mut circuit = Circuit::new("bell", 2);
//! circuit.h(0).unwrap();
//! circuit.cz(0, 1).unwrap();
//!
//! let mut layer = Layer::new(&circuit).unwrap();
//! // the Hadamard fires first, then the CZ becomes executable
//! let ready = layer.executables_of_kind(OpKind::H, 0);
//! layer.execute_all(ready).unwrap();
//! assert_eq!(layer.executables_of_kind(OpKind::Z, 1).len(), 1);
//! ```

pub mod algorithms;
pub mod circuit;
pub mod commute;
pub mod error;
pub mod graph;
pub mod layer;
pub mod op;

pub use algorithms::{
    Color, color_edges, compute_resting_positions, compute_sequence, covered_edges,
    group_by_connected_component, max_independent_set,
};
pub use circuit::Circuit;
pub use commute::{commutes_on, is_inverse};
pub use error::{IrError, IrResult};
pub use graph::{Edge, InteractionGraph, PartialOrder, edge, edges_adjacent};
pub use layer::{Layer, VertexId};
pub use op::{CompoundOp, DIAGONAL_KINDS, NonUnitaryOp, Op, OpKind, QubitId, StandardOp};
