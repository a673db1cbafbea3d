//! Alsvin code assembly
//!
//! Translates placement sequences and routing groups into the textual
//! instruction stream of the target machine: atom declarations, load/move/
//! store shuttles with parking offsets, global entangling pulses, and
//! single-qubit rewrites (global RY, local RZ, U fallback).
//!
//! Two front ends feed this crate: the heuristic pipeline hands over
//! placements and routing steps ([`CodeGenerator`]), the exact solver hands
//! over a solved stage schedule ([`generate_from_solution`]).

pub mod error;
pub mod generator;
pub mod program;
pub mod smt;

pub use error::{CodegenError, CodegenResult};
pub use generator::{CodeGenerator, CodegenConfig};
pub use program::{AtomDecl, Instruction, MoveTarget, Program};
pub use smt::{SolutionGeometry, generate_from_solution};
