//! Alsvin exact solver
//!
//! The exact half of the compiler core: the multi-stage placement problem
//! is encoded as a bit-vector formula over a fixed stage count and handed
//! to the z3 backend. A parallel [`Optimizer`] searches for the minimum
//! stage or transfer count within a wall-clock budget.
//!
//! Per stage and qubit the formula carries site coordinates, AOD
//! membership, AOD row/column indices, and signed in-cell offsets; per
//! stage it carries whole-line load/store flags, and per gate the stage at
//! which the operation fires. See [`NaSolver`] for the constraint system
//! and [`SolveResult`] for the round-trippable result document.

pub mod error;
pub mod factory;
pub mod optimizer;
pub mod result;
pub mod solver;

pub use error::{SolverError, SolverResult};
pub use factory::{BeamParameters, solver_from_architecture, solver_from_grid};
pub use optimizer::{Optimizer, OptimizerReport};
pub use result::{GateExec, QubitState, SolveResult, StageResult};
pub use solver::{NaSolver, SolverSpec, StorageShape};
