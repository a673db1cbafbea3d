//! Alsvin compilation pipeline
//!
//! Drives the heuristic compiler end to end: the layer DAG is scheduled
//! into alternating single-qubit layers and CZ matchings, the A\* placer
//! produces the placement sequence, the independent-set router partitions
//! the moves into AOD groups, and the code assembler emits the instruction
//! stream.
//!
//! ```no_run
//! use alsvin_arch::Architecture;
//! use alsvin_compile::{Compiler, CompilerConfig};
//! use alsvin_ir::Circuit;
//!
//! let arch = Architecture::from_json(include_str!("../../../demos/architecture.json")).unwrap();
//! let mut circuit = Circuit::new("bell", 2);
//! circuit.h(0).unwrap();
//! circuit.cz(0, 1).unwrap();
//! let program = Compiler::new(&arch, CompilerConfig::default())
//!     .compile(&circuit)
//!     .unwrap();
//! println!("{program}");
//! ```

pub mod compiler;
pub mod error;
pub mod scheduler;

pub use compiler::{Compiler, CompilerConfig};
pub use error::{CompileError, CompileResult};
pub use scheduler::{Schedule, schedule};
