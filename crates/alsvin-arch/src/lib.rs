//! Alsvin architecture model
//!
//! Immutable description of a zoned neutral-atom trap lattice: storage
//! zones, entanglement zones (paired SLMs sharing cell coordinates), AOD
//! descriptors, and Rydberg illumination ranges, with the distance and
//! nearest-site queries the placer and router build on.
//!
//! The architecture is loaded once from JSON ([`Architecture::from_json`])
//! and shared by reference afterwards; the exact-solver variant instead
//! consumes a flat site enumeration ([`SiteGrid`]).

pub mod architecture;
pub mod error;
pub mod grid;
pub mod slm;

pub use architecture::Architecture;
pub use error::{ArchError, ArchResult};
pub use grid::SiteGrid;
pub use slm::{Aod, Rect, Site, Slm, SlmId, ZoneRole};
