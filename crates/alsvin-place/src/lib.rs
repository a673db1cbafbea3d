//! Alsvin placement and routing
//!
//! The heuristic half of the compiler core: an A\*-based placer that, per
//! two-qubit layer, moves gate operands onto free entanglement pair sites
//! and freed atoms back to storage, and an independent-set router that
//! partitions the resulting moves into AOD-compatible groups.
//!
//! The placer works on discretized row/column indices and scores candidate
//! assignments by the travel distances of order-compatible move groups; see
//! [`AStarPlacer`]. Routing legality is pairwise order preservation on both
//! axes; see [`IndependentSetRouter`].

pub mod astar;
pub mod config;
pub mod error;
pub mod placer;
pub mod router;

pub use astar::best_first_search;
pub use config::PlacerConfig;
pub use error::{PlaceError, PlaceResult};
pub use placer::{AStarPlacer, GateLayer, Placement, ReuseSet};
pub use router::{IndependentSetRouter, RoutingStep};
