//! SLM descriptors and sites.

use serde::{Deserialize, Serialize};

/// Identifier of an SLM trap array.
pub type SlmId = u32;

/// Which zone an SLM belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneRole {
    /// Idle storage; no Rydberg interaction.
    Storage {
        /// Id of the storage zone.
        zone: u32,
    },
    /// One side of an entanglement-zone SLM pair.
    Entanglement {
        /// Id of the entanglement zone.
        zone: u32,
        /// 0 for the first pair member, 1 for the second.
        side: u8,
    },
}

/// A static trap array: a grid of sites with fixed geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slm {
    /// Identifier, unique across the architecture.
    pub id: SlmId,
    /// Number of site rows.
    pub rows: usize,
    /// Number of site columns.
    pub cols: usize,
    /// Location of site (0, 0) in architecture units.
    pub location: (i64, i64),
    /// Horizontal and vertical distance between neighboring sites.
    pub site_separation: (i64, i64),
    /// The zone this SLM belongs to.
    pub role: ZoneRole,
}

impl Slm {
    /// Whether this SLM is part of a storage zone.
    #[inline]
    pub fn is_storage(&self) -> bool {
        matches!(self.role, ZoneRole::Storage { .. })
    }

    /// Whether this SLM is one side of an entanglement zone.
    #[inline]
    pub fn is_entanglement(&self) -> bool {
        matches!(self.role, ZoneRole::Entanglement { .. })
    }

    /// Exact coordinates of the site at `(row, col)`.
    #[inline]
    pub fn site_location(&self, row: usize, col: usize) -> (i64, i64) {
        (
            self.location.0 + self.site_separation.0 * col as i64,
            self.location.1 + self.site_separation.1 * row as i64,
        )
    }
}

/// A concrete trap site: an SLM plus discrete row and column.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Site {
    /// The SLM the site belongs to.
    pub slm: SlmId,
    /// Row within the SLM.
    pub row: u32,
    /// Column within the SLM.
    pub col: u32,
}

impl Site {
    /// Construct a site.
    #[inline]
    pub fn new(slm: SlmId, row: usize, col: usize) -> Self {
        Self {
            slm,
            row: row as u32,
            col: col as u32,
        }
    }
}

/// An AOD descriptor: the dynamically steered trap grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aod {
    /// Identifier.
    pub id: u32,
    /// Minimum separation between AOD lines, in architecture units.
    pub site_separation: i64,
    /// Maximum number of rows one move group may use.
    pub rows: usize,
    /// Maximum number of columns one move group may use.
    pub cols: usize,
}

/// An axis-aligned rectangle, as used for Rydberg illumination ranges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Lower-left corner.
    pub min: (i64, i64),
    /// Upper-right corner.
    pub max: (i64, i64),
}

impl Rect {
    /// Whether the rectangle contains the point.
    #[inline]
    pub fn contains(&self, p: (i64, i64)) -> bool {
        self.min.0 <= p.0 && p.0 <= self.max.0 && self.min.1 <= p.1 && p.1 <= self.max.1
    }
}
