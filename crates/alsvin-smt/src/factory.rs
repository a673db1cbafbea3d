//! Deriving a solver geometry from an architecture description.

use alsvin_arch::{Architecture, SiteGrid};

use crate::error::{SolverError, SolverResult};
use crate::solver::{NaSolver, SolverSpec};

/// Physical parameters needed to derive offset and stacking bounds.
#[derive(Debug, Clone, Copy)]
pub struct BeamParameters {
    /// Rydberg interaction radius.
    pub interaction_radius: i64,
    /// Minimum distance between trapped atoms.
    pub min_atom_distance: i64,
    /// Radius below which parked atoms would still disturb each other.
    pub no_interaction_radius: i64,
}

/// How many rows/columns of AOD atoms can stack around one site so that the
/// outermost pair still interacts.
///
/// Assuming the same vertical and horizontal stacking factor, the bound
/// follows from requiring the corner atom to stay within the interaction
/// radius of the site atom.
fn stacking_bounds(beam: &BeamParameters) -> (u32, u32) {
    let r2 = (beam.interaction_radius * beam.interaction_radius) as f64;
    let d2 = (beam.min_atom_distance * beam.min_atom_distance) as f64;
    let v = f64::min(
        (0.2 + (0.8 * r2 / d2 - 0.16).sqrt()).floor(),
        (std::f64::consts::FRAC_1_SQRT_2 * beam.interaction_radius as f64
            / beam.min_atom_distance as f64
            + 1.0)
            .floor(),
    ) as u32;
    let vd = i64::from(v) * beam.min_atom_distance;
    let half = i64::from(v) / 2 * beam.min_atom_distance;
    let prev = i64::from(v.saturating_sub(1)) * beam.min_atom_distance;
    let h = if (vd * vd + half * half) as f64 <= r2 && (prev * prev + vd * vd) as f64 <= r2 {
        v + 1
    } else {
        v
    };
    (h, v)
}

/// Build a solver from a zoned architecture: the entanglement zone defines
/// the entangling rows, the first storage zone extends the grid below.
pub fn solver_from_architecture(arch: &Architecture) -> SolverResult<NaSolver> {
    let pair = arch
        .entanglement_zones
        .first()
        .ok_or_else(|| SolverError::InvalidArchitecture("no entanglement zone".into()))?;
    let interaction = arch
        .slm(pair[0])
        .map_err(|e| SolverError::InvalidArchitecture(e.to_string()))?;
    let storage_id = *arch
        .storage_zones
        .first()
        .ok_or_else(|| SolverError::InvalidArchitecture("no storage zone".into()))?;
    let storage = arch
        .slm(storage_id)
        .map_err(|e| SolverError::InvalidArchitecture(e.to_string()))?;
    let aod = arch
        .aods
        .first()
        .ok_or_else(|| SolverError::InvalidArchitecture("no AOD".into()))?;
    let max_x = interaction.cols as u32 - 1;
    let max_entangling_y = interaction.rows as u32 - 1;
    let max_y = max_entangling_y + storage.rows as u32;
    let beam = BeamParameters {
        interaction_radius: arch.rydberg_radius,
        min_atom_distance: arch.min_atom_distance,
        no_interaction_radius: arch.no_interaction_radius,
    };
    let (max_h_dist, max_v_dist) = stacking_bounds(&beam);
    let margin = beam.no_interaction_radius / 2 / beam.min_atom_distance;
    let max_h_offset = (interaction.site_separation.0 - margin).max(0) as u32;
    let max_v_offset = (interaction.site_separation.1 - margin).max(0) as u32;
    NaSolver::new(SolverSpec {
        max_x,
        max_y,
        min_entangling_y: 0,
        max_entangling_y,
        max_c: aod.cols as u32,
        max_r: aod.rows as u32,
        max_h_offset,
        max_v_offset,
        max_h_dist,
        max_v_dist,
    })
}

/// Build a solver from a flat site enumeration plus explicit entangling
/// rows, AOD dimensions, and beam parameters.
pub fn solver_from_grid(
    grid: &SiteGrid,
    min_entangling_y: u32,
    max_entangling_y: u32,
    aod_rows: u32,
    aod_cols: u32,
    beam: &BeamParameters,
) -> SolverResult<NaSolver> {
    let sites = grid.sites();
    let (x0, y0) = sites[0];
    let right = sites
        .iter()
        .filter(|&&(x, y)| y == y0 && x > x0)
        .map(|&(x, _)| x)
        .min();
    let below = sites
        .iter()
        .filter(|&&(x, y)| x == x0 && y > y0)
        .map(|&(_, y)| y)
        .min();
    let (Some(right), Some(below)) = (right, below) else {
        return Err(SolverError::InvalidArchitecture(
            "there is no site to the right of or below the first grid site".into(),
        ));
    };
    let margin = beam.no_interaction_radius / 2 / beam.min_atom_distance;
    let max_h_offset = (right - x0 - margin).max(0) as u32;
    let max_v_offset = (below - y0 - margin).max(0) as u32;
    let (max_h_dist, max_v_dist) = stacking_bounds(beam);
    NaSolver::new(SolverSpec {
        max_x: grid.max_x(),
        max_y: grid.max_y(),
        min_entangling_y,
        max_entangling_y,
        max_c: aod_cols,
        max_r: aod_rows,
        max_h_offset,
        max_v_offset,
        max_h_dist,
        max_v_dist,
    })
}
