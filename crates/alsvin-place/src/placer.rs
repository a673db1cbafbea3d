//! The A* placer: assigns gate pairs to entanglement sites before each
//! Rydberg pulse and returns freed atoms to storage afterwards.
//!
//! Placement decisions are discretized to row and column indices; the
//! search groups compatible moves so that the cost reflects the number of
//! sequential AOD rearrangements and their longest travel distances.

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use alsvin_arch::{Architecture, Site, Slm, SlmId};
use alsvin_ir::QubitId;

use crate::astar::best_first_search;
use crate::config::PlacerConfig;
use crate::error::{PlaceError, PlaceResult};

/// A placement: one site per qubit.
pub type Placement = Vec<Site>;

/// One layer of two-qubit gates (a matching over the qubits).
pub type GateLayer = Vec<(QubitId, QubitId)>;

/// Qubits that stay in the entanglement zone for the next layer.
pub type ReuseSet = FxHashSet<QubitId>;

/// A site in discretized coordinates: (row index, column index).
type DiscreteSite = (u16, u16);

/// A physical row or column of one SLM.
type RowColKey = (SlmId, u32);

/// One horizontal/vertical compatibility group: order-preserving maps from
/// source to target indices. A placement fits a group iff, on both axes,
/// its target value lies strictly between the values of its neighboring
/// source keys (or matches exactly when the key is already present).
#[derive(Debug, Clone, Default)]
struct CompatibilityGroup {
    h: BTreeMap<u16, u16>,
    v: BTreeMap<u16, u16>,
}

/// Whether `key → value` fits into the given order-preserving map.
/// `Some(true)` means the key already maps to the value.
fn fits_into(key: u16, value: u16, map: &BTreeMap<u16, u16>) -> Option<bool> {
    if let Some((&upper_key, &upper_value)) = map.range(key..).next() {
        if upper_key == key {
            if upper_value == value {
                return Some(true);
            }
        } else if let Some((_, &lower_value)) = map.range(..key).next_back() {
            if lower_value < value && value < upper_value {
                return Some(false);
            }
        } else if value < upper_value {
            return Some(false);
        }
    } else {
        let (_, &lower_value) = map
            .range(..key)
            .next_back()
            .expect("a group holds at least one placement");
        if lower_value < value {
            return Some(false);
        }
    }
    None
}

/// Join an existing compatible group or open a new one.
fn join_or_open_group(
    current: DiscreteSite,
    target: DiscreteSite,
    distance: f64,
    groups: &mut Vec<CompatibilityGroup>,
    max_distances: &mut Vec<f64>,
) {
    for (i, group) in groups.iter_mut().enumerate() {
        if let Some(h_exists) = fits_into(current.0, target.0, &group.h)
            && let Some(v_exists) = fits_into(current.1, target.1, &group.v)
        {
            if !h_exists {
                group.h.insert(current.0, target.0);
            }
            if !v_exists {
                group.v.insert(current.1, target.1);
            }
            max_distances[i] = max_distances[i].max(distance);
            return;
        }
    }
    let mut group = CompatibilityGroup::default();
    group.h.insert(current.0, target.0);
    group.v.insert(current.1, target.1);
    groups.push(group);
    max_distances.push(distance);
}

/// One node of the placement search tree.
#[derive(Debug, Clone, Default)]
struct SearchNode {
    /// Number of jobs placed so far.
    level: usize,
    /// The option index chosen for the job placed at this node.
    option: u16,
    /// Accumulated lookahead contributions of the chosen options.
    lookahead_cost: f64,
    /// Discrete target sites already used.
    consumed: FxHashSet<DiscreteSite>,
    /// Compatibility groups of the placements so far.
    groups: Vec<CompatibilityGroup>,
    /// Greatest squared travel distance per group.
    group_max_distances: Vec<f64>,
}

fn node_cost(node: &SearchNode) -> f64 {
    node.lookahead_cost
        + node
            .group_max_distances
            .iter()
            .map(|d| d.sqrt())
            .sum::<f64>()
}

/// Sum over groups and axes of the standard deviation of
/// `target − scale·source`, the balance term of the heuristic.
fn sum_std_deviation(scale: [f64; 2], groups: &[CompatibilityGroup]) -> f64 {
    let mut sum = 0.0;
    for group in groups {
        for (axis, map) in [&group.h, &group.v].into_iter().enumerate() {
            let n = map.len() as f64;
            let diffs: Vec<f64> = map
                .iter()
                .map(|(&k, &v)| f64::from(v) - scale[axis] * f64::from(k))
                .collect();
            let mean = diffs.iter().sum::<f64>() / n;
            let variance = diffs.iter().map(|d| (d - mean) * (d - mean)).sum::<f64>() / n;
            sum += variance.sqrt();
        }
    }
    sum
}

/// One candidate pair of sites for a gate, with per-atom travel distances.
#[derive(Debug, Clone)]
struct GateOption {
    sites: [DiscreteSite; 2],
    distances: [f64; 2],
    lookahead_cost: f64,
}

/// A gate that must be placed on a free entanglement pair.
#[derive(Debug, Clone)]
struct GateJob {
    qubits: (QubitId, QubitId),
    current_sites: [DiscreteSite; 2],
    options: Vec<GateOption>,
    mean_lookahead_cost: f64,
}

/// One candidate site for an atom returning to storage.
#[derive(Debug, Clone)]
struct AtomOption {
    site: DiscreteSite,
    distance: f64,
    reuse: bool,
    lookahead_cost: f64,
}

/// An atom that must be returned to storage (or kept for reuse).
#[derive(Debug, Clone)]
struct AtomJob {
    atom: QubitId,
    current_site: DiscreteSite,
    options: Vec<AtomOption>,
    mean_lookahead_cost: f64,
}

/// The layer-by-layer A* placer.
pub struct AStarPlacer<'a> {
    architecture: &'a Architecture,
    config: PlacerConfig,
    /// Fill the initial placement starting from the storage row nearest to
    /// the entanglement zone.
    reverse_initial_placement: bool,
}

impl<'a> AStarPlacer<'a> {
    /// Create a placer for an architecture.
    pub fn new(architecture: &'a Architecture, config: PlacerConfig) -> PlaceResult<Self> {
        let first_storage = architecture.slm(architecture.storage_zones[0])?;
        let first_entanglement = architecture.slm(architecture.entanglement_zones[0][0])?;
        let reverse_initial_placement = first_storage.location.1 < first_entanglement.location.1;
        Ok(Self {
            architecture,
            config,
            reverse_initial_placement,
        })
    }

    /// Produce the full placement sequence for the given two-qubit layers:
    /// one initial placement, then an execution and a storage placement per
    /// layer.
    pub fn place(
        &self,
        num_qubits: usize,
        layers: &[GateLayer],
        reuse: &[ReuseSet],
    ) -> PlaceResult<Vec<Placement>> {
        let empty_reuse = ReuseSet::default();
        let empty_layer = GateLayer::new();
        debug!(num_qubits, layers = layers.len(), "placing entangling layers");
        let mut placements = Vec::with_capacity(2 * layers.len() + 1);
        placements.push(self.make_initial_placement(num_qubits)?);
        for (layer, gates) in layers.iter().enumerate() {
            let previous_reuse = if layer == 0 {
                &empty_reuse
            } else {
                reuse.get(layer - 1).unwrap_or(&empty_reuse)
            };
            let current_reuse = reuse.get(layer).unwrap_or(&empty_reuse);
            let next_gates = layers.get(layer + 1).unwrap_or(&empty_layer);
            let execution = self.place_gates(
                placements.last().expect("initial placement exists"),
                previous_reuse,
                gates,
                current_reuse,
                next_gates,
            )?;
            let storage = self.place_atoms(&execution, current_reuse, gates, next_gates)?;
            placements.push(execution);
            placements.push(storage);
        }
        Ok(placements)
    }

    /// Row-major fill of the storage zones, starting from the row facing
    /// the entanglement zone.
    pub fn make_initial_placement(&self, num_qubits: usize) -> PlaceResult<Placement> {
        let mut zones = self.architecture.storage_zones.iter();
        let mut slm = self.take_next_storage(&mut zones)?;
        let step: i64 = if self.reverse_initial_placement { -1 } else { 1 };
        let mut r: i64 = if self.reverse_initial_placement {
            slm.rows as i64 - 1
        } else {
            0
        };
        let mut c: usize = 0;
        let mut placement = Vec::with_capacity(num_qubits);
        for _ in 0..num_qubits {
            if c == slm.cols {
                c = 0;
                r += step;
            }
            if r < 0 || r >= slm.rows as i64 {
                slm = self.take_next_storage(&mut zones)?;
                r = if step < 0 { slm.rows as i64 - 1 } else { 0 };
            }
            placement.push(Site::new(slm.id, r as usize, c));
            c += 1;
        }
        Ok(placement)
    }

    fn take_next_storage(
        &self,
        zones: &mut std::slice::Iter<'_, SlmId>,
    ) -> PlaceResult<&'a Slm> {
        let id = zones.next().ok_or_else(|| {
            PlaceError::InvalidInput("storage zones cannot hold all qubits".into())
        })?;
        Ok(self.architecture.slm(*id)?)
    }

    /// The nearest storage site that is not occupied; anchors the
    /// candidate window of an atom job.
    fn nearest_free_storage_site(
        &self,
        site: Site,
        occupied: &BTreeSet<Site>,
    ) -> PlaceResult<Site> {
        let (x, y) = self.architecture.exact_location(site)?;
        let mut best: Option<(f64, Site)> = None;
        for &id in &self.architecture.storage_zones {
            let slm = self.architecture.slm(id)?;
            for r in 0..slm.rows {
                for c in 0..slm.cols {
                    let candidate = Site::new(id, r, c);
                    if occupied.contains(&candidate) {
                        continue;
                    }
                    let (sx, sy) = slm.site_location(r, c);
                    let dx = (sx - x) as f64;
                    let dy = (sy - y) as f64;
                    let d = dx * dx + dy * dy;
                    if best.is_none_or(|(bd, _)| d < bd) {
                        best = Some((d, candidate));
                    }
                }
            }
        }
        best.map(|(_, s)| s).ok_or_else(|| {
            PlaceError::InvalidInput("no free storage site remains for an atom".into())
        })
    }

    /// Discretize the current placement of the given atoms into row and
    /// column indices; equal physical coordinates share an index.
    fn discretize_placement(
        &self,
        placement: &Placement,
        atoms: &[QubitId],
    ) -> PlaceResult<(FxHashMap<RowColKey, u16>, FxHashMap<RowColKey, u16>)> {
        let mut rows: BTreeMap<i64, BTreeSet<RowColKey>> = BTreeMap::new();
        let mut cols: BTreeMap<i64, BTreeSet<RowColKey>> = BTreeMap::new();
        for &atom in atoms {
            let site = placement[atom.index()];
            let (x, y) = self.architecture.exact_location(site)?;
            rows.entry(y).or_default().insert((site.slm, site.row));
            cols.entry(x).or_default().insert((site.slm, site.col));
        }
        Ok((index_grouped(rows), index_grouped(cols)))
    }

    /// Discretize the rows and columns of storage SLMs that still have a
    /// free site.
    fn discretize_free_storage(
        &self,
        occupied: &BTreeSet<Site>,
    ) -> PlaceResult<(FxHashMap<RowColKey, u16>, FxHashMap<RowColKey, u16>)> {
        let mut rows: BTreeMap<i64, RowColKey> = BTreeMap::new();
        let mut cols: BTreeMap<i64, RowColKey> = BTreeMap::new();
        for &id in &self.architecture.storage_zones {
            let slm = self.architecture.slm(id)?;
            for r in 0..slm.rows {
                if (0..slm.cols).any(|c| !occupied.contains(&Site::new(id, r, c))) {
                    rows.entry(slm.site_location(r, 0).1)
                        .or_insert((id, r as u32));
                }
            }
            for c in 0..slm.cols {
                if (0..slm.rows).any(|r| !occupied.contains(&Site::new(id, r, c))) {
                    cols.entry(slm.site_location(0, c).0)
                        .or_insert((id, c as u32));
                }
            }
        }
        Ok((index_single(rows), index_single(cols)))
    }

    /// Discretize the rows and columns of entanglement SLMs that still have
    /// a free pair site.
    fn discretize_free_entanglement(
        &self,
        occupied: &BTreeSet<Site>,
    ) -> PlaceResult<(FxHashMap<RowColKey, u16>, FxHashMap<RowColKey, u16>)> {
        let mut rows: BTreeMap<i64, BTreeSet<RowColKey>> = BTreeMap::new();
        let mut cols: BTreeMap<i64, BTreeSet<RowColKey>> = BTreeMap::new();
        for pair in &self.architecture.entanglement_zones {
            for &id in pair {
                let slm = self.architecture.slm(id)?;
                for r in 0..slm.rows {
                    if (0..slm.cols).any(|c| !occupied.contains(&Site::new(id, r, c))) {
                        rows.entry(slm.site_location(r, 0).1)
                            .or_default()
                            .insert((id, r as u32));
                    }
                }
                for c in 0..slm.cols {
                    if (0..slm.rows).any(|r| !occupied.contains(&Site::new(id, r, c))) {
                        cols.entry(slm.site_location(0, c).0)
                            .or_default()
                            .insert((id, c as u32));
                    }
                }
            }
        }
        Ok((index_grouped(rows), index_grouped(cols)))
    }

    /// Place the gates of a layer onto free entanglement pair sites.
    fn place_gates(
        &self,
        previous: &Placement,
        reuse: &ReuseSet,
        gates: &GateLayer,
        next_reuse: &ReuseSet,
        next_gates: &GateLayer,
    ) -> PlaceResult<Placement> {
        let mut current = previous.clone();
        // Gates with a reused operand keep their pair site: the partner is
        // pinned to the other half. Everything else is placed by search.
        let mut gates_to_place: Vec<(f64, (QubitId, QubitId))> = Vec::new();
        let mut atoms_to_place: Vec<QubitId> = Vec::new();
        for &(first, second) in gates {
            let first_reuse = reuse.contains(&first)
                && self
                    .architecture
                    .is_entanglement_site(previous[first.index()])?;
            let second_reuse = reuse.contains(&second)
                && self
                    .architecture
                    .is_entanglement_site(previous[second.index()])?;
            if first_reuse {
                current[second.index()] = self
                    .architecture
                    .other_entanglement_site(previous[first.index()])?;
                continue;
            }
            if second_reuse {
                current[first.index()] = self
                    .architecture
                    .other_entanglement_site(previous[second.index()])?;
                continue;
            }
            let nearest = self
                .architecture
                .nearest_entanglement_site(previous[first.index()], previous[second.index()])?;
            let other = self.architecture.other_entanglement_site(nearest)?;
            //       nearest    other
            //         ┌─┐       ┌─┐ <-- entanglement sites
            //         └┬┘       └┬┘
            //          │╲dis2   ╱│
            //     dis1 │  ╲   ╱  │
            //          │    ╳    │
            //          │  ╱   ╲  │ dis4
            //          │╱dis3   ╲│
            //         ┌┴┐       ┌┴┐ <-- current sites
            //         └─┘       └─┘
            //          ^         ^
            //        first     second
            let dis1 = self.architecture.distance(previous[first.index()], nearest)?;
            let dis2 = self
                .architecture
                .distance(previous[second.index()], nearest)?;
            let dis3 = self.architecture.distance(previous[first.index()], other)?;
            let dis4 = self
                .architecture
                .distance(previous[second.index()], other)?;
            let sort_key = if dis1 + dis4 <= dis2 + dis3 {
                dis1.max(dis4)
            } else {
                dis2.max(dis3)
            };
            gates_to_place.push((sort_key, (first, second)));
            atoms_to_place.push(first);
            atoms_to_place.push(second);
        }
        if gates_to_place.is_empty() {
            return Ok(current);
        }
        // commit the hardest gates first
        gates_to_place.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

        let (source_rows, source_cols) = self.discretize_placement(previous, &atoms_to_place)?;
        // pair sites blocked by reused atoms (both halves)
        let mut occupied: BTreeSet<Site> = BTreeSet::new();
        for &qubit in reuse {
            let site = previous[qubit.index()];
            if self.architecture.is_entanglement_site(site)? {
                occupied.insert(site);
                occupied.insert(self.architecture.other_entanglement_site(site)?);
            }
        }
        let (target_rows, target_cols) = self.discretize_free_entanglement(&occupied)?;
        let target_sites = build_target_sites(&target_rows, &target_cols);

        let n_jobs = gates_to_place.len();
        let mut jobs: Vec<GateJob> = Vec::with_capacity(n_jobs);
        for &(_, (left, right)) in &gates_to_place {
            let left_site = previous[left.index()];
            let right_site = previous[right.index()];
            let nearest = self
                .architecture
                .nearest_entanglement_site(left_site, right_site)?;
            let slm = self.architecture.slm(nearest.slm)?;
            let mut job = GateJob {
                qubits: (left, right),
                current_sites: [
                    (
                        source_rows[&(left_site.slm, left_site.row)],
                        source_cols[&(left_site.slm, left_site.col)],
                    ),
                    (
                        source_rows[&(right_site.slm, right_site.row)],
                        source_cols[&(right_site.slm, right_site.col)],
                    ),
                ],
                options: Vec::new(),
                mean_lookahead_cost: 0.0,
            };
            let mut bounds = self.initial_window(nearest, slm);
            for r in bounds.0..bounds.1 {
                for c in bounds.2..bounds.3 {
                    if !occupied.contains(&Site::new(nearest.slm, r, c)) {
                        self.add_gate_option(
                            &target_rows,
                            &target_cols,
                            left_site,
                            right_site,
                            Site::new(nearest.slm, r, c),
                            &mut job,
                        )?;
                    }
                }
            }
            let mut expansion = 0usize;
            while self.config.use_window
                && (job.options.len() as f64) < self.config.window_share * n_jobs as f64
            {
                if bounds == (0, slm.rows, 0, slm.cols) {
                    break;
                }
                expansion += 1;
                let new_bounds = self.expanded_window(nearest, slm, expansion, 1);
                for (r, c) in window_border(bounds, new_bounds) {
                    if !occupied.contains(&Site::new(nearest.slm, r, c)) {
                        self.add_gate_option(
                            &target_rows,
                            &target_cols,
                            left_site,
                            right_site,
                            Site::new(nearest.slm, r, c),
                            &mut job,
                        )?;
                    }
                }
                bounds = new_bounds;
            }
            job.options.sort_by(|a, b| {
                a.distances[0]
                    .max(a.distances[1])
                    .total_cmp(&b.distances[0].max(b.distances[1]))
                    .then(a.sites.cmp(&b.sites))
            });
            // When a gate operand is reused by the next layer, this
            // placement also decides the next gate's geometry; bias the
            // choice by the distance to the next interaction partner.
            let left_reuse = next_reuse.contains(&left);
            let right_reuse = next_reuse.contains(&right);
            if left_reuse || right_reuse {
                let partner = next_gates.iter().find_map(|&(a, b)| {
                    if left_reuse && a == left || right_reuse && a == right {
                        Some(b)
                    } else if left_reuse && b == left || right_reuse && b == right {
                        Some(a)
                    } else {
                        None
                    }
                });
                if let Some(partner) = partner {
                    let partner_site = previous[partner.index()];
                    let side = if left_reuse { 0 } else { 1 };
                    let mut mean = 0.0;
                    for option in &mut job.options {
                        let (r, c) = option.sites[side];
                        let target = target_sites[&r][&c];
                        let distance = self.architecture.distance(partner_site, target)?;
                        option.lookahead_cost = self.config.lookahead_factor * distance.sqrt();
                        mean += option.lookahead_cost;
                    }
                    job.mean_lookahead_cost = mean / job.options.len() as f64;
                }
            }
            jobs.push(job);
        }

        let scale = [
            scale_factor(&source_rows, &target_rows),
            scale_factor(&source_cols, &target_cols),
        ];
        let path = self.run_gate_search(&jobs, scale, n_jobs)?;
        for (i, job) in jobs.iter().enumerate() {
            let option = &job.options[path[i + 1].option as usize];
            for (side, &atom) in [job.qubits.0, job.qubits.1].iter().enumerate() {
                let (r, c) = option.sites[side];
                current[atom.index()] = target_sites[&r][&c];
            }
        }
        Ok(current)
    }

    /// Both orientations of a gate on a pair site; keep the one with the
    /// smaller summed travel.
    #[allow(clippy::too_many_arguments)]
    fn add_gate_option(
        &self,
        target_rows: &FxHashMap<RowColKey, u16>,
        target_cols: &FxHashMap<RowColKey, u16>,
        left_site: Site,
        right_site: Site,
        near: Site,
        job: &mut GateJob,
    ) -> PlaceResult<()> {
        let other = self.architecture.other_entanglement_site(near)?;
        let dis1 = self.architecture.distance(left_site, near)?;
        let dis2 = self.architecture.distance(right_site, near)?;
        let dis3 = self.architecture.distance(left_site, other)?;
        let dis4 = self.architecture.distance(right_site, other)?;
        let discrete = |site: Site| -> DiscreteSite {
            (
                target_rows[&(site.slm, site.row)],
                target_cols[&(site.slm, site.col)],
            )
        };
        if dis1 + dis4 <= dis2 + dis3 {
            job.options.push(GateOption {
                sites: [discrete(near), discrete(other)],
                distances: [dis1, dis4],
                lookahead_cost: 0.0,
            });
        } else {
            job.options.push(GateOption {
                sites: [discrete(other), discrete(near)],
                distances: [dis2, dis3],
                lookahead_cost: 0.0,
            });
        }
        Ok(())
    }

    /// Return the freed atoms of a layer to storage sites.
    fn place_atoms(
        &self,
        previous: &Placement,
        reuse: &ReuseSet,
        gates: &GateLayer,
        next_gates: &GateLayer,
    ) -> PlaceResult<Placement> {
        let mut current = previous.clone();
        if gates.is_empty() {
            return Ok(current);
        }
        // order: the atom with the greatest nearest-storage distance first,
        // the rest by ascending distance from that pivot
        let mut atoms_to_place: Vec<QubitId> = Vec::new();
        let mut max_distance = -1.0;
        let mut pivot_index = 0;
        for &(a, b) in gates {
            for qubit in [a, b] {
                let site = previous[qubit.index()];
                let nearest = self.architecture.nearest_storage_site(site)?;
                let distance = self.architecture.distance(site, nearest)?;
                if distance > max_distance {
                    max_distance = distance;
                    pivot_index = atoms_to_place.len();
                }
                atoms_to_place.push(qubit);
            }
        }
        atoms_to_place.swap(0, pivot_index);
        let pivot_site = previous[atoms_to_place[0].index()];
        let mut rest: Vec<(f64, QubitId)> = atoms_to_place[1..]
            .iter()
            .map(|&q| {
                let d = self
                    .architecture
                    .distance(previous[q.index()], pivot_site)
                    .expect("placement sites are valid");
                (d, q)
            })
            .collect();
        rest.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        for (i, (_, q)) in rest.into_iter().enumerate() {
            atoms_to_place[i + 1] = q;
        }

        let (source_rows, source_cols) = self.discretize_placement(previous, &atoms_to_place)?;
        let mut occupied: BTreeSet<Site> = BTreeSet::new();
        for &site in previous.iter() {
            if self.architecture.is_storage_site(site)? {
                occupied.insert(site);
            }
        }
        let (target_rows, target_cols) = self.discretize_free_storage(&occupied)?;
        let target_sites = build_target_sites(&target_rows, &target_cols);

        let n_jobs = atoms_to_place.len();
        let mut jobs: Vec<AtomJob> = Vec::with_capacity(n_jobs);
        let mut min_nearest_col = u16::MAX;
        let mut max_nearest_col = 0u16;
        for &atom in &atoms_to_place {
            let site = previous[atom.index()];
            let nearest = self.nearest_free_storage_site(site, &occupied)?;
            let slm = self.architecture.slm(nearest.slm)?;
            let nearest_col = target_cols[&(nearest.slm, nearest.col)];
            min_nearest_col = min_nearest_col.min(nearest_col);
            max_nearest_col = max_nearest_col.max(nearest_col);
            let mut job = AtomJob {
                atom,
                current_site: (
                    source_rows[&(site.slm, site.row)],
                    source_cols[&(site.slm, site.col)],
                ),
                options: Vec::new(),
                mean_lookahead_cost: 0.0,
            };
            if reuse.contains(&atom) {
                // a reused atom may simply stay at its pair site
                job.options.push(AtomOption {
                    site: (0, 0),
                    distance: 0.0,
                    reuse: true,
                    lookahead_cost: 0.0,
                });
            }
            let mut bounds = self.initial_window(nearest, slm);
            for r in bounds.0..bounds.1 {
                for c in bounds.2..bounds.3 {
                    let candidate = Site::new(nearest.slm, r, c);
                    if !occupied.contains(&candidate) {
                        job.options.push(AtomOption {
                            site: (
                                target_rows[&(candidate.slm, candidate.row)],
                                target_cols[&(candidate.slm, candidate.col)],
                            ),
                            distance: self.architecture.distance(site, candidate)?,
                            reuse: false,
                            lookahead_cost: 0.0,
                        });
                    }
                }
            }
            let mut expansion = 0usize;
            while self.config.use_window
                && (job.options.len() as f64) < self.config.window_share * n_jobs as f64
            {
                if bounds == (0, slm.rows, 0, slm.cols) {
                    break;
                }
                expansion += 1;
                let new_bounds = self.expanded_window(nearest, slm, expansion, 2);
                for (r, c) in window_border(bounds, new_bounds) {
                    let candidate = Site::new(nearest.slm, r, c);
                    if !occupied.contains(&candidate) {
                        job.options.push(AtomOption {
                            site: (
                                target_rows[&(candidate.slm, candidate.row)],
                                target_cols[&(candidate.slm, candidate.col)],
                            ),
                            distance: self.architecture.distance(site, candidate)?,
                            reuse: false,
                            lookahead_cost: 0.0,
                        });
                    }
                }
                bounds = new_bounds;
            }
            job.options
                .sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.site.cmp(&b.site)));
            // lookahead towards the next interaction partner of this atom
            if let Some(partner) = next_gates.iter().find_map(|&(a, b)| {
                if a == atom {
                    Some(b)
                } else if b == atom {
                    Some(a)
                } else {
                    None
                }
            }) {
                let partner_site = previous[partner.index()];
                let mut mean = 0.0;
                for option in &mut job.options {
                    if option.reuse {
                        // the cost of reusing is the partner's travel to the
                        // kept pair site, discounted by the reuse level
                        let distance = self.architecture.distance(partner_site, site)?;
                        option.lookahead_cost =
                            (distance.sqrt() - self.config.reuse_level).max(0.0);
                    } else {
                        let (r, c) = option.site;
                        let target = target_sites[&r][&c];
                        let distance = self.architecture.distance(partner_site, target)?;
                        option.lookahead_cost = self.config.lookahead_factor * distance.sqrt();
                    }
                    mean += option.lookahead_cost;
                }
                job.mean_lookahead_cost = mean / job.options.len() as f64;
            }
            jobs.push(job);
        }

        let row_scale = scale_factor(&source_rows, &target_rows);
        let max_source_col = max_index(&source_cols);
        let max_target_col = max_index(&target_cols);
        let spread =
            f64::from(max_nearest_col - min_nearest_col) / f64::from(max_source_col);
        let col_scale = (f64::from(1 + max_target_col) / f64::from(1 + max_source_col))
            .min(spread.max(1.0));
        let scale = [row_scale, col_scale];

        let path = self.run_atom_search(&jobs, scale, n_jobs)?;
        for (i, job) in jobs.iter().enumerate() {
            let option = &job.options[path[i + 1].option as usize];
            if !option.reuse {
                let (r, c) = option.site;
                current[job.atom.index()] = target_sites[&r][&c];
            }
        }
        Ok(current)
    }

    fn run_gate_search(
        &self,
        jobs: &[GateJob],
        scale: [f64; 2],
        n_jobs: usize,
    ) -> PlaceResult<Vec<SearchNode>> {
        let deepening_factor = self.config.deepening_factor;
        let deepening_value = self.config.deepening_value;
        best_first_search(
            SearchNode::default(),
            |node: &SearchNode| {
                let job = &jobs[node.level];
                let mut children = Vec::new();
                for (i, option) in job.options.iter().enumerate() {
                    if option.sites.iter().any(|s| node.consumed.contains(s)) {
                        continue;
                    }
                    let mut child = node.clone();
                    child.level += 1;
                    child.option = i as u16;
                    child.consumed.insert(option.sites[0]);
                    child.consumed.insert(option.sites[1]);
                    for side in 0..2 {
                        join_or_open_group(
                            job.current_sites[side],
                            option.sites[side],
                            option.distances[side],
                            &mut child.groups,
                            &mut child.group_max_distances,
                        );
                    }
                    child.lookahead_cost += option.lookahead_cost;
                    children.push(child);
                }
                children
            },
            |node| node.level == n_jobs,
            node_cost,
            |node| {
                let unplaced = (n_jobs - node.level) as f64;
                let mut max_unplaced = 0.0f64;
                let mut acc_lookahead = 0.0;
                for job in &jobs[node.level..] {
                    acc_lookahead += job.mean_lookahead_cost;
                    // options are distance-sorted, so the first free pair is
                    // the nearest one
                    for option in &job.options {
                        if option.sites.iter().all(|s| !node.consumed.contains(s)) {
                            max_unplaced =
                                max_unplaced.max(option.distances[0].max(option.distances[1]));
                            break;
                        }
                    }
                }
                let max_placed = node
                    .group_max_distances
                    .iter()
                    .copied()
                    .fold(0.0f64, f64::max);
                let mut h = if max_unplaced <= max_placed {
                    0.0
                } else {
                    max_unplaced.sqrt() - max_placed.sqrt()
                };
                h += acc_lookahead;
                h += deepening_factor
                    * (sum_std_deviation(scale, &node.groups) + deepening_value)
                    * unplaced;
                h
            },
        )
    }

    fn run_atom_search(
        &self,
        jobs: &[AtomJob],
        scale: [f64; 2],
        n_jobs: usize,
    ) -> PlaceResult<Vec<SearchNode>> {
        let deepening_factor = self.config.deepening_factor;
        let deepening_value = self.config.deepening_value;
        best_first_search(
            SearchNode::default(),
            |node: &SearchNode| {
                let job = &jobs[node.level];
                let mut children = Vec::new();
                for (i, option) in job.options.iter().enumerate() {
                    if !option.reuse && node.consumed.contains(&option.site) {
                        continue;
                    }
                    let mut child = node.clone();
                    child.level += 1;
                    child.option = i as u16;
                    if !option.reuse {
                        child.consumed.insert(option.site);
                        join_or_open_group(
                            job.current_site,
                            option.site,
                            option.distance,
                            &mut child.groups,
                            &mut child.group_max_distances,
                        );
                    }
                    child.lookahead_cost += option.lookahead_cost;
                    children.push(child);
                }
                children
            },
            |node| node.level == n_jobs,
            node_cost,
            |node| {
                let unplaced = (n_jobs - node.level) as f64;
                let mut max_unplaced = 0.0f64;
                let mut acc_lookahead = 0.0;
                for job in &jobs[node.level..] {
                    acc_lookahead += job.mean_lookahead_cost;
                    for option in &job.options {
                        if option.reuse {
                            // a reusable atom travels nowhere
                            break;
                        }
                        if !node.consumed.contains(&option.site) {
                            max_unplaced = max_unplaced.max(option.distance);
                            break;
                        }
                    }
                }
                let max_placed = node
                    .group_max_distances
                    .iter()
                    .copied()
                    .fold(0.0f64, f64::max);
                let mut h = if max_unplaced <= max_placed {
                    0.0
                } else {
                    max_unplaced.sqrt() - max_placed.sqrt()
                };
                h += acc_lookahead;
                h += deepening_factor
                    * (sum_std_deviation(scale, &node.groups) + deepening_value)
                    * unplaced;
                h
            },
        )
    }

    /// The initial window around the nearest site, or the whole SLM when
    /// windowing is disabled.
    fn initial_window(&self, nearest: Site, slm: &Slm) -> (usize, usize, usize, usize) {
        if !self.config.use_window {
            return (0, slm.rows, 0, slm.cols);
        }
        let half_h = self.config.window_min_height() / 2;
        let half_w = self.config.window_min_width / 2;
        window_around(nearest, slm, half_h, half_w)
    }

    /// The window after `expansion` growth steps.
    fn expanded_window(
        &self,
        nearest: Site,
        slm: &Slm,
        expansion: usize,
        pace: usize,
    ) -> (usize, usize, usize, usize) {
        let (width, height) = if self.config.window_ratio < 1.0 {
            let width = self.config.window_min_width + pace * expansion;
            let height = (self.config.window_ratio * width as f64).round() as usize;
            (width, height)
        } else {
            let height = self.config.window_min_height() + pace * expansion;
            let width = (height as f64 / self.config.window_ratio).round() as usize;
            (width, height)
        };
        window_around(nearest, slm, height / 2, width / 2)
    }
}

fn window_around(
    nearest: Site,
    slm: &Slm,
    half_h: usize,
    half_w: usize,
) -> (usize, usize, usize, usize) {
    let row = nearest.row as usize;
    let col = nearest.col as usize;
    let r_low = row.saturating_sub(half_h);
    let r_high = (row + half_h + 1).min(slm.rows);
    let c_low = col.saturating_sub(half_w);
    let c_high = (col + half_w + 1).min(slm.cols);
    (r_low, r_high, c_low, c_high)
}

/// The sites of the new window that the old window did not cover.
fn window_border(
    old: (usize, usize, usize, usize),
    new: (usize, usize, usize, usize),
) -> Vec<(usize, usize)> {
    let mut sites = Vec::new();
    for r in new.0..new.1 {
        for c in new.2..new.3 {
            let inside_old = r >= old.0 && r < old.1 && c >= old.2 && c < old.3;
            if !inside_old {
                sites.push((r, c));
            }
        }
    }
    sites
}

fn index_grouped(map: BTreeMap<i64, BTreeSet<RowColKey>>) -> FxHashMap<RowColKey, u16> {
    let mut result = FxHashMap::default();
    for (index, (_, keys)) in map.into_iter().enumerate() {
        for key in keys {
            result.insert(key, index as u16);
        }
    }
    result
}

fn index_single(map: BTreeMap<i64, RowColKey>) -> FxHashMap<RowColKey, u16> {
    map.into_values()
        .enumerate()
        .map(|(index, key)| (key, index as u16))
        .collect()
}

fn build_target_sites(
    rows: &FxHashMap<RowColKey, u16>,
    cols: &FxHashMap<RowColKey, u16>,
) -> FxHashMap<u16, FxHashMap<u16, Site>> {
    let mut result: FxHashMap<u16, FxHashMap<u16, Site>> = FxHashMap::default();
    for (&(slm_r, r), &ri) in rows {
        let row_sites = result.entry(ri).or_default();
        for (&(slm_c, c), &ci) in cols {
            if slm_r == slm_c {
                row_sites.insert(ci, Site::new(slm_r, r as usize, c as usize));
            }
        }
    }
    result
}

fn max_index(map: &FxHashMap<RowColKey, u16>) -> u16 {
    map.values().copied().max().unwrap_or(0)
}

fn scale_factor(source: &FxHashMap<RowColKey, u16>, target: &FxHashMap<RowColKey, u16>) -> f64 {
    let s = f64::from(1 + max_index(source));
    let t = f64::from(1 + max_index(target));
    (t / s).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alsvin_arch::Architecture;

    const ARCH: &str = r#"{
        "name": "placer_test",
        "storage_zones": [{
            "zone_id": 0,
            "slms": [{"id": 0, "site_separation": [3, 3], "r": 20, "c": 20, "location": [0, 0]}],
            "offset": [0, 0],
            "dimension": [60, 60]
        }],
        "entanglement_zones": [{
            "zone_id": 0,
            "slms": [
                {"id": 1, "site_separation": [12, 10], "r": 4, "c": 4, "location": [5, 70]},
                {"id": 2, "site_separation": [12, 10], "r": 4, "c": 4, "location": [7, 70]}
            ],
            "offset": [5, 70],
            "dimension": [50, 40]
        }],
        "aods": [{"id": 0, "site_separation": 2, "r": 20, "c": 20}],
        "rydberg_range": [[[5, 70], [55, 110]]]
    }"#;

    fn arch() -> Architecture {
        Architecture::from_json(ARCH).unwrap()
    }

    fn q(i: u32) -> QubitId {
        QubitId(i)
    }

    #[test]
    fn group_compatibility_preserves_order() {
        let mut groups = Vec::new();
        let mut dists = Vec::new();
        join_or_open_group((0, 0), (0, 0), 1.0, &mut groups, &mut dists);
        // order-preserving on both axes: joins the existing group
        join_or_open_group((1, 1), (1, 1), 2.0, &mut groups, &mut dists);
        assert_eq!(groups.len(), 1);
        assert_eq!(dists[0], 2.0);
        // row order inverted: must open a second group
        join_or_open_group((2, 2), (0, 5), 3.0, &mut groups, &mut dists);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn repeated_key_must_map_to_same_value() {
        let mut groups = Vec::new();
        let mut dists = Vec::new();
        join_or_open_group((3, 3), (4, 4), 1.0, &mut groups, &mut dists);
        // same source row to a different target row is incompatible
        join_or_open_group((3, 5), (5, 6), 1.0, &mut groups, &mut dists);
        assert_eq!(groups.len(), 2);
        // same source row to the same target row is fine
        join_or_open_group((3, 6), (4, 7), 1.0, &mut groups, &mut dists);
        assert_eq!(groups[0].h.len(), 1);
        assert_eq!(groups[0].v.len(), 3);
    }

    #[test]
    fn initial_placement_fills_the_facing_row_first() {
        let arch = arch();
        let placer = AStarPlacer::new(&arch, PlacerConfig::default()).unwrap();
        let placement = placer.make_initial_placement(3).unwrap();
        // entanglement zone is above, so filling starts at the last row
        assert_eq!(placement[0], Site::new(0, 19, 0));
        assert_eq!(placement[1], Site::new(0, 19, 1));
        assert_eq!(placement[2], Site::new(0, 19, 2));
    }

    #[test]
    fn initial_placement_wraps_rows() {
        let arch = arch();
        let placer = AStarPlacer::new(&arch, PlacerConfig::default()).unwrap();
        let placement = placer.make_initial_placement(22).unwrap();
        assert_eq!(placement[20], Site::new(0, 18, 0));
        assert_eq!(placement[21], Site::new(0, 18, 1));
    }

    #[test]
    fn too_many_qubits_is_an_error() {
        let arch = arch();
        let placer = AStarPlacer::new(&arch, PlacerConfig::default()).unwrap();
        assert!(placer.make_initial_placement(401).is_err());
    }

    #[test]
    fn one_layer_execution_and_storage() {
        let arch = arch();
        let placer = AStarPlacer::new(&arch, PlacerConfig::default()).unwrap();
        let layers = vec![vec![(q(0), q(1))]];
        let placements = placer.place(2, &layers, &[ReuseSet::default()]).unwrap();
        assert_eq!(placements.len(), 3);
        // execution placement: both atoms on the two sides of one pair
        let exec = &placements[1];
        assert!(arch.is_entanglement_site(exec[0]).unwrap());
        assert!(arch.is_entanglement_site(exec[1]).unwrap());
        assert_eq!(
            arch.other_entanglement_site(exec[0]).unwrap(),
            exec[1]
        );
        // storage placement: both atoms back in storage, all sites distinct
        let storage = &placements[2];
        assert!(arch.is_storage_site(storage[0]).unwrap());
        assert!(arch.is_storage_site(storage[1]).unwrap());
        assert_ne!(storage[0], storage[1]);
    }

    #[test]
    fn placements_are_disjoint() {
        let arch = arch();
        let placer = AStarPlacer::new(&arch, PlacerConfig::default()).unwrap();
        let layers = vec![
            vec![(q(0), q(1)), (q(2), q(3))],
            vec![(q(1), q(2))],
        ];
        let reuse = vec![ReuseSet::default(), ReuseSet::default()];
        let placements = placer.place(6, &layers, &reuse).unwrap();
        assert_eq!(placements.len(), 5);
        for placement in &placements {
            let mut sites = placement.clone();
            sites.sort_unstable();
            sites.dedup();
            assert_eq!(sites.len(), placement.len(), "duplicate site in placement");
        }
    }

    #[test]
    fn reused_qubit_stays_in_the_entanglement_zone() {
        let arch = arch();
        // a large reuse level makes staying strictly cheaper than moving
        let config = PlacerConfig {
            reuse_level: 50.0,
            ..PlacerConfig::default()
        };
        let placer = AStarPlacer::new(&arch, config).unwrap();
        let layers = vec![vec![(q(0), q(1))], vec![(q(1), q(2))]];
        let mut reuse_first = ReuseSet::default();
        reuse_first.insert(q(1));
        let reuse = vec![reuse_first, ReuseSet::default()];
        let placements = placer.place(3, &layers, &reuse).unwrap();
        assert_eq!(placements.len(), 5);
        // after the first layer's storage placement the reused qubit stays
        let storage = &placements[2];
        assert!(arch.is_entanglement_site(storage[1]).unwrap());
        // in the second execution placement its partner joins it
        let exec = &placements[3];
        assert_eq!(
            arch.other_entanglement_site(exec[1]).unwrap(),
            exec[2]
        );
    }
}
