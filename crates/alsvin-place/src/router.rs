//! The independent-set router: partitions moved atoms into AOD-compatible
//! move groups between consecutive placements.
//!
//! Two atoms can share one AOD activation only if their start and target
//! coordinates agree in relative order on both axes (equal coordinates must
//! stay equal). Atoms violating that pairwise constraint land in different
//! groups, which execute as sequential moves.

use alsvin_arch::Architecture;
use alsvin_ir::{InteractionGraph, QubitId, max_independent_set};
use rustc_hash::FxHashSet;

use crate::error::PlaceResult;
use crate::placer::Placement;

/// The move groups of one rearrangement step.
pub type RoutingStep = Vec<Vec<QubitId>>;

/// Routes a placement sequence into per-step move groups.
pub struct IndependentSetRouter<'a> {
    architecture: &'a Architecture,
}

impl<'a> IndependentSetRouter<'a> {
    /// Create a router for an architecture.
    pub fn new(architecture: &'a Architecture) -> Self {
        Self { architecture }
    }

    /// Compute the routing for every consecutive pair of placements.
    ///
    /// The result has one entry per transition; atoms whose site does not
    /// change are not routed.
    pub fn route(&self, placements: &[Placement]) -> PlaceResult<Vec<RoutingStep>> {
        let mut steps = Vec::new();
        for window in placements.windows(2) {
            steps.push(self.route_step(&window[0], &window[1])?);
        }
        Ok(steps)
    }

    /// Partition the atoms moving between two placements into groups.
    fn route_step(&self, start: &Placement, target: &Placement) -> PlaceResult<RoutingStep> {
        let mut moved: Vec<(QubitId, (i64, i64), (i64, i64))> = Vec::new();
        for (index, (&from, &to)) in start.iter().zip(target.iter()).enumerate() {
            if from != to {
                moved.push((
                    QubitId(index as u32),
                    self.architecture.exact_location(from)?,
                    self.architecture.exact_location(to)?,
                ));
            }
        }
        if moved.is_empty() {
            return Ok(Vec::new());
        }
        // incompatibility graph: an edge for every pair whose order the AOD
        // cannot preserve
        let mut conflicts: InteractionGraph<()> = InteractionGraph::new();
        for &(q, _, _) in &moved {
            conflicts.add_vertex(q);
        }
        for (i, &(qa, sa, ea)) in moved.iter().enumerate() {
            for &(qb, sb, eb) in &moved[i + 1..] {
                if order_violated(sa, ea, sb, eb) {
                    conflicts.add_edge(qa, qb, ());
                }
            }
        }
        let mut groups: RoutingStep = Vec::new();
        let mut unassigned: FxHashSet<QubitId> = moved.iter().map(|&(q, _, _)| q).collect();
        while !unassigned.is_empty() {
            // the largest independent set of the remaining conflict graph
            // becomes the next group
            let mut remaining: InteractionGraph<()> = InteractionGraph::new();
            for &q in &unassigned {
                remaining.add_vertex(q);
            }
            for (i, &(qa, ..)) in moved.iter().enumerate() {
                for &(qb, ..) in &moved[i + 1..] {
                    if unassigned.contains(&qa)
                        && unassigned.contains(&qb)
                        && conflicts.is_adjacent(qa, qb)
                    {
                        remaining.add_edge(qa, qb, ());
                    }
                }
            }
            let independent = max_independent_set(&remaining);
            let mut group: Vec<QubitId> = independent.iter().copied().collect();
            group.sort_unstable();
            for &q in &group {
                unassigned.remove(&q);
            }
            groups.push(group);
        }
        Ok(groups)
    }
}

/// Whether a pair of moves breaks the AOD order constraint on either axis.
fn order_violated(sa: (i64, i64), ea: (i64, i64), sb: (i64, i64), eb: (i64, i64)) -> bool {
    axis_violated(sa.0, ea.0, sb.0, eb.0) || axis_violated(sa.1, ea.1, sb.1, eb.1)
}

fn axis_violated(s1: i64, e1: i64, s2: i64, e2: i64) -> bool {
    match s1.cmp(&s2) {
        std::cmp::Ordering::Equal => e1 != e2,
        std::cmp::Ordering::Less => e1 >= e2,
        std::cmp::Ordering::Greater => e1 <= e2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alsvin_arch::Site;

    const ARCH: &str = r#"{
        "name": "is_router_architecture",
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

    fn sorted(mut step: RoutingStep) -> RoutingStep {
        for group in &mut step {
            group.sort_unstable();
        }
        step.sort();
        step
    }

    fn q(i: u32) -> QubitId {
        QubitId(i)
    }

    #[test]
    fn empty_sequence_routes_to_nothing() {
        let arch = arch();
        let router = IndependentSetRouter::new(&arch);
        assert!(router.route(&[]).unwrap().is_empty());
    }

    #[test]
    fn single_placement_routes_to_nothing() {
        let arch = arch();
        let router = IndependentSetRouter::new(&arch);
        let placements = vec![vec![Site::new(0, 0, 0)]];
        assert!(router.route(&placements).unwrap().is_empty());
    }

    #[test]
    fn one_layer_moves_as_one_group() {
        // two neighbors move down into the two sides of one pair and back
        let arch = arch();
        let router = IndependentSetRouter::new(&arch);
        let placements = vec![
            vec![Site::new(0, 19, 0), Site::new(0, 19, 1)],
            vec![Site::new(1, 0, 0), Site::new(2, 0, 0)],
            vec![Site::new(0, 19, 0), Site::new(0, 19, 1)],
        ];
        let steps = router.route(&placements).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(sorted(steps[0].clone()), vec![vec![q(0), q(1)]]);
        assert_eq!(sorted(steps[1].clone()), vec![vec![q(0), q(1)]]);
    }

    #[test]
    fn crossing_columns_split_into_singleton_groups() {
        // the two atoms swap their column order; a single activation
        // cannot realize that
        let arch = arch();
        let router = IndependentSetRouter::new(&arch);
        let placements = vec![
            vec![Site::new(0, 19, 0), Site::new(0, 19, 1)],
            vec![Site::new(2, 0, 0), Site::new(1, 0, 0)],
        ];
        let steps = router.route(&placements).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(sorted(steps[0].clone()), vec![vec![q(0)], vec![q(1)]]);
    }

    #[test]
    fn overtaking_rows_split_into_two_groups() {
        // the two storage rows swap their row order at the target; each
        // row moves in its own activation
        let arch = arch();
        let router = IndependentSetRouter::new(&arch);
        let placements = vec![
            vec![
                Site::new(0, 18, 0),
                Site::new(0, 18, 1),
                Site::new(0, 19, 0),
                Site::new(0, 19, 1),
            ],
            vec![
                Site::new(1, 1, 0),
                Site::new(2, 1, 0),
                Site::new(1, 0, 0),
                Site::new(2, 0, 0),
            ],
        ];
        let steps = router.route(&placements).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(
            sorted(steps[0].clone()),
            vec![vec![q(0), q(1)], vec![q(2), q(3)]]
        );
    }

    #[test]
    fn order_preserving_array_moves_as_one_group() {
        // two full rows map onto two entanglement rows preserving order
        let arch = arch();
        let router = IndependentSetRouter::new(&arch);
        let placements = vec![
            vec![
                Site::new(0, 18, 0),
                Site::new(0, 18, 1),
                Site::new(0, 18, 2),
                Site::new(0, 18, 3),
                Site::new(0, 19, 0),
                Site::new(0, 19, 1),
                Site::new(0, 19, 2),
                Site::new(0, 19, 3),
            ],
            vec![
                Site::new(1, 0, 0),
                Site::new(2, 0, 0),
                Site::new(1, 0, 1),
                Site::new(2, 0, 1),
                Site::new(1, 1, 0),
                Site::new(2, 1, 0),
                Site::new(1, 1, 1),
                Site::new(2, 1, 1),
            ],
        ];
        let steps = router.route(&placements).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(
            sorted(steps[0].clone()),
            vec![vec![q(0), q(1), q(2), q(3), q(4), q(5), q(6), q(7)]]
        );
    }

    #[test]
    fn unmoved_atoms_are_not_routed() {
        let arch = arch();
        let router = IndependentSetRouter::new(&arch);
        let placements = vec![
            vec![Site::new(0, 19, 0), Site::new(0, 19, 1)],
            vec![Site::new(0, 19, 0), Site::new(1, 0, 0)],
        ];
        let steps = router.route(&placements).unwrap();
        assert_eq!(sorted(steps[0].clone()), vec![vec![q(1)]]);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// Random storage-to-storage rearrangements with distinct sites.
        fn arbitrary_step() -> impl Strategy<Value = (Vec<Site>, Vec<Site>)> {
            proptest::collection::vec(((0usize..8, 0usize..8), (0usize..8, 0usize..8)), 2..7)
                .prop_map(|pairs| {
                    let mut starts = Vec::new();
                    let mut targets = Vec::new();
                    let mut seen_start = std::collections::BTreeSet::new();
                    let mut seen_target = std::collections::BTreeSet::new();
                    for ((sr, sc), (tr, tc)) in pairs {
                        if seen_start.insert((sr, sc)) && seen_target.insert((tr, tc)) {
                            starts.push(Site::new(0, sr, sc));
                            targets.push(Site::new(0, tr, tc));
                        }
                    }
                    (starts, targets)
                })
        }

        proptest! {
            #[test]
            fn groups_always_preserve_pairwise_order((starts, targets) in arbitrary_step()) {
                let arch = arch();
                let router = IndependentSetRouter::new(&arch);
                let steps = router.route(&[starts.clone(), targets.clone()]).unwrap();
                prop_assert!(steps.len() == 1);
                for group in &steps[0] {
                    for (i, &a) in group.iter().enumerate() {
                        for &b in &group[i + 1..] {
                            let sa = arch.exact_location(starts[a.index()]).unwrap();
                            let ea = arch.exact_location(targets[a.index()]).unwrap();
                            let sb = arch.exact_location(starts[b.index()]).unwrap();
                            let eb = arch.exact_location(targets[b.index()]).unwrap();
                            prop_assert!(!order_violated(sa, ea, sb, eb));
                        }
                    }
                }
                // every moved atom lands in exactly one group
                let moved: usize = starts
                    .iter()
                    .zip(&targets)
                    .filter(|(s, t)| s != t)
                    .count();
                let grouped: usize = steps[0].iter().map(Vec::len).sum();
                prop_assert_eq!(moved, grouped);
            }
        }
    }
}
