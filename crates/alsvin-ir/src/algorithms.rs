//! Algorithms on the interaction graph: independent-set selection, edge
//! coloring under a partial-order constraint, resting-position computation,
//! and the combined layout pass.

use petgraph::unionfind::UnionFind;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{IrError, IrResult};
use crate::graph::{Edge, InteractionGraph, PartialOrder, edges_adjacent};
use crate::op::QubitId;

/// A color, i.e. the time step at which an edge's interaction fires.
pub type Color = u16;

/// Relative x positions of moveable vertices per color step, and of the
/// fixed vertices.
pub type LayoutSequence = (
    Vec<FxHashMap<QubitId, i64>>,
    FxHashMap<QubitId, i64>,
);

/// Greedy maximum independent set: repeatedly take the highest-degree
/// vertex and drop its neighbors. Ties resolve to the smaller qubit.
pub fn max_independent_set<E: Copy>(g: &InteractionGraph<E>) -> FxHashSet<QubitId> {
    let mut queue = g.vertices();
    queue.sort_by_key(|&v| {
        (
            std::cmp::Reverse(g.degree(v).expect("vertex from the graph")),
            v,
        )
    });
    let mut result = FxHashSet::default();
    while let Some(&v) = queue.first() {
        result.insert(v);
        queue.retain(|&u| u != v && !g.is_adjacent(u, v));
    }
    result
}

/// All edges incident to a vertex of the given set.
pub fn covered_edges<E: Copy>(
    g: &InteractionGraph<E>,
    vs: &FxHashSet<QubitId>,
) -> IrResult<FxHashSet<Edge>> {
    let mut result = FxHashSet::default();
    for &v in vs {
        for e in g.adjacent_edges(v)? {
            result.insert(e);
        }
    }
    Ok(result)
}

fn other_endpoint(e: Edge, v: QubitId) -> QubitId {
    if e.0 == v { e.1 } else { e.0 }
}

/// The fixed (non-independent-set) endpoint of an edge.
fn fixed_endpoint(e: Edge, sequence: &[QubitId]) -> QubitId {
    if sequence.contains(&e.0) { e.1 } else { e.0 }
}

fn coloring_sorted(coloring: &FxHashMap<Edge, Color>) -> Vec<(Edge, Color)> {
    let mut entries: Vec<(Edge, Color)> = coloring.iter().map(|(&e, &k)| (e, k)).collect();
    entries.sort_unstable_by_key(|&(e, _)| e);
    entries
}

/// Least admissible color for `e` at independent-set vertex `v`.
///
/// Admissibility requires a proper edge coloring, color monotonicity with
/// respect to edges adjacent via fixed vertices, and acyclicity of the
/// partial order on fixed vertices.
#[allow(clippy::too_many_arguments)]
fn least_admissible_color(
    coloring: &FxHashMap<Edge, Color>,
    max_color: Color,
    e: Edge,
    v: QubitId,
    sequence: &[QubitId],
    partial_order: &PartialOrder,
    ranks: &FxHashMap<QubitId, FxHashMap<Color, usize>>,
) -> IrResult<Color> {
    // minimum admissible color: maximum color + 1 over adjacent edges that
    // do not contain the vertex v
    let mut min_admissible: Color = 0;
    for (f, k) in coloring_sorted(coloring) {
        if edges_adjacent(e, f) && v != f.0 && v != f.1 {
            min_admissible = min_admissible.max(k + 1);
        }
    }
    let mut free_colors: Vec<Color> = (min_admissible..=max_color + 1).collect();
    for (f, k) in coloring_sorted(coloring) {
        if edges_adjacent(e, f) {
            free_colors.retain(|&c| c != k);
        }
    }
    // The remaining candidates are filtered against the partial order of
    // fixed vertices: a choice that would close a cycle is rejected.
    let u = other_endpoint(e, v);
    let rank_of_u = sequence
        .iter()
        .position(|&x| x == v)
        .expect("vertex from the sequence");
    'candidates: for candidate in free_colors {
        for (f, k) in coloring_sorted(coloring) {
            if f.0 == v || f.1 == v {
                let w = other_endpoint(f, v);
                if k > candidate {
                    if partial_order.is_reachable(w, u) {
                        continue 'candidates;
                    }
                } else if k < candidate && partial_order.is_reachable(u, w) {
                    return Err(IrError::InfeasibleColoring(
                        "coloring cannot be completed to a valid one (cycle is unavoidable)"
                            .into(),
                    ));
                }
            } else if k == candidate {
                let w = fixed_endpoint(f, sequence);
                let rank_of_w = ranks
                    .get(&w)
                    .and_then(|r| r.get(&k))
                    .copied()
                    .ok_or_else(|| IrError::InfeasibleColoring("missing rank".into()))?;
                match rank_of_u.cmp(&rank_of_w) {
                    std::cmp::Ordering::Greater => {
                        if partial_order.is_reachable(w, u) {
                            continue 'candidates;
                        }
                    }
                    std::cmp::Ordering::Less => {
                        if partial_order.is_reachable(u, w) {
                            continue 'candidates;
                        }
                    }
                    std::cmp::Ordering::Equal => {
                        return Err(IrError::InfeasibleColoring(
                            "ranks are not consistent".into(),
                        ));
                    }
                }
            }
        }
        return Ok(candidate);
    }
    Err(IrError::InfeasibleColoring(
        "no admissible color found".into(),
    ))
}

/// Color the covered edges, iterating over the independent-set vertices in
/// the order of `sequence`, while building the induced partial order on the
/// fixed vertices.
pub fn color_edges<E: Copy>(
    g: &InteractionGraph<E>,
    edges: &FxHashSet<Edge>,
    sequence: &[QubitId],
) -> IrResult<(FxHashMap<Edge, Color>, PartialOrder)> {
    let mut coloring: FxHashMap<Edge, Color> = FxHashMap::default();
    let mut max_color: Color = 0;
    let mut sorted_edges: Vec<Edge> = edges.iter().copied().collect();
    sorted_edges.sort_unstable();
    // number of distinct colors among edges adjacent to an edge
    let mut n_adj_colors: FxHashMap<Edge, usize> = FxHashMap::default();
    // the degree of the edge seen as a node of the line graph
    let mut edge_degree: FxHashMap<Edge, usize> = FxHashMap::default();
    for &e in &sorted_edges {
        n_adj_colors.insert(e, 0);
        edge_degree.insert(
            e,
            sorted_edges
                .iter()
                .filter(|&&f| f != e && edges_adjacent(e, f))
                .count(),
        );
    }
    let mut partial_order = PartialOrder::new();
    let moveable: FxHashSet<QubitId> = sequence.iter().copied().collect();
    for v in g.vertices() {
        if !moveable.contains(&v) {
            partial_order.add_vertex(v);
        }
    }
    // rank of a fixed vertex at a color: the index of its interaction
    // partner in the sequence of moveable vertices
    let mut ranks: FxHashMap<QubitId, FxHashMap<Color, usize>> = FxHashMap::default();

    for &v in sequence {
        let mut adjacent: Vec<Edge> = sorted_edges
            .iter()
            .copied()
            .filter(|&e| e.0 == v || e.1 == v)
            .collect();
        adjacent.sort_by(|&a, &b| {
            let u = other_endpoint(a, v);
            let w = other_endpoint(b, v);
            if partial_order.is_reachable(u, w) {
                std::cmp::Ordering::Less
            } else if partial_order.is_reachable(w, u) {
                std::cmp::Ordering::Greater
            } else {
                n_adj_colors[&b]
                    .cmp(&n_adj_colors[&a])
                    .then(edge_degree[&b].cmp(&edge_degree[&a]))
            }
        });
        for e in adjacent {
            let color = least_admissible_color(
                &coloring,
                max_color,
                e,
                v,
                sequence,
                &partial_order,
                &ranks,
            )?;
            coloring.insert(e, color);
            let u = other_endpoint(e, v);
            let rank_of_v = sequence
                .iter()
                .position(|&x| x == v)
                .expect("vertex from the sequence");
            ranks.entry(u).or_default().insert(color, rank_of_v);
            for (f, k) in coloring_sorted(&coloring) {
                if f == e {
                    continue;
                }
                if f.0 == v || f.1 == v {
                    let w = other_endpoint(f, v);
                    if k < color {
                        partial_order.add_edge(w, u);
                    } else if k > color {
                        partial_order.add_edge(u, w);
                    }
                } else if k == color {
                    let w = fixed_endpoint(f, sequence);
                    let rank_u = ranks[&u][&color];
                    let rank_w = ranks
                        .get(&w)
                        .and_then(|r| r.get(&k))
                        .copied()
                        .ok_or_else(|| IrError::InfeasibleColoring("missing rank".into()))?;
                    match rank_u.cmp(&rank_w) {
                        std::cmp::Ordering::Less => partial_order.add_edge(w, u),
                        std::cmp::Ordering::Greater => partial_order.add_edge(u, w),
                        std::cmp::Ordering::Equal => {
                            return Err(IrError::InfeasibleColoring(
                                "coloring is not valid".into(),
                            ));
                        }
                    }
                }
            }
            max_color = max_color.max(color);
            // refresh the number of distinct adjacent colors
            for &f in &sorted_edges {
                if edges_adjacent(e, f) {
                    let mut used = vec![false; usize::from(max_color) + 1];
                    for &h in &sorted_edges {
                        if edges_adjacent(f, h)
                            && let Some(&k) = coloring.get(&h)
                        {
                            used[usize::from(k)] = true;
                        }
                    }
                    n_adj_colors.insert(f, used.iter().filter(|&&b| b).count());
                }
            }
        }
    }
    Ok((coloring, partial_order))
}

/// Neighbors of `v` among edges colored `t`.
fn partner_at(
    coloring: &FxHashMap<Edge, Color>,
    v: QubitId,
    t: Color,
) -> Option<QubitId> {
    let mut partners: Vec<QubitId> = coloring
        .iter()
        .filter(|&(&e, &k)| k == t && (e.0 == v || e.1 == v))
        .map(|(&e, _)| other_endpoint(e, v))
        .collect();
    partners.sort_unstable();
    debug_assert!(partners.len() <= 1, "proper coloring admits one partner");
    partners.first().copied()
}

/// Compute the obligatory resting slots between fixed x positions.
///
/// For every color step, a moveable atom that is not interacting but has
/// interacting neighbors on both sides needs a free slot between their
/// partners' positions; slot requirements from different steps merge into
/// the tightest overlapping interval.
pub fn compute_resting_positions(
    moveable: &[QubitId],
    fixed: &[QubitId],
    coloring: &FxHashMap<Edge, Color>,
) -> Vec<usize> {
    let max_color = coloring.values().copied().max().unwrap_or(0);
    let mut resting: FxHashMap<(usize, usize), usize> = FxHashMap::default();
    for t in 0..=max_color {
        // required slots for this step
        let mut t_resting: FxHashMap<(usize, usize), usize> = FxHashMap::default();
        let mut moveable_xs: FxHashMap<QubitId, usize> = FxHashMap::default();
        for &v in moveable {
            if let Some(u) = partner_at(coloring, v, t) {
                let x = fixed
                    .iter()
                    .position(|&f| f == u)
                    .expect("partner is a fixed vertex");
                moveable_xs.insert(v, x);
            }
        }
        let positioned: Vec<usize> = moveable
            .iter()
            .enumerate()
            .filter(|(_, v)| moveable_xs.contains_key(v))
            .map(|(i, _)| i)
            .collect();
        for (i, &v) in moveable.iter().enumerate() {
            if moveable_xs.contains_key(&v) {
                continue;
            }
            let left = positioned.iter().copied().filter(|&j| j > i).min();
            let right = positioned.iter().copied().filter(|&j| j < i).max();
            if let (Some(left), Some(right)) = (left, right) {
                let pair = (moveable_xs[&moveable[left]], moveable_xs[&moveable[right]]);
                *t_resting.entry(pair).or_insert(0) += 1;
            }
        }
        // merge with the accumulated requirements, preferring the tightest
        // overlapping interval
        let mut new_resting: FxHashMap<(usize, usize), usize> = FxHashMap::default();
        let mut sorted_resting: Vec<((usize, usize), usize)> =
            resting.iter().map(|(&p, &c)| (p, c)).collect();
        sorted_resting.sort_unstable();
        for (pair, count) in sorted_resting {
            for _ in 0..count {
                let mut overlapping: Vec<(usize, usize)> = t_resting
                    .keys()
                    .copied()
                    .filter(|&(lo, hi)| lo < pair.1 && pair.0 < hi)
                    .collect();
                overlapping.sort_unstable_by_key(|&(lo, hi)| (hi - lo, lo, hi));
                if let Some(&tightest) = overlapping.first() {
                    let remaining = t_resting.get_mut(&tightest).expect("key from t_resting");
                    *remaining -= 1;
                    if *remaining == 0 {
                        t_resting.remove(&tightest);
                    }
                    let merged = (pair.0.max(tightest.0), pair.1.min(tightest.1));
                    *new_resting.entry(merged).or_insert(0) += 1;
                } else {
                    *new_resting.entry(pair).or_insert(0) += 1;
                }
            }
        }
        for (pair, count) in t_resting {
            *new_resting.entry(pair).or_insert(0) += count;
        }
        resting = new_resting;
    }
    let mut positions: Vec<usize> = Vec::new();
    for (&(lo, _), &count) in &resting {
        positions.extend(std::iter::repeat_n(lo, count));
    }
    positions.sort_unstable();
    positions
}

/// Reorder the sequence so that vertices of the same connected component
/// are contiguous, preserving the intra-component order.
pub fn group_by_connected_component<E: Copy>(
    g: &InteractionGraph<E>,
    sequence: &[QubitId],
) -> Vec<QubitId> {
    let vertices = g.vertices();
    let index: FxHashMap<QubitId, usize> =
        vertices.iter().enumerate().map(|(i, &v)| (v, i)).collect();
    let mut components: UnionFind<usize> = UnionFind::new(vertices.len());
    for &v in &vertices {
        for u in g.neighbors(v).expect("vertex from the graph") {
            components.union(index[&v], index[&u]);
        }
    }
    let mut result = Vec::with_capacity(sequence.len());
    for &v in &vertices {
        if components.find(index[&v]) == index[&v] {
            for &u in sequence {
                if components.find(index[&u]) == index[&v] {
                    result.push(u);
                }
            }
        }
    }
    result
}

/// The full layout pass: independent-set selection, edge coloring, resting
/// slots, and per-step relative positions for moveable and fixed vertices.
///
/// Fixed vertices whose position exceeds `max_sites` are evicted together
/// with their incident colorings and any moveable vertices left without
/// colored edges.
pub fn compute_sequence<E: Copy>(
    g: &InteractionGraph<E>,
    max_sites: usize,
) -> IrResult<LayoutSequence> {
    if g.num_edges() == 0 {
        return Ok((Vec::new(), FxHashMap::default()));
    }
    let mis = max_independent_set(g);
    let mut sequence_ungrouped: Vec<QubitId> = mis.iter().copied().collect();
    sequence_ungrouped.sort_by_key(|&v| {
        (
            std::cmp::Reverse(g.degree(v).expect("vertex from the graph")),
            v,
        )
    });
    let mut sequence = group_by_connected_component(g, &sequence_ungrouped);
    let (mut coloring, partial_order) = color_edges(g, &covered_edges(g, &mis)?, &sequence)?;
    let mut fixed = partial_order.topological_order()?;
    let resting = compute_resting_positions(&sequence, &fixed, &coloring);
    // relative x positions of fixed vertices, with resting slots interleaved
    let mut fixed_positions: FxHashMap<QubitId, i64> = FxHashMap::default();
    {
        let mut slot = 0usize;
        for (x, &f) in fixed.iter().enumerate() {
            fixed_positions.insert(f, (x + slot) as i64);
            while slot < resting.len() && x == resting[slot] {
                slot += 1;
            }
        }
    }
    let max_site_used = fixed_positions.values().copied().max().unwrap_or(0);
    if max_site_used >= max_sites as i64 {
        // the entanglement zone cannot fit all fixed vertices; evict the
        // overflow together with its incident color entries
        fixed_positions.retain(|_, &mut pos| pos < max_sites as i64);
        fixed.retain(|f| fixed_positions.contains_key(f));
        coloring.retain(|e, _| {
            fixed_positions.contains_key(&e.0) || fixed_positions.contains_key(&e.1)
        });
        sequence.retain(|&q| coloring.keys().any(|&e| e.0 == q || e.1 == q));
    }
    // relative x positions of moveable vertices at every step
    let max_color = coloring.values().copied().max().unwrap_or(0);
    let mut moveable_positions: Vec<FxHashMap<QubitId, i64>> =
        vec![FxHashMap::default(); usize::from(max_color) + 1];
    for t in 0..=max_color {
        let slot = usize::from(t);
        for &v in &sequence {
            if let Some(u) = partner_at(&coloring, v, t) {
                let x = *fixed_positions.get(&u).expect("partner is placed");
                moveable_positions[slot].insert(v, x);
            }
        }
        for (i, &v) in sequence.iter().enumerate() {
            if moveable_positions[slot].contains_key(&v) {
                continue;
            }
            if i > 0 {
                // the right neighbor already has a position; take the
                // greatest free slot to its left
                let right_x = moveable_positions[slot][&sequence[i - 1]];
                let min_x = (right_x - 1).min(-1);
                let free = (min_x..right_x)
                    .filter(|&x| fixed_positions.values().all(|&p| p != x))
                    .max()
                    .expect("range contains a free position");
                moveable_positions[slot].insert(v, free);
            } else {
                // leftmost unpositioned atom: index free slots upward from
                // the greatest positioned x
                let (left_qubit, left_x) = moveable_positions[slot]
                    .iter()
                    .map(|(&q, &x)| (q, x))
                    .max_by_key(|&(q, x)| (x, q))
                    .unwrap_or((QubitId(0), -1));
                let k = sequence
                    .iter()
                    .position(|&q| q == left_qubit)
                    .unwrap_or(sequence.len());
                let max_x = fixed_positions.values().copied().max().unwrap_or(0);
                let free: Vec<i64> = (left_x + 1..=max_x)
                    .filter(|&x| fixed_positions.values().all(|&p| p != x))
                    .collect();
                let position = if k >= 1 && k <= free.len() {
                    free[k - 1]
                } else {
                    max_x + k as i64 - free.len() as i64
                };
                moveable_positions[slot].insert(v, position);
            }
        }
    }
    Ok((moveable_positions, fixed_positions))
}
