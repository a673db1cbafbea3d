//! Graph primitives: the undirected interaction graph and the partial-order
//! DAG used by the edge-coloring algorithm.

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use rustc_hash::FxHashMap;

use crate::error::{IrError, IrResult};
use crate::op::QubitId;

/// An undirected edge between two qubits, normalized so that the smaller
/// qubit comes first.
pub type Edge = (QubitId, QubitId);

/// Normalize an edge.
#[inline]
pub fn edge(u: QubitId, v: QubitId) -> Edge {
    if u <= v { (u, v) } else { (v, u) }
}

/// Whether two edges share an endpoint.
#[inline]
pub fn edges_adjacent(e: Edge, f: Edge) -> bool {
    e.0 == f.0 || e.0 == f.1 || e.1 == f.0 || e.1 == f.1
}

/// Undirected graph whose vertices are qubits and whose edges carry a
/// payload, typically the DAG vertex of the pending two-qubit operation.
#[derive(Debug, Clone, Default)]
pub struct InteractionGraph<E = usize> {
    graph: UnGraph<QubitId, E>,
    index: FxHashMap<QubitId, NodeIndex>,
}

impl<E: Copy> InteractionGraph<E> {
    /// Create an empty interaction graph.
    pub fn new() -> Self {
        Self {
            graph: UnGraph::default(),
            index: FxHashMap::default(),
        }
    }

    fn node(&mut self, q: QubitId) -> NodeIndex {
        if let Some(&idx) = self.index.get(&q) {
            return idx;
        }
        let idx = self.graph.add_node(q);
        self.index.insert(q, idx);
        idx
    }

    /// Add a vertex without any edges.
    pub fn add_vertex(&mut self, q: QubitId) {
        self.node(q);
    }

    /// Add an edge with its payload, inserting the endpoints as needed.
    /// A second edge between the same endpoints replaces the payload.
    pub fn add_edge(&mut self, u: QubitId, v: QubitId, payload: E) {
        let (ui, vi) = (self.node(u), self.node(v));
        self.graph.update_edge(ui, vi, payload);
    }

    /// Whether the qubit is a vertex of the graph.
    #[inline]
    pub fn contains(&self, q: QubitId) -> bool {
        self.index.contains_key(&q)
    }

    /// Number of vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    #[inline]
    pub fn num_edges(&self) -> usize {
        self.graph.edge_count()
    }

    /// All vertices, in ascending qubit order.
    pub fn vertices(&self) -> Vec<QubitId> {
        let mut vs: Vec<QubitId> = self.index.keys().copied().collect();
        vs.sort_unstable();
        vs
    }

    /// Degree of a vertex.
    pub fn degree(&self, q: QubitId) -> IrResult<usize> {
        let idx = self.index.get(&q).ok_or(IrError::VertexNotInGraph(q))?;
        Ok(self.graph.edges(*idx).count())
    }

    /// Whether two distinct vertices are adjacent.
    pub fn is_adjacent(&self, u: QubitId, v: QubitId) -> bool {
        match (self.index.get(&u), self.index.get(&v)) {
            (Some(&ui), Some(&vi)) => self.graph.find_edge(ui, vi).is_some(),
            _ => false,
        }
    }

    /// The payload of the edge between `u` and `v`.
    pub fn edge_payload(&self, u: QubitId, v: QubitId) -> Option<E> {
        let (&ui, &vi) = (self.index.get(&u)?, self.index.get(&v)?);
        self.graph
            .find_edge(ui, vi)
            .map(|e| *self.graph.edge_weight(e).expect("edge exists"))
    }

    /// All edges with payloads, normalized and sorted for determinism.
    pub fn edges(&self) -> Vec<(Edge, E)> {
        let mut result: Vec<(Edge, E)> = self
            .graph
            .edge_references()
            .map(|e| {
                let u = self.graph[e.source()];
                let v = self.graph[e.target()];
                (edge(u, v), *e.weight())
            })
            .collect();
        result.sort_unstable_by_key(|(e, _)| *e);
        result
    }

    /// The edges incident to a vertex.
    pub fn adjacent_edges(&self, q: QubitId) -> IrResult<Vec<Edge>> {
        let idx = self.index.get(&q).ok_or(IrError::VertexNotInGraph(q))?;
        let mut result: Vec<Edge> = self
            .graph
            .edges(*idx)
            .map(|e| edge(self.graph[e.source()], self.graph[e.target()]))
            .collect();
        result.sort_unstable();
        Ok(result)
    }

    /// The neighbors of a vertex.
    pub fn neighbors(&self, q: QubitId) -> IrResult<Vec<QubitId>> {
        let idx = self.index.get(&q).ok_or(IrError::VertexNotInGraph(q))?;
        let mut result: Vec<QubitId> = self.graph.neighbors(*idx).map(|n| self.graph[n]).collect();
        result.sort_unstable();
        Ok(result)
    }
}

/// Directed acyclic graph over qubits with reachability queries, used to
/// maintain the partial order on fixed vertices during edge coloring.
#[derive(Debug, Clone, Default)]
pub struct PartialOrder {
    graph: DiGraph<QubitId, ()>,
    index: FxHashMap<QubitId, NodeIndex>,
}

impl PartialOrder {
    /// Create an empty partial order.
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, q: QubitId) -> NodeIndex {
        if let Some(&idx) = self.index.get(&q) {
            return idx;
        }
        let idx = self.graph.add_node(q);
        self.index.insert(q, idx);
        idx
    }

    /// Add a vertex.
    pub fn add_vertex(&mut self, q: QubitId) {
        self.node(q);
    }

    /// Add the constraint `u` before `v`. Duplicate edges collapse.
    pub fn add_edge(&mut self, u: QubitId, v: QubitId) {
        let (ui, vi) = (self.node(u), self.node(v));
        self.graph.update_edge(ui, vi, ());
    }

    /// Whether `v` is reachable from `u` (including `u == v`).
    pub fn is_reachable(&self, u: QubitId, v: QubitId) -> bool {
        match (self.index.get(&u), self.index.get(&v)) {
            (Some(&ui), Some(&vi)) => petgraph::algo::has_path_connecting(&self.graph, ui, vi, None),
            _ => false,
        }
    }

    /// Number of vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.graph.node_count()
    }

    /// Kahn topological order of all vertices; ties resolve in ascending
    /// qubit order so the result is deterministic.
    pub fn topological_order(&self) -> IrResult<Vec<QubitId>> {
        let mut indegree: FxHashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|n| {
                (
                    n,
                    self.graph.neighbors_directed(n, Direction::Incoming).count(),
                )
            })
            .collect();
        let mut ready: Vec<NodeIndex> = indegree
            .iter()
            .filter(|&(_, d)| *d == 0)
            .map(|(&n, _)| n)
            .collect();
        // Kept sorted descending so `pop` yields the smallest qubit first.
        ready.sort_unstable_by_key(|&n| std::cmp::Reverse(self.graph[n]));
        let mut result = Vec::with_capacity(self.graph.node_count());
        while let Some(n) = ready.pop() {
            result.push(self.graph[n]);
            for succ in self.graph.neighbors_directed(n, Direction::Outgoing) {
                let d = indegree.get_mut(&succ).expect("successor has an indegree");
                *d -= 1;
                if *d == 0 {
                    ready.push(succ);
                }
            }
            ready.sort_unstable_by_key(|&n| std::cmp::Reverse(self.graph[n]));
        }
        if result.len() != self.graph.node_count() {
            return Err(IrError::CycleDetected);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(i: u32) -> QubitId {
        QubitId(i)
    }

    #[test]
    fn interaction_graph_basics() {
        let mut g: InteractionGraph<usize> = InteractionGraph::new();
        g.add_edge(q(0), q(1), 10);
        g.add_edge(q(1), q(2), 11);
        assert_eq!(g.num_vertices(), 3);
        assert_eq!(g.num_edges(), 2);
        assert!(g.is_adjacent(q(0), q(1)));
        assert!(!g.is_adjacent(q(0), q(2)));
        assert_eq!(g.degree(q(1)).unwrap(), 2);
        assert_eq!(g.edge_payload(q(2), q(1)), Some(11));
        assert_eq!(g.adjacent_edges(q(1)).unwrap(), vec![(q(0), q(1)), (q(1), q(2))]);
        assert!(g.degree(q(9)).is_err());
    }

    #[test]
    fn partial_order_reachability() {
        let mut po = PartialOrder::new();
        po.add_edge(q(0), q(1));
        po.add_edge(q(1), q(2));
        assert!(po.is_reachable(q(0), q(2)));
        assert!(!po.is_reachable(q(2), q(0)));
        assert!(po.is_reachable(q(1), q(1)));
    }

    #[test]
    fn topological_order_respects_edges() {
        let mut po = PartialOrder::new();
        po.add_edge(q(3), q(1));
        po.add_edge(q(1), q(0));
        po.add_vertex(q(7));
        let order = po.topological_order().unwrap();
        let pos =
            |x: QubitId| order.iter().position(|&y| y == x).expect("vertex present in order");
        assert!(pos(q(3)) < pos(q(1)));
        assert!(pos(q(1)) < pos(q(0)));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn cycle_is_detected() {
        let mut po = PartialOrder::new();
        po.add_edge(q(0), q(1));
        po.add_edge(q(1), q(0));
        assert!(matches!(po.topological_order(), Err(IrError::CycleDetected)));
    }

    #[test]
    fn edges_are_adjacent_when_sharing_an_endpoint() {
        assert!(edges_adjacent((q(0), q(1)), (q(1), q(2))));
        assert!(!edges_adjacent((q(0), q(1)), (q(2), q(3))));
    }
}
