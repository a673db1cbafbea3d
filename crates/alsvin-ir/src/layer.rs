//! Layer extraction: a DAG over the circuit's operations that respects
//! commutation and inverse cancellation, exposing the set of operations
//! that are ready to fire.

use std::collections::BTreeSet;

use crate::circuit::Circuit;
use crate::commute::{commutes_on, is_inverse};
use crate::error::{IrError, IrResult};
use crate::graph::InteractionGraph;
use crate::op::{Op, OpKind, QubitId};

/// Stable index of a vertex in the layer DAG's arena.
pub type VertexId = usize;

/// A vertex of the dependency DAG.
///
/// A vertex becomes executable when its counter reaches its threshold.
/// Enabling predecessors raise the threshold on insertion and the counter
/// when fired; disabling predecessors lower the threshold on insertion and
/// the counter when fired. The latter represent self-cancelling pairs that
/// gate their enclosed operations out.
#[derive(Debug, Clone)]
struct DagVertex {
    op: Op,
    threshold: i64,
    counter: i64,
    executed: bool,
    enabled: Vec<VertexId>,
    disabled: Vec<VertexId>,
}

impl DagVertex {
    #[inline]
    fn is_executable(&self) -> bool {
        !self.executed && self.counter == self.threshold
    }
}

/// The layer extractor: dependency DAG plus the executable set.
#[derive(Debug, Clone)]
pub struct Layer {
    vertices: Vec<DagVertex>,
    executable: BTreeSet<VertexId>,
}

impl Layer {
    /// Build the DAG for a circuit.
    pub fn new(circuit: &Circuit) -> IrResult<Self> {
        let mut layer = Layer {
            vertices: Vec::with_capacity(circuit.ops.len()),
            executable: BTreeSet::new(),
        };
        layer.construct(circuit)?;
        Ok(layer)
    }

    fn refresh(&mut self, v: VertexId) {
        if self.vertices[v].is_executable() {
            self.executable.insert(v);
        } else {
            self.executable.remove(&v);
        }
    }

    fn add_enabled_successor(&mut self, parent: VertexId, successor: VertexId) {
        self.vertices[parent].enabled.push(successor);
        self.vertices[successor].threshold += 1;
        self.refresh(successor);
    }

    fn add_disabled_successor(&mut self, parent: VertexId, successor: VertexId) {
        self.vertices[parent].disabled.push(successor);
        self.vertices[successor].threshold -= 1;
        self.refresh(successor);
    }

    fn new_vertex(&mut self, op: Op) -> VertexId {
        let id = self.vertices.len();
        self.vertices.push(DagVertex {
            op,
            threshold: 0,
            counter: 0,
            executed: false,
            enabled: Vec::new(),
            disabled: Vec::new(),
        });
        self.refresh(id);
        id
    }

    fn construct(&mut self, circuit: &Circuit) -> IrResult<()> {
        let n = circuit.num_qubits as usize;
        // For a self-cancelling pair (e.g. two consecutive X gates or RY
        // rotations with opposite angles), the first operation is a
        // destructive vertex disabling the enclosed operations until the
        // matching constructive vertex re-enables them.
        let mut constructive: Vec<Vec<VertexId>> = vec![Vec::new(); n];
        let mut destructive: Vec<Vec<VertexId>> = vec![Vec::new(); n];
        // vertices of the group in which all operations commute on the qubit
        let mut current_group: Vec<Vec<VertexId>> = vec![Vec::new(); n];
        // one-operation lookahead buffer per qubit
        let mut lookahead: Vec<Option<VertexId>> = vec![None; n];
        // the group preceding the current group
        let mut predecessor_group: Vec<Vec<VertexId>> = vec![Vec::new(); n];
        // operations on the qubit so far, excluding (de)constructive ones
        let mut qubit_ops: Vec<Vec<VertexId>> = vec![Vec::new(); n];

        let mut settle = |layer: &mut Layer,
                          qubit: QubitId,
                          current: VertexId,
                          constructive: &[Vec<VertexId>],
                          destructive: &[Vec<VertexId>],
                          current_group: &mut [Vec<VertexId>],
                          predecessor_group: &mut [Vec<VertexId>],
                          qubit_ops: &mut [Vec<VertexId>]|
         -> IrResult<()> {
            let qi = qubit.index();
            for &c in &constructive[qi] {
                layer.add_enabled_successor(c, current);
            }
            for &d in &destructive[qi] {
                layer.add_disabled_successor(d, current);
            }
            if let Some(&head) = current_group[qi].first()
                && !commutes_on(&layer.vertices[head].op, &layer.vertices[current].op, qubit)?
            {
                // the operation does not commute with the current group and
                // is not the inverse of the lookahead: start a new group
                predecessor_group[qi] = std::mem::take(&mut current_group[qi]);
            }
            for &p in &predecessor_group[qi] {
                layer.add_enabled_successor(p, current);
            }
            current_group[qi].push(current);
            qubit_ops[qi].push(current);
            Ok(())
        };

        for op in &circuit.ops {
            let vertex = self.new_vertex(op.clone());
            for qubit in self.vertices[vertex].op.used_qubits() {
                let qi = qubit.index();
                let Some(current) = lookahead[qi] else {
                    lookahead[qi] = Some(vertex);
                    continue;
                };
                lookahead[qi] = Some(vertex);
                let cancel = is_inverse(&self.vertices[current].op, &self.vertices[vertex].op);
                if cancel {
                    // the pair cancels: `current` becomes destructive and the
                    // lookahead becomes the matching constructive vertex
                    for &u in &qubit_ops[qi] {
                        self.add_enabled_successor(vertex, u);
                    }
                    for &u in &destructive[qi] {
                        self.add_enabled_successor(vertex, u);
                    }
                    constructive[qi].push(vertex);
                    for &u in &qubit_ops[qi] {
                        self.add_disabled_successor(current, u);
                    }
                    for &u in &destructive[qi] {
                        self.add_disabled_successor(current, u);
                    }
                    self.add_enabled_successor(current, vertex);
                    destructive[qi].push(current);
                    lookahead[qi] = None;
                } else {
                    settle(
                        self,
                        qubit,
                        current,
                        &constructive,
                        &destructive,
                        &mut current_group,
                        &mut predecessor_group,
                        &mut qubit_ops,
                    )?;
                }
            }
        }
        // flush the remaining lookahead of every qubit
        for qubit in 0..circuit.num_qubits {
            let qi = qubit as usize;
            if let Some(current) = lookahead[qi].take() {
                settle(
                    self,
                    QubitId(qubit),
                    current,
                    &constructive,
                    &destructive,
                    &mut current_group,
                    &mut predecessor_group,
                    &mut qubit_ops,
                )?;
            }
        }
        Ok(())
    }

    /// Number of vertices in the DAG.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// The operation of a vertex.
    #[inline]
    pub fn op(&self, v: VertexId) -> &Op {
        &self.vertices[v].op
    }

    /// Whether the vertex has been fired.
    #[inline]
    pub fn is_executed(&self, v: VertexId) -> bool {
        self.vertices[v].executed
    }

    /// Whether the vertex is currently executable.
    #[inline]
    pub fn is_executable(&self, v: VertexId) -> bool {
        self.vertices[v].is_executable()
    }

    /// The executable set, in ascending vertex order.
    #[inline]
    pub fn executable_set(&self) -> &BTreeSet<VertexId> {
        &self.executable
    }

    /// Whether every vertex that can still fire has fired.
    pub fn is_drained(&self) -> bool {
        self.executable.is_empty()
    }

    /// Fire a vertex: mark it executed and update the counters of its
    /// enabled and disabled successors.
    pub fn execute(&mut self, v: VertexId) -> IrResult<()> {
        if !self.vertices[v].is_executable() {
            return Err(IrError::NotExecutable);
        }
        self.vertices[v].executed = true;
        self.executable.remove(&v);
        for d in self.vertices[v].disabled.clone() {
            self.vertices[d].counter -= 1;
            self.refresh(d);
        }
        for e in self.vertices[v].enabled.clone() {
            self.vertices[e].counter += 1;
            self.refresh(e);
        }
        Ok(())
    }

    /// Fire a batch of vertices in order.
    pub fn execute_all(&mut self, vs: impl IntoIterator<Item = VertexId>) -> IrResult<()> {
        for v in vs {
            self.execute(v)?;
        }
        Ok(())
    }

    /// Executable vertices whose operation has the given kind and number of
    /// controls.
    pub fn executables_of_kind(&self, kind: OpKind, n_controls: usize) -> Vec<VertexId> {
        self.executable
            .iter()
            .copied()
            .filter(|&v| {
                let op = &self.vertices[v].op;
                op.kind() == kind && op.num_controls() == n_controls
            })
            .collect()
    }

    /// The interaction graph of the pending two-qubit operations of the
    /// requested kind in the executable set.
    ///
    /// Only one-control X/Y/Z/RX/RY/RZ describe two-qubit interactions;
    /// anything else is an [`IrError::UnsupportedGate`].
    pub fn interaction_graph(
        &self,
        kind: OpKind,
        n_controls: usize,
    ) -> IrResult<InteractionGraph<VertexId>> {
        let two_qubit_kind = matches!(
            kind,
            OpKind::X | OpKind::Y | OpKind::Z | OpKind::RX | OpKind::RY | OpKind::RZ
        ) && n_controls == 1;
        if !two_qubit_kind {
            let mut name = "c".repeat(n_controls);
            name.push_str(kind.name());
            return Err(IrError::UnsupportedGate(name));
        }
        let mut graph = InteractionGraph::new();
        for &v in &self.executable {
            let op = &self.vertices[v].op;
            if op.kind() == kind && op.num_controls() == n_controls {
                let qubits = op.used_qubits();
                if qubits.len() != 2 {
                    return Err(IrError::UnsupportedGate(format!(
                        "{} on {} qubits",
                        op.kind(),
                        qubits.len()
                    )));
                }
                graph.add_edge(qubits[0], qubits[1], v);
            }
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::Op;

    fn layer_of(ops: Vec<Op>, num_qubits: u32) -> Layer {
        let mut circuit = Circuit::new("test", num_qubits);
        for op in ops {
            circuit.push(op).unwrap();
        }
        Layer::new(&circuit).unwrap()
    }

    #[test]
    fn empty_circuit_has_empty_executable_set() {
        let layer = layer_of(vec![], 2);
        assert!(layer.executable_set().is_empty());
        assert!(layer.is_drained());
    }

    #[test]
    fn single_op_is_executable() {
        let mut layer = layer_of(vec![Op::gate(OpKind::H, [0], vec![])], 1);
        assert_eq!(layer.executable_set().len(), 1);
        layer.execute(0).unwrap();
        assert!(layer.is_drained());
        assert!(layer.execute(0).is_err());
    }

    #[test]
    fn commuting_gates_fire_together() {
        // T and RZ on the same qubit commute; both are executable at once.
        let layer = layer_of(
            vec![
                Op::gate(OpKind::T, [0], vec![]),
                Op::gate(OpKind::RZ, [0], vec![0.4]),
            ],
            1,
        );
        assert_eq!(layer.executable_set().len(), 2);
    }

    #[test]
    fn non_commuting_gates_are_ordered() {
        let mut layer = layer_of(
            vec![
                Op::gate(OpKind::X, [0], vec![]),
                Op::gate(OpKind::Z, [0], vec![]),
            ],
            1,
        );
        assert_eq!(layer.executable_set().iter().copied().collect::<Vec<_>>(), vec![0]);
        layer.execute(0).unwrap();
        assert_eq!(layer.executable_set().iter().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn inverse_pair_is_gated_out() {
        // H q0; CZ; H q0 — the two H gates cancel, so the CZ is immediately
        // executable and the destructive H is not.
        let mut layer = layer_of(
            vec![
                Op::gate(OpKind::H, [0], vec![]),
                Op::gate(OpKind::H, [0], vec![]),
                Op::controlled(OpKind::Z, 0, 1, vec![]),
            ],
            2,
        );
        assert!(layer.is_executable(2));
        layer.execute(2).unwrap();
        // Firing the destructive H re-gates the circuit consistently: the
        // constructive H only becomes executable after the destructive one.
        assert!(layer.is_executable(0));
        assert!(!layer.is_executable(1));
        layer.execute(0).unwrap();
        assert!(layer.is_executable(1));
    }

    #[test]
    fn cz_layers_respect_dependencies() {
        // CZ(0,1) and CZ(2,3) are independent; CZ(1,2) depends on both.
        // All three act as controls, so they all commute pairwise at their
        // shared qubits and everything is executable at once.
        let layer = layer_of(
            vec![
                Op::controlled(OpKind::Z, 0, 1, vec![]),
                Op::controlled(OpKind::Z, 2, 3, vec![]),
                Op::controlled(OpKind::Z, 1, 2, vec![]),
            ],
            4,
        );
        assert_eq!(layer.executable_set().len(), 3);
    }

    #[test]
    fn blocking_single_qubit_gate_splits_cz_groups() {
        // CZ(0,1); X(1); CZ(0,1) — the X on qubit 1 separates the two CZs.
        let mut layer = layer_of(
            vec![
                Op::controlled(OpKind::Z, 0, 1, vec![]),
                Op::gate(OpKind::X, [1], vec![]),
                Op::controlled(OpKind::Z, 0, 1, vec![]),
            ],
            2,
        );
        assert!(layer.is_executable(0));
        assert!(!layer.is_executable(2));
        layer.execute(0).unwrap();
        layer.execute(1).unwrap();
        assert!(layer.is_executable(2));
    }

    #[test]
    fn interaction_graph_collects_executable_czs() {
        let layer = layer_of(
            vec![
                Op::controlled(OpKind::Z, 0, 1, vec![]),
                Op::controlled(OpKind::Z, 1, 2, vec![]),
                Op::gate(OpKind::H, [3], vec![]),
            ],
            4,
        );
        let graph = layer.interaction_graph(OpKind::Z, 1).unwrap();
        assert_eq!(graph.num_vertices(), 3);
        assert_eq!(graph.num_edges(), 2);
        assert!(graph.is_adjacent(QubitId(0), QubitId(1)));
    }

    #[test]
    fn interaction_graph_rejects_unsupported_kinds() {
        let layer = layer_of(vec![], 1);
        assert!(matches!(
            layer.interaction_graph(OpKind::H, 0),
            Err(IrError::UnsupportedGate(_))
        ));
        assert!(matches!(
            layer.interaction_graph(OpKind::Z, 2),
            Err(IrError::UnsupportedGate(_))
        ));
    }

    #[test]
    fn executables_of_kind_filters() {
        let layer = layer_of(
            vec![
                Op::gate(OpKind::H, [0], vec![]),
                Op::gate(OpKind::H, [1], vec![]),
                Op::controlled(OpKind::Z, 0, 1, vec![]),
            ],
            2,
        );
        assert_eq!(layer.executables_of_kind(OpKind::H, 0).len(), 2);
        // the CZ waits for the Hadamards
        assert_eq!(layer.executables_of_kind(OpKind::Z, 1).len(), 0);
    }
}
