//! Gate scheduling: split the circuit into alternating single-qubit layers
//! and two-qubit matchings using the layer DAG's executable set.

use rustc_hash::FxHashSet;
use tracing::warn;

use alsvin_ir::{Circuit, Layer, Op, OpKind, QubitId, VertexId};
use alsvin_place::{GateLayer, ReuseSet};

use crate::error::{CompileError, CompileResult};

/// The scheduled circuit: `K` two-qubit layers enclosed by `K + 1`
/// single-qubit layers, plus the reuse set per two-qubit layer.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    /// Single-qubit gates between the entangling layers.
    pub single_qubit_layers: Vec<Vec<Op>>,
    /// One matching of CZ pairs per entangling layer.
    pub two_qubit_layers: Vec<GateLayer>,
    /// Qubits staying in the entanglement zone between consecutive layers.
    pub reuse: Vec<ReuseSet>,
}

fn is_cz(op: &Op) -> bool {
    op.kind() == OpKind::Z && op.num_controls() == 1
}

/// Build the schedule by repeatedly draining executable single-qubit
/// operations and extracting a maximal matching of executable CZs.
pub fn schedule(circuit: &Circuit) -> CompileResult<Schedule> {
    let mut layer = Layer::new(circuit)?;
    let mut result = Schedule::default();
    loop {
        // drain everything that is not an entangling gate
        let mut singles: Vec<Op> = Vec::new();
        loop {
            let ready: Vec<VertexId> = layer
                .executable_set()
                .iter()
                .copied()
                .filter(|&v| !is_cz(layer.op(v)))
                .collect();
            if ready.is_empty() {
                break;
            }
            for v in ready {
                let op = layer.op(v).clone();
                match &op {
                    Op::NonUnitary(nu) if nu.kind == OpKind::Measure => {
                        warn!("dropping measurement; the target set has no readout instruction");
                    }
                    Op::NonUnitary(nu) if nu.kind == OpKind::Barrier => {}
                    Op::NonUnitary(nu) => {
                        return Err(CompileError::InvalidCircuit(format!(
                            "non-unitary operation '{}' has no hardware equivalent",
                            nu.kind
                        )));
                    }
                    _ if op.used_qubits().len() > 1 && !op.is_compound() => {
                        return Err(CompileError::InvalidCircuit(format!(
                            "multi-qubit operation '{}' is not globally applicable \
                             and is not a CZ",
                            op.kind()
                        )));
                    }
                    _ => singles.push(op),
                }
                layer.execute(v)?;
            }
        }
        result.single_qubit_layers.push(singles);
        // one matching of the pending interaction graph becomes a layer
        let graph = layer.interaction_graph(OpKind::Z, 1)?;
        if graph.num_edges() == 0 {
            break;
        }
        let mut edges: Vec<((QubitId, QubitId), VertexId)> = graph.edges();
        // heaviest endpoints first so contended qubits are matched early
        edges.sort_by_key(|&((a, b), _)| {
            let da = graph.degree(a).expect("endpoint of an edge");
            let db = graph.degree(b).expect("endpoint of an edge");
            (std::cmp::Reverse(da.max(db)), a, b)
        });
        let mut matched: FxHashSet<QubitId> = FxHashSet::default();
        let mut matching: GateLayer = Vec::new();
        for ((a, b), vertex) in edges {
            if matched.contains(&a) || matched.contains(&b) {
                continue;
            }
            matched.insert(a);
            matched.insert(b);
            matching.push((a, b));
            layer.execute(vertex)?;
        }
        result.two_qubit_layers.push(matching);
    }
    // a qubit is reused when it participates in the next layer as well;
    // at most one operand per next-layer gate keeps its site
    for index in 0..result.two_qubit_layers.len() {
        let mut reuse = ReuseSet::default();
        if let Some(next) = result.two_qubit_layers.get(index + 1) {
            let current: FxHashSet<QubitId> = result.two_qubit_layers[index]
                .iter()
                .flat_map(|&(a, b)| [a, b])
                .collect();
            for &(a, b) in next {
                if current.contains(&a) {
                    reuse.insert(a);
                } else if current.contains(&b) {
                    reuse.insert(b);
                }
            }
        }
        result.reuse.push(reuse);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bell_schedule() {
        let mut circuit = Circuit::new("bell", 2);
        circuit.h(0).unwrap();
        circuit.cz(0, 1).unwrap();
        let schedule = schedule(&circuit).unwrap();
        assert_eq!(schedule.two_qubit_layers.len(), 1);
        assert_eq!(schedule.two_qubit_layers[0], vec![(QubitId(0), QubitId(1))]);
        assert_eq!(schedule.single_qubit_layers.len(), 2);
        assert_eq!(schedule.single_qubit_layers[0].len(), 1);
        assert!(schedule.single_qubit_layers[1].is_empty());
    }

    #[test]
    fn conflicting_czs_split_into_layers() {
        let mut circuit = Circuit::new("chain", 3);
        circuit.cz(0, 1).unwrap();
        circuit.cz(1, 2).unwrap();
        let schedule = schedule(&circuit).unwrap();
        assert_eq!(schedule.two_qubit_layers.len(), 2);
        let all: Vec<(QubitId, QubitId)> = schedule
            .two_qubit_layers
            .iter()
            .flatten()
            .copied()
            .collect();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn disjoint_czs_share_a_layer() {
        let mut circuit = Circuit::new("parallel", 4);
        circuit.cz(0, 1).unwrap();
        circuit.cz(2, 3).unwrap();
        let schedule = schedule(&circuit).unwrap();
        assert_eq!(schedule.two_qubit_layers.len(), 1);
        assert_eq!(schedule.two_qubit_layers[0].len(), 2);
    }

    #[test]
    fn every_cz_is_scheduled_exactly_once() {
        let mut circuit = Circuit::new("ring", 5);
        for q in 0..5 {
            circuit.h(q).unwrap();
        }
        for q in 0..5u32 {
            circuit.cz(q, (q + 1) % 5).unwrap();
        }
        let schedule = schedule(&circuit).unwrap();
        let mut scheduled: Vec<(u32, u32)> = schedule
            .two_qubit_layers
            .iter()
            .flatten()
            .map(|&(a, b)| (a.0.min(b.0), a.0.max(b.0)))
            .collect();
        scheduled.sort_unstable();
        let mut expected: Vec<(u32, u32)> = (0..5u32)
            .map(|q| (q.min((q + 1) % 5), q.max((q + 1) % 5)))
            .collect();
        expected.sort_unstable();
        assert_eq!(scheduled, expected);
        // a matching never repeats a qubit within a layer
        for layer in &schedule.two_qubit_layers {
            let mut seen = FxHashSet::default();
            for &(a, b) in layer {
                assert!(seen.insert(a));
                assert!(seen.insert(b));
            }
        }
    }

    #[test]
    fn reuse_marks_at_most_one_operand_per_next_gate() {
        let mut circuit = Circuit::new("reuse", 3);
        circuit.cz(0, 1).unwrap();
        circuit.cz(1, 2).unwrap();
        let schedule = schedule(&circuit).unwrap();
        assert_eq!(schedule.reuse.len(), 2);
        assert!(schedule.reuse[0].contains(&QubitId(1)));
        assert_eq!(schedule.reuse[0].len(), 1);
        assert!(schedule.reuse[1].is_empty());
    }

    #[test]
    fn unsupported_two_qubit_gate_is_rejected() {
        let mut circuit = Circuit::new("bad", 2);
        circuit
            .push(Op::controlled(OpKind::X, 0, 1, vec![]))
            .unwrap();
        assert!(matches!(
            schedule(&circuit),
            Err(CompileError::InvalidCircuit(_))
        ));
    }

    #[test]
    fn global_layers_pass_through() {
        let mut circuit = Circuit::new("global", 3);
        circuit
            .push(Op::global(OpKind::RY, 3, vec![0.5]))
            .unwrap();
        circuit.cz(0, 1).unwrap();
        let schedule = schedule(&circuit).unwrap();
        assert_eq!(schedule.single_qubit_layers[0].len(), 1);
        assert!(schedule.single_qubit_layers[0][0].is_compound());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arbitrary_cz_circuit() -> impl Strategy<Value = Circuit> {
            proptest::collection::vec((0u32..6, 0u32..6), 1..15).prop_map(|pairs| {
                let mut circuit = Circuit::new("random", 6);
                for (a, b) in pairs {
                    if a != b {
                        circuit.cz(a, b).unwrap();
                    }
                }
                circuit
            })
        }

        proptest! {
            #[test]
            fn layers_are_matchings_and_cover_the_circuit(circuit in arbitrary_cz_circuit()) {
                let schedule = schedule(&circuit).unwrap();
                let mut count = 0usize;
                for layer in &schedule.two_qubit_layers {
                    let mut seen = FxHashSet::default();
                    for &(a, b) in layer {
                        prop_assert!(seen.insert(a));
                        prop_assert!(seen.insert(b));
                        count += 1;
                    }
                }
                prop_assert_eq!(count, circuit.cz_pairs().len());
            }
        }
    }
}
