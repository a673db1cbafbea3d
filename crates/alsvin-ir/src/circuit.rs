//! Circuit container and the JSON input format.

use serde::{Deserialize, Serialize};

use crate::error::{IrError, IrResult};
use crate::op::{Op, OpKind, QubitId, StandardOp};

/// An ordered list of operations over a register of qubits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Circuit {
    /// Human-readable name.
    pub name: String,
    /// Number of qubits in the register.
    pub num_qubits: u32,
    /// Operations in program order.
    pub ops: Vec<Op>,
}

/// One operation record of the JSON input format.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpRecord {
    kind: String,
    #[serde(default)]
    targets: Vec<u32>,
    #[serde(default)]
    controls: Vec<u32>,
    #[serde(default)]
    params: Vec<f64>,
    #[serde(default)]
    global: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct CircuitRecord {
    #[serde(default)]
    name: String,
    num_qubits: u32,
    ops: Vec<OpRecord>,
}

impl Circuit {
    /// Create an empty circuit.
    pub fn new(name: impl Into<String>, num_qubits: u32) -> Self {
        Self {
            name: name.into(),
            num_qubits,
            ops: Vec::new(),
        }
    }

    /// Append an operation, validating its qubit indices.
    pub fn push(&mut self, op: Op) -> IrResult<()> {
        for q in op.used_qubits() {
            if q.0 >= self.num_qubits {
                return Err(IrError::InvalidCircuit(format!(
                    "operation '{}' uses qubit {q} but the register has {} qubits",
                    op.kind(),
                    self.num_qubits
                )));
            }
        }
        self.ops.push(op);
        Ok(())
    }

    /// Append a CZ gate.
    pub fn cz(&mut self, control: u32, target: u32) -> IrResult<()> {
        self.push(Op::controlled(OpKind::Z, control, target, vec![]))
    }

    /// Append a Hadamard gate.
    pub fn h(&mut self, target: u32) -> IrResult<()> {
        self.push(Op::gate(OpKind::H, [target], vec![]))
    }

    /// All one-control Z pairs of the circuit, in program order.
    pub fn cz_pairs(&self) -> Vec<(QubitId, QubitId)> {
        self.ops
            .iter()
            .filter(|op| op.kind() == OpKind::Z && op.num_controls() == 1)
            .map(|op| {
                let qs = op.used_qubits();
                (qs[0], qs[1])
            })
            .collect()
    }

    /// Parse the JSON input format.
    pub fn from_json(input: &str) -> IrResult<Self> {
        let record: CircuitRecord = serde_json::from_str(input)
            .map_err(|e| IrError::InvalidCircuit(format!("malformed circuit JSON: {e}")))?;
        let mut circuit = Circuit::new(record.name, record.num_qubits);
        for op in record.ops {
            let kind = OpKind::parse(&op.kind)?;
            let parsed = if op.global {
                if !op.controls.is_empty() {
                    return Err(IrError::InvalidCircuit(
                        "a global operation cannot be controlled".into(),
                    ));
                }
                Op::global(kind, record.num_qubits, op.params)
            } else {
                Op::Standard(StandardOp {
                    kind,
                    controls: op.controls.into_iter().map(QubitId).collect(),
                    targets: op.targets.into_iter().map(QubitId).collect(),
                    params: op.params,
                })
            };
            circuit.push(parsed)?;
        }
        Ok(circuit)
    }

    /// Serialize into the JSON input format.
    pub fn to_json(&self) -> String {
        let ops = self
            .ops
            .iter()
            .map(|op| {
                let global = op.is_compound() && op.is_global_over(self.num_qubits as usize);
                OpRecord {
                    kind: op.kind().name().to_string(),
                    targets: if global {
                        vec![]
                    } else {
                        op.targets().iter().map(|q| q.0).collect()
                    },
                    controls: op.controls().iter().map(|q| q.0).collect(),
                    params: op.params().to_vec(),
                    global,
                }
            })
            .collect();
        let record = CircuitRecord {
            name: self.name.clone(),
            num_qubits: self.num_qubits,
            ops,
        };
        serde_json::to_string_pretty(&record).expect("circuit record serialization cannot fail")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_circuit() {
        let circuit = Circuit::from_json(
            r#"{
                "name": "bell",
                "num_qubits": 2,
                "ops": [
                    {"kind": "h", "targets": [0]},
                    {"kind": "z", "controls": [0], "targets": [1]}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(circuit.num_qubits, 2);
        assert_eq!(circuit.ops.len(), 2);
        assert_eq!(circuit.cz_pairs(), vec![(QubitId(0), QubitId(1))]);
    }

    #[test]
    fn parse_global_op() {
        let circuit = Circuit::from_json(
            r#"{"num_qubits": 3, "ops": [{"kind": "ry", "params": [1.5707963267948966], "global": true}]}"#,
        )
        .unwrap();
        assert!(circuit.ops[0].is_global_over(3));
    }

    #[test]
    fn out_of_range_qubit_is_rejected() {
        let result = Circuit::from_json(r#"{"num_qubits": 1, "ops": [{"kind": "x", "targets": [4]}]}"#);
        assert!(matches!(result, Err(IrError::InvalidCircuit(_))));
    }

    #[test]
    fn json_round_trip() {
        let mut circuit = Circuit::new("rt", 3);
        circuit.h(0).unwrap();
        circuit.cz(0, 2).unwrap();
        circuit
            .push(Op::global(OpKind::RY, 3, vec![0.25]))
            .unwrap();
        let parsed = Circuit::from_json(&circuit.to_json()).unwrap();
        assert_eq!(parsed, circuit);
    }
}
