//! Operation model: standard, compound, and non-unitary operations.

use serde::{Deserialize, Serialize};

use crate::error::{IrError, IrResult};

/// Tolerance when comparing rotation parameters.
pub const PARAMETER_TOLERANCE: f64 = 1e-13;

/// Identifier of a qubit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct QubitId(pub u32);

impl QubitId {
    /// Use the qubit as an index into per-qubit tables.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for QubitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of a (standard or non-unitary) operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    /// Identity.
    I,
    /// Pauli-X.
    X,
    /// Pauli-Y.
    Y,
    /// Pauli-Z.
    Z,
    /// Hadamard.
    H,
    /// S gate.
    S,
    /// S-dagger.
    Sdg,
    /// T gate.
    T,
    /// T-dagger.
    Tdg,
    /// sqrt(X).
    SX,
    /// sqrt(X)-dagger.
    SXdg,
    /// V gate.
    V,
    /// V-dagger.
    Vdg,
    /// Rotation around X; one parameter.
    RX,
    /// Rotation around Y; one parameter.
    RY,
    /// Rotation around Z; one parameter.
    RZ,
    /// Phase gate; one parameter.
    P,
    /// Universal single-qubit gate U(θ, φ, λ).
    U,
    /// U2(φ, λ) = U(π/2, φ, λ).
    U2,
    /// ZZ rotation; one parameter.
    RZZ,
    /// Barrier pseudo-operation.
    Barrier,
    /// Measurement.
    Measure,
    /// Reset to |0⟩.
    Reset,
}

/// Gates that are diagonal in the computational basis (or otherwise commute
/// with everything diagonal, like barriers).
pub const DIAGONAL_KINDS: [OpKind; 10] = [
    OpKind::Barrier,
    OpKind::I,
    OpKind::Z,
    OpKind::S,
    OpKind::Sdg,
    OpKind::T,
    OpKind::Tdg,
    OpKind::P,
    OpKind::RZ,
    OpKind::RZZ,
];

impl OpKind {
    /// Lowercase name as used in the circuit input format.
    pub fn name(self) -> &'static str {
        match self {
            OpKind::I => "i",
            OpKind::X => "x",
            OpKind::Y => "y",
            OpKind::Z => "z",
            OpKind::H => "h",
            OpKind::S => "s",
            OpKind::Sdg => "sdg",
            OpKind::T => "t",
            OpKind::Tdg => "tdg",
            OpKind::SX => "sx",
            OpKind::SXdg => "sxdg",
            OpKind::V => "v",
            OpKind::Vdg => "vdg",
            OpKind::RX => "rx",
            OpKind::RY => "ry",
            OpKind::RZ => "rz",
            OpKind::P => "p",
            OpKind::U => "u",
            OpKind::U2 => "u2",
            OpKind::RZZ => "rzz",
            OpKind::Barrier => "barrier",
            OpKind::Measure => "measure",
            OpKind::Reset => "reset",
        }
    }

    /// Parse a name from the circuit input format.
    pub fn parse(name: &str) -> IrResult<Self> {
        Ok(match name {
            "i" | "id" => OpKind::I,
            "x" => OpKind::X,
            "y" => OpKind::Y,
            "z" => OpKind::Z,
            "h" => OpKind::H,
            "s" => OpKind::S,
            "sdg" => OpKind::Sdg,
            "t" => OpKind::T,
            "tdg" => OpKind::Tdg,
            "sx" => OpKind::SX,
            "sxdg" => OpKind::SXdg,
            "v" => OpKind::V,
            "vdg" => OpKind::Vdg,
            "rx" => OpKind::RX,
            "ry" => OpKind::RY,
            "rz" => OpKind::RZ,
            "p" | "phase" => OpKind::P,
            "u" | "u3" => OpKind::U,
            "u2" => OpKind::U2,
            "rzz" => OpKind::RZZ,
            "barrier" => OpKind::Barrier,
            "measure" => OpKind::Measure,
            "reset" => OpKind::Reset,
            other => return Err(IrError::UnknownOpKind(other.to_string())),
        })
    }

    /// Whether the gate is diagonal in the computational basis.
    #[inline]
    pub fn is_diagonal(self) -> bool {
        DIAGONAL_KINDS.contains(&self)
    }

    /// Whether the kind describes a unitary gate.
    #[inline]
    pub fn is_unitary(self) -> bool {
        !matches!(self, OpKind::Measure | OpKind::Reset | OpKind::Barrier)
    }

    /// Number of parameters the gate carries.
    pub fn num_params(self) -> usize {
        match self {
            OpKind::RX | OpKind::RY | OpKind::RZ | OpKind::P | OpKind::RZZ => 1,
            OpKind::U2 => 2,
            OpKind::U => 3,
            _ => 0,
        }
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A standard operation: a single gate application with optional controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardOp {
    /// The gate kind.
    pub kind: OpKind,
    /// Control qubits (may be empty).
    pub controls: Vec<QubitId>,
    /// Target qubits.
    pub targets: Vec<QubitId>,
    /// Gate parameters (angles in radians).
    pub params: Vec<f64>,
}

/// A compound operation: the same standard gate applied to many qubits at
/// once, e.g. a QASM line `ry(π) q;` over a whole register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundOp {
    ops: Vec<StandardOp>,
}

impl CompoundOp {
    /// Build a compound operation from homogeneous children.
    ///
    /// All children must be uncontrolled standard gates of the same kind with
    /// the same parameters.
    pub fn new(ops: Vec<StandardOp>) -> IrResult<Self> {
        let Some(first) = ops.first() else {
            return Err(IrError::InvalidCircuit(
                "compound operation must have at least one child".into(),
            ));
        };
        let kind = first.kind;
        let params = first.params.clone();
        for op in &ops {
            if op.kind != kind || op.params != params || !op.controls.is_empty() {
                return Err(IrError::InvalidCircuit(
                    "compound operation children must be homogeneous and uncontrolled".into(),
                ));
            }
        }
        Ok(Self { ops })
    }

    /// Immutable access to the children.
    #[inline]
    pub fn children(&self) -> &[StandardOp] {
        &self.ops
    }

    /// The kind shared by all children.
    #[inline]
    pub fn child_kind(&self) -> OpKind {
        self.ops[0].kind
    }

    /// The parameters shared by all children.
    #[inline]
    pub fn child_params(&self) -> &[f64] {
        &self.ops[0].params
    }
}

/// A non-unitary operation (measurement, reset, barrier).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonUnitaryOp {
    /// Measure, Reset, or Barrier.
    pub kind: OpKind,
    /// Affected qubits.
    pub targets: Vec<QubitId>,
}

/// Any operation in a circuit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Op {
    /// A standard gate application.
    Standard(StandardOp),
    /// A register-wide homogeneous gate.
    Compound(CompoundOp),
    /// A non-unitary operation.
    NonUnitary(NonUnitaryOp),
}

impl Op {
    /// Convenience constructor for an uncontrolled standard gate.
    pub fn gate(kind: OpKind, targets: impl IntoIterator<Item = u32>, params: Vec<f64>) -> Self {
        Op::Standard(StandardOp {
            kind,
            controls: vec![],
            targets: targets.into_iter().map(QubitId).collect(),
            params,
        })
    }

    /// Convenience constructor for a singly-controlled standard gate.
    pub fn controlled(kind: OpKind, control: u32, target: u32, params: Vec<f64>) -> Self {
        Op::Standard(StandardOp {
            kind,
            controls: vec![QubitId(control)],
            targets: vec![QubitId(target)],
            params,
        })
    }

    /// Convenience constructor for a compound gate over `0..n` qubits.
    pub fn global(kind: OpKind, num_qubits: u32, params: Vec<f64>) -> Self {
        let ops = (0..num_qubits)
            .map(|q| StandardOp {
                kind,
                controls: vec![],
                targets: vec![QubitId(q)],
                params: params.clone(),
            })
            .collect();
        Op::Compound(CompoundOp { ops })
    }

    /// The effective kind of the operation.
    ///
    /// For a compound operation this is the kind of its (homogeneous)
    /// children.
    pub fn kind(&self) -> OpKind {
        match self {
            Op::Standard(op) => op.kind,
            Op::Compound(op) => op.child_kind(),
            Op::NonUnitary(op) => op.kind,
        }
    }

    /// Control qubits.
    pub fn controls(&self) -> &[QubitId] {
        match self {
            Op::Standard(op) => &op.controls,
            Op::Compound(_) | Op::NonUnitary(_) => &[],
        }
    }

    /// Target qubits. For a compound operation, targets of all children.
    pub fn targets(&self) -> Vec<QubitId> {
        match self {
            Op::Standard(op) => op.targets.clone(),
            Op::Compound(op) => op
                .children()
                .iter()
                .flat_map(|c| c.targets.iter().copied())
                .collect(),
            Op::NonUnitary(op) => op.targets.clone(),
        }
    }

    /// Gate parameters. For a compound operation, those of the children.
    pub fn params(&self) -> &[f64] {
        match self {
            Op::Standard(op) => &op.params,
            Op::Compound(op) => op.child_params(),
            Op::NonUnitary(_) => &[],
        }
    }

    /// Number of controls.
    #[inline]
    pub fn num_controls(&self) -> usize {
        self.controls().len()
    }

    /// All qubits the operation acts on, in ascending order.
    pub fn used_qubits(&self) -> Vec<QubitId> {
        let mut qubits: Vec<QubitId> = self.controls().to_vec();
        qubits.extend(self.targets());
        qubits.sort_unstable();
        qubits.dedup();
        qubits
    }

    /// Whether the operation acts on the given qubit.
    pub fn acts_on(&self, qubit: QubitId) -> bool {
        self.controls().contains(&qubit) || self.targets().contains(&qubit)
    }

    /// Whether the qubit is a control of the operation.
    #[inline]
    pub fn is_control(&self, qubit: QubitId) -> bool {
        self.controls().contains(&qubit)
    }

    /// Whether the operation is global over a register of `num_qubits`.
    ///
    /// A standard operation is global if it uses all qubits; a compound
    /// operation is global if its homogeneous children cover all qubits.
    pub fn is_global_over(&self, num_qubits: usize) -> bool {
        match self {
            Op::Standard(_) | Op::Compound(_) => self.used_qubits().len() == num_qubits,
            Op::NonUnitary(_) => false,
        }
    }

    /// Whether the operation is a compound operation.
    #[inline]
    pub fn is_compound(&self) -> bool {
        matches!(self, Op::Compound(_))
    }

    /// Whether the operation is unitary.
    pub fn is_unitary(&self) -> bool {
        match self {
            Op::Standard(op) => op.kind.is_unitary(),
            Op::Compound(_) => true,
            Op::NonUnitary(_) => false,
        }
    }

    /// The effective diagonality of the operation on its targets.
    pub fn is_diagonal(&self) -> bool {
        self.kind().is_diagonal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn used_qubits_are_sorted_and_deduped() {
        let op = Op::controlled(OpKind::Z, 3, 1, vec![]);
        assert_eq!(op.used_qubits(), vec![QubitId(1), QubitId(3)]);
        assert!(op.acts_on(QubitId(3)));
        assert!(op.is_control(QubitId(3)));
        assert!(!op.is_control(QubitId(1)));
    }

    #[test]
    fn global_compound_covers_register() {
        let op = Op::global(OpKind::RY, 4, vec![std::f64::consts::FRAC_PI_2]);
        assert!(op.is_global_over(4));
        assert!(!op.is_global_over(5));
        assert_eq!(op.kind(), OpKind::RY);
    }

    #[test]
    fn compound_requires_homogeneous_children() {
        let mixed = vec![
            StandardOp {
                kind: OpKind::X,
                controls: vec![],
                targets: vec![QubitId(0)],
                params: vec![],
            },
            StandardOp {
                kind: OpKind::Y,
                controls: vec![],
                targets: vec![QubitId(1)],
                params: vec![],
            },
        ];
        assert!(CompoundOp::new(mixed).is_err());
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in [
            OpKind::I,
            OpKind::X,
            OpKind::H,
            OpKind::Sdg,
            OpKind::SXdg,
            OpKind::RZ,
            OpKind::U2,
            OpKind::RZZ,
            OpKind::Barrier,
        ] {
            assert_eq!(OpKind::parse(kind.name()).unwrap(), kind);
        }
        assert!(OpKind::parse("frobnicate").is_err());
    }
}
