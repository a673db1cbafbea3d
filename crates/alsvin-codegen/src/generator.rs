//! The code assembler: turns placements, routing groups, and single-qubit
//! gate layers into the instruction stream.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use alsvin_arch::{Architecture, Site};
use alsvin_ir::{Op, OpKind, QubitId};

use crate::error::{CodegenError, CodegenResult};
use crate::program::{AtomDecl, Instruction, MoveTarget, Program};

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

/// A placement indexed by qubit, as produced by the placer.
pub type Placement = Vec<Site>;

/// The move groups of one rearrangement step.
pub type RoutingStep = Vec<Vec<QubitId>>;

/// Configuration of the code assembler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenConfig {
    /// Offset applied to already-loaded atoms before picking up the next
    /// row, avoiding phantom-site collisions.
    pub parking_offset: u64,
    /// Warn and fall back to a U decomposition on unsupported gates; when
    /// disabled they are fatal.
    pub warn_unsupported_gates: bool,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            parking_offset: 1,
            warn_unsupported_gates: true,
        }
    }
}

/// Assembles the instruction stream for one compiled circuit.
pub struct CodeGenerator<'a> {
    architecture: &'a Architecture,
    config: CodegenConfig,
}

impl<'a> CodeGenerator<'a> {
    /// Create a generator for an architecture.
    pub fn new(architecture: &'a Architecture, config: CodegenConfig) -> Self {
        Self {
            architecture,
            config,
        }
    }

    /// Generate the program.
    ///
    /// `single_qubit_layers` has one entry more than the number of
    /// two-qubit layers; `placements` alternates execution and storage
    /// placements after the initial one; `routing` holds one step per
    /// placement transition.
    pub fn generate(
        &self,
        single_qubit_layers: &[Vec<Op>],
        placements: &[Placement],
        routing: &[RoutingStep],
    ) -> CodegenResult<Program> {
        if placements.is_empty() {
            return Err(CodegenError::Inconsistent(
                "at least the initial placement is required".into(),
            ));
        }
        if placements.len() % 2 == 0 {
            return Err(CodegenError::Inconsistent(
                "placements must alternate execution/storage after the initial one".into(),
            ));
        }
        let num_layers = (placements.len() - 1) / 2;
        if !single_qubit_layers.is_empty() && single_qubit_layers.len() != num_layers + 1 {
            return Err(CodegenError::Inconsistent(format!(
                "{} two-qubit layers need {} single-qubit layers, got {}",
                num_layers,
                num_layers + 1,
                single_qubit_layers.len()
            )));
        }
        if routing.len() != placements.len() - 1 {
            return Err(CodegenError::Inconsistent(format!(
                "{} placements need {} routing steps, got {}",
                placements.len(),
                placements.len() - 1,
                routing.len()
            )));
        }
        let mut program = Program::default();
        let num_qubits = placements[0].len();
        for (index, &site) in placements[0].iter().enumerate() {
            let (x, y) = self.architecture.exact_location(site)?;
            program.atoms.push(AtomDecl {
                name: format!("atom{index}"),
                x: x as f64,
                y: y as f64,
            });
        }
        if single_qubit_layers.is_empty() && num_layers == 0 {
            return Ok(program);
        }
        let cz_zone = "zone_cz0".to_string();
        if let Some(layer) = single_qubit_layers.first() {
            self.append_single_qubit_gates(num_qubits, layer, &mut program)?;
        }
        for layer in 0..num_layers {
            self.append_rearrangement(
                &placements[2 * layer],
                &routing[2 * layer],
                &placements[2 * layer + 1],
                &mut program,
            )?;
            program.instructions.push(Instruction::GlobalCz(cz_zone.clone()));
            self.append_rearrangement(
                &placements[2 * layer + 1],
                &routing[2 * layer + 1],
                &placements[2 * (layer + 1)],
                &mut program,
            )?;
            if let Some(singles) = single_qubit_layers.get(layer + 1) {
                self.append_single_qubit_gates(num_qubits, singles, &mut program)?;
            }
        }
        Ok(program)
    }

    /// Lower one layer of single-qubit gates into the target set.
    fn append_single_qubit_gates(
        &self,
        num_qubits: usize,
        layer: &[Op],
        program: &mut Program,
    ) -> CodegenResult<()> {
        for op in layer {
            if op.is_global_over(num_qubits) && num_qubits > 1 {
                match op.kind() {
                    OpKind::RY => {
                        program
                            .instructions
                            .push(Instruction::GlobalRy(op.params()[0]));
                        continue;
                    }
                    OpKind::Y => {
                        program.instructions.push(Instruction::GlobalRy(PI));
                        continue;
                    }
                    _ => {}
                }
            }
            match op {
                Op::Compound(compound) => {
                    for child in compound.children() {
                        self.append_local_gate(
                            child.kind,
                            &child.params,
                            child.targets[0],
                            program,
                        )?;
                    }
                }
                Op::Standard(standard) => {
                    if !standard.controls.is_empty() || standard.targets.len() != 1 {
                        return Err(CodegenError::Inconsistent(format!(
                            "'{}' is not a single-qubit gate",
                            standard.kind
                        )));
                    }
                    self.append_local_gate(
                        standard.kind,
                        &standard.params,
                        standard.targets[0],
                        program,
                    )?;
                }
                Op::NonUnitary(op) if op.kind == OpKind::Barrier => {}
                Op::NonUnitary(op) => {
                    return Err(CodegenError::UnsupportedGate(op.kind.name().to_string()));
                }
            }
        }
        Ok(())
    }

    fn append_local_gate(
        &self,
        kind: OpKind,
        params: &[f64],
        qubit: QubitId,
        program: &mut Program,
    ) -> CodegenResult<()> {
        let atom = format!("atom{}", qubit.0);
        let rz = |theta: f64| Instruction::LocalRz(theta, atom.clone());
        let instruction = match kind {
            OpKind::RZ => rz(params[0]),
            OpKind::P => rz(params[0]),
            OpKind::Z => rz(PI),
            OpKind::S => rz(FRAC_PI_2),
            OpKind::Sdg => rz(-FRAC_PI_2),
            OpKind::T => rz(FRAC_PI_4),
            OpKind::Tdg => rz(-FRAC_PI_4),
            OpKind::I | OpKind::Barrier => return Ok(()),
            other => {
                if !self.config.warn_unsupported_gates {
                    return Err(CodegenError::UnsupportedGate(other.name().to_string()));
                }
                warn!(gate = other.name(), "gate outside the basis set lowered to u");
                let u = |theta: f64, phi: f64, lambda: f64| {
                    Instruction::LocalU(theta, phi, lambda, atom.clone())
                };
                match other {
                    OpKind::U => u(params[0], params[1], params[2]),
                    OpKind::U2 => u(FRAC_PI_2, params[0], params[1]),
                    OpKind::RX => u(params[0], -FRAC_PI_2, FRAC_PI_2),
                    OpKind::RY => u(params[0], 0.0, 0.0),
                    OpKind::H => u(FRAC_PI_2, 0.0, PI),
                    OpKind::X => u(PI, 0.0, PI),
                    OpKind::Y => u(PI, FRAC_PI_2, FRAC_PI_2),
                    OpKind::V => u(-FRAC_PI_2, -FRAC_PI_2, FRAC_PI_2),
                    OpKind::Vdg => u(-FRAC_PI_2, FRAC_PI_2, -FRAC_PI_2),
                    OpKind::SX => u(FRAC_PI_2, -FRAC_PI_2, FRAC_PI_2),
                    OpKind::SXdg => u(-FRAC_PI_2, -FRAC_PI_2, FRAC_PI_2),
                    unsupported => {
                        return Err(CodegenError::UnsupportedGate(
                            unsupported.name().to_string(),
                        ));
                    }
                }
            }
        };
        program.instructions.push(instruction);
        Ok(())
    }

    /// Emit load → move → store triples realizing one rearrangement step.
    ///
    /// Atoms are picked up row-by-row; before each subsequent row the
    /// already-loaded atoms are offset by the parking distance so the next
    /// pickup does not create phantom sites.
    fn append_rearrangement(
        &self,
        start: &Placement,
        routing: &RoutingStep,
        target: &Placement,
        program: &mut Program,
    ) -> CodegenResult<()> {
        let offset = self.config.parking_offset as f64;
        for group in routing {
            let mut rows: BTreeMap<i64, BTreeMap<i64, QubitId>> = BTreeMap::new();
            let mut final_moves: Vec<MoveTarget> = Vec::new();
            for &qubit in group {
                let (x, y) = self
                    .architecture
                    .exact_location(start[qubit.index()])?;
                rows.entry(y).or_default().insert(x, qubit);
                let (tx, ty) = self
                    .architecture
                    .exact_location(target[qubit.index()])?;
                final_moves.push(MoveTarget {
                    x: tx as f64,
                    y: ty as f64,
                    atom: format!("atom{}", qubit.0),
                });
            }
            if rows.is_empty() {
                continue;
            }
            let mut loaded: Vec<(QubitId, (f64, f64))> = Vec::new();
            let mut row_iter = rows.iter();
            let (&first_y, first_row) = row_iter.next().expect("group is non-empty");
            program.instructions.push(Instruction::Load(
                first_row
                    .values()
                    .map(|q| format!("atom{}", q.0))
                    .collect(),
            ));
            for (&x, &q) in first_row {
                loaded.push((q, (x as f64, first_y as f64)));
            }
            for (&y, row) in row_iter {
                // park the loaded atoms away from the pickup row
                let mut park_moves = Vec::with_capacity(loaded.len());
                for (q, position) in &mut *loaded {
                    let (x, old_y) = *position;
                    let new_position = if row.contains_key(&(x as i64)) {
                        // an atom below gets picked up in this column: a
                        // vertical offset suffices
                        (x, old_y + offset)
                    } else {
                        (x + offset, old_y + offset)
                    };
                    park_moves.push(MoveTarget {
                        x: new_position.0,
                        y: new_position.1,
                        atom: format!("atom{}", q.0),
                    });
                    *position = new_position;
                }
                program.instructions.push(Instruction::Move(park_moves));
                program.instructions.push(Instruction::Load(
                    row.values().map(|q| format!("atom{}", q.0)).collect(),
                ));
                for (&x, &q) in row {
                    loaded.push((q, (x as f64, y as f64)));
                }
            }
            program.instructions.push(Instruction::Move(final_moves));
            program.instructions.push(Instruction::Store(
                group.iter().map(|q| format!("atom{}", q.0)).collect(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARCH: &str = r#"{
        "name": "codegen_test",
        "storage_zones": [{
            "zone_id": 0,
            "slms": [{"id": 0, "site_separation": [3, 3], "r": 20, "c": 20, "location": [0, 0]}]
        }],
        "entanglement_zones": [{
            "zone_id": 0,
            "slms": [
                {"id": 1, "site_separation": [12, 10], "r": 4, "c": 4, "location": [5, 70]},
                {"id": 2, "site_separation": [12, 10], "r": 4, "c": 4, "location": [7, 70]}
            ]
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
    fn one_layer_emits_load_move_store_around_cz() {
        let arch = arch();
        let generator = CodeGenerator::new(&arch, CodegenConfig::default());
        let placements = vec![
            vec![Site::new(0, 19, 0), Site::new(0, 19, 1)],
            vec![Site::new(1, 0, 0), Site::new(2, 0, 0)],
            vec![Site::new(0, 19, 0), Site::new(0, 19, 1)],
        ];
        let routing = vec![
            vec![vec![q(0), q(1)]],
            vec![vec![q(0), q(1)]],
        ];
        let singles = vec![vec![], vec![]];
        let program = generator.generate(&singles, &placements, &routing).unwrap();
        assert_eq!(program.atoms.len(), 2);
        let kinds: Vec<&Instruction> = program.instructions.iter().collect();
        assert!(matches!(kinds[0], Instruction::Load(_)));
        assert!(matches!(kinds[1], Instruction::Move(_)));
        assert!(matches!(kinds[2], Instruction::Store(_)));
        assert!(matches!(kinds[3], Instruction::GlobalCz(_)));
        assert!(matches!(kinds[4], Instruction::Load(_)));
        assert!(matches!(kinds[5], Instruction::Move(_)));
        assert!(matches!(kinds[6], Instruction::Store(_)));
        program.validate_shuttles().unwrap();
    }

    #[test]
    fn multi_row_pickup_parks_loaded_atoms() {
        let arch = arch();
        let generator = CodeGenerator::new(&arch, CodegenConfig::default());
        // two rows move together: row 18 is loaded, parked, then row 19
        let start = vec![
            Site::new(0, 18, 0),
            Site::new(0, 18, 1),
            Site::new(0, 19, 0),
            Site::new(0, 19, 1),
        ];
        let execution = vec![
            Site::new(1, 0, 0),
            Site::new(2, 0, 0),
            Site::new(1, 1, 0),
            Site::new(2, 1, 0),
        ];
        let placements = vec![start.clone(), execution, start];
        let group = vec![vec![q(0), q(1), q(2), q(3)]];
        let routing = vec![group.clone(), group];
        let program = generator.generate(&[], &placements, &routing).unwrap();
        // first step: load row 18, park it, load row 19, move, store
        let first_store = program
            .instructions
            .iter()
            .position(|i| matches!(i, Instruction::Store(_)))
            .unwrap();
        let loads = program.instructions[..first_store]
            .iter()
            .filter(|i| matches!(i, Instruction::Load(_)))
            .count();
        let moves = program.instructions[..first_store]
            .iter()
            .filter(|i| matches!(i, Instruction::Move(_)))
            .count();
        assert_eq!(loads, 2);
        assert_eq!(moves, 2);
        // the parking move lifts the first row vertically: same column gets
        // picked up below
        let Instruction::Move(park) = &program.instructions[1] else {
            panic!("expected the parking move");
        };
        assert_eq!(park.len(), 2);
        assert_eq!(park[0].x, 0.0);
        assert_eq!(park[0].y, 55.0);
    }

    #[test]
    fn single_qubit_rewrites() {
        let arch = arch();
        let generator = CodeGenerator::new(&arch, CodegenConfig::default());
        let placements = vec![vec![Site::new(0, 19, 0), Site::new(0, 19, 1)]];
        let singles = vec![vec![
            Op::global(OpKind::RY, 2, vec![FRAC_PI_2]),
            Op::gate(OpKind::T, [0], vec![]),
            Op::gate(OpKind::RZ, [1], vec![0.25]),
            Op::gate(OpKind::H, [1], vec![]),
        ]];
        let program = generator.generate(&singles, &placements, &[]).unwrap();
        assert_eq!(
            program.instructions,
            vec![
                Instruction::GlobalRy(FRAC_PI_2),
                Instruction::LocalRz(FRAC_PI_4, "atom0".into()),
                Instruction::LocalRz(0.25, "atom1".into()),
                Instruction::LocalU(FRAC_PI_2, 0.0, PI, "atom1".into()),
            ]
        );
    }

    #[test]
    fn unsupported_gate_is_fatal_without_warnings() {
        let arch = arch();
        let generator = CodeGenerator::new(
            &arch,
            CodegenConfig {
                warn_unsupported_gates: false,
                ..CodegenConfig::default()
            },
        );
        let placements = vec![vec![Site::new(0, 19, 0)]];
        let singles = vec![vec![Op::gate(OpKind::H, [0], vec![])]];
        assert!(matches!(
            generator.generate(&singles, &placements, &[]),
            Err(CodegenError::UnsupportedGate(_))
        ));
    }

    #[test]
    fn mismatched_routing_is_rejected() {
        let arch = arch();
        let generator = CodeGenerator::new(&arch, CodegenConfig::default());
        let placements = vec![
            vec![Site::new(0, 19, 0)],
            vec![Site::new(1, 0, 0)],
            vec![Site::new(0, 19, 0)],
        ];
        assert!(matches!(
            generator.generate(&[], &placements, &[]),
            Err(CodegenError::Inconsistent(_))
        ));
    }
}
