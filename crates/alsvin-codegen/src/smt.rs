//! Code generation from an exact-solver solution.
//!
//! The solved schedule fixes every atom's discrete position per stage; this
//! module maps those positions back to physical coordinates, derives the
//! load/move/store stream between stages, and cross-checks every solved
//! gate against the input circuit's executable set.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use alsvin_ir::{Circuit, Layer, OpKind, QubitId};
use alsvin_smt::{QubitState, SolveResult};

use crate::error::{CodegenError, CodegenResult};
use crate::program::{AtomDecl, Instruction, MoveTarget, Program};

/// Physical interpretation of the solver's discrete grid.
#[derive(Debug, Clone, Copy)]
pub struct SolutionGeometry {
    /// First y of the entangling range.
    pub min_entangling_y: u32,
    /// Last y of the entangling range.
    pub max_entangling_y: u32,
    /// Greatest absolute horizontal in-cell offset.
    pub max_h_offset: u32,
    /// Greatest absolute vertical in-cell offset.
    pub max_v_offset: u32,
    /// Minimum distance between trapped atoms.
    pub min_atom_distance: i64,
    /// Radius below which parked atoms would disturb each other.
    pub no_interaction_radius: i64,
    /// Physical gap between the storage and entangling zones.
    pub zone_distance: i64,
}

impl SolutionGeometry {
    /// Physical coordinates of a solved qubit state.
    ///
    /// Rows beyond a zone boundary are shifted by the zone distance so that
    /// storage and entangling rows do not blend into each other.
    pub fn coordinate(&self, q: &QubitState) -> (f64, f64) {
        let dx = self.no_interaction_radius
            + 2 * i64::from(self.max_h_offset) * self.min_atom_distance;
        let dy = self.no_interaction_radius
            + 2 * i64::from(self.max_v_offset) * self.min_atom_distance;
        let x = i64::from(q.x) * dx + i64::from(q.h) * self.min_atom_distance;
        let y = i64::from(q.y);
        let offset = i64::from(q.v) * self.min_atom_distance;
        let physical_y = if self.min_entangling_y == 0 {
            // no storage zone above the entangling range
            if q.y <= self.max_entangling_y {
                y * dy + offset
            } else {
                self.zone_distance + (y - 1) * dy + offset
            }
        } else if q.y < self.min_entangling_y {
            y * dy + offset
        } else if q.y <= self.max_entangling_y {
            self.zone_distance + (y - 1) * dy + offset
        } else {
            2 * self.zone_distance + (y - 2) * dy + offset
        };
        (x as f64, physical_y as f64)
    }
}

/// Find and fire the executable CZ vertex matching a solved gate.
fn execute_matching_cz(layer: &mut Layer, pair: [u32; 2]) -> CodegenResult<()> {
    let wanted = {
        let mut qs = vec![QubitId(pair[0]), QubitId(pair[1])];
        qs.sort_unstable();
        qs
    };
    let vertex = layer
        .executable_set()
        .iter()
        .copied()
        .find(|&v| {
            let op = layer.op(v);
            op.kind() == OpKind::Z && op.num_controls() == 1 && op.used_qubits() == wanted
        })
        .ok_or_else(|| {
            CodegenError::SolutionMismatch(format!(
                "gate on qubits ({}, {}) has no executable counterpart in the circuit",
                pair[0], pair[1]
            ))
        })?;
    layer.execute(vertex)?;
    Ok(())
}

/// Generate the instruction stream realizing a solved schedule for a
/// circuit of Hadamards and CZs (the solver's input form).
pub fn generate_from_solution(
    circuit: &Circuit,
    result: &SolveResult,
    geometry: &SolutionGeometry,
) -> CodegenResult<Program> {
    if !result.sat || result.stages.is_empty() {
        return Err(CodegenError::SolutionMismatch(
            "cannot generate code from an unsatisfiable result".into(),
        ));
    }
    let mut layer = Layer::new(circuit)?;
    let mut program = Program::default();
    let cz_zone = "zone_cz0".to_string();
    let first = &result.stages[0];
    let mut was_aod: Vec<bool> = Vec::with_capacity(first.qubits.len());
    let mut initial_load: Vec<String> = Vec::new();
    for (index, q) in first.qubits.iter().enumerate() {
        let (x, y) = geometry.coordinate(q);
        let name = format!("atom{index}");
        was_aod.push(q.a);
        if q.a {
            initial_load.push(name.clone());
        }
        program.atoms.push(AtomDecl { name, x, y });
    }
    if !initial_load.is_empty() {
        program.instructions.push(Instruction::Load(initial_load));
    }
    // the solver input assumes all atoms prepared in |+⟩: consume one
    // Hadamard per qubit as a global RY(π/2)
    let hadamards = layer.executables_of_kind(OpKind::H, 0);
    let mut prepared: Vec<QubitId> = hadamards
        .iter()
        .map(|&v| layer.op(v).targets()[0])
        .collect();
    prepared.sort_unstable();
    prepared.dedup();
    if prepared.len() != circuit.num_qubits as usize || hadamards.len() != prepared.len() {
        return Err(CodegenError::SolutionMismatch(
            "not all atoms are initialized to the plus state".into(),
        ));
    }
    program.instructions.push(Instruction::GlobalRy(FRAC_PI_2));
    layer.execute_all(hadamards)?;

    if first.rydberg {
        program.instructions.push(Instruction::GlobalCz(cz_zone.clone()));
        for gate in &first.gates {
            execute_matching_cz(&mut layer, gate.qubits)?;
        }
    }
    for stage in &result.stages[1..] {
        let mut store_atoms: Vec<String> = Vec::new();
        let mut load_atoms: Vec<String> = Vec::new();
        let mut moves: Vec<MoveTarget> = Vec::new();
        for (index, q) in stage.qubits.iter().enumerate() {
            let name = format!("atom{index}");
            let (x, y) = geometry.coordinate(q);
            match (was_aod[index], q.a) {
                (true, true) => moves.push(MoveTarget { x, y, atom: name }),
                (true, false) => store_atoms.push(name),
                (false, true) => {
                    load_atoms.push(name.clone());
                    moves.push(MoveTarget { x, y, atom: name });
                }
                (false, false) => {}
            }
            was_aod[index] = q.a;
        }
        if !store_atoms.is_empty() {
            program.instructions.push(Instruction::Store(store_atoms));
        }
        if !load_atoms.is_empty() {
            program.instructions.push(Instruction::Load(load_atoms));
        }
        if !moves.is_empty() {
            program.instructions.push(Instruction::Move(moves));
        }
        if stage.rydberg {
            program.instructions.push(Instruction::GlobalCz(cz_zone.clone()));
        }
        for gate in &stage.gates {
            execute_matching_cz(&mut layer, gate.qubits)?;
        }
    }
    // trailing Hadamards lower to the RY(−π/4)·RZ(π)·RY(π/4) sandwich
    if !layer.is_drained() {
        program.instructions.push(Instruction::GlobalRy(-FRAC_PI_4));
        while let Some(&vertex) = layer.executable_set().iter().next() {
            let op = layer.op(vertex);
            if op.kind() != OpKind::H {
                return Err(CodegenError::SolutionMismatch(format!(
                    "unexecuted non-CZ gate '{}' remains after the last stage",
                    op.kind()
                )));
            }
            let qubit = op.targets()[0];
            program
                .instructions
                .push(Instruction::LocalRz(PI, format!("atom{}", qubit.0)));
            layer.execute(vertex)?;
        }
        program.instructions.push(Instruction::GlobalRy(FRAC_PI_4));
    }
    Ok(program)
}
