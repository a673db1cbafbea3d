//! The pipeline driver: schedule → place → route → assemble.

use serde_json::Value;
use tracing::{debug, warn};

use alsvin_arch::Architecture;
use alsvin_codegen::{CodeGenerator, CodegenConfig, Program};
use alsvin_ir::Circuit;
use alsvin_place::{AStarPlacer, IndependentSetRouter, PlacerConfig};

use crate::error::{CompileError, CompileResult};
use crate::scheduler::schedule;

const PLACER_KEYS: [&str; 8] = [
    "use_window",
    "window_min_width",
    "window_ratio",
    "window_share",
    "deepening_factor",
    "deepening_value",
    "lookahead_factor",
    "reuse_level",
];

const CODEGEN_KEYS: [&str; 2] = ["parking_offset", "warn_unsupported_gates"];

/// The combined configuration file of the heuristic pipeline.
///
/// One flat JSON object carries both the placer and the code-generator
/// keys; unknown keys warn, missing keys default silently.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompilerConfig {
    /// Placer tuning.
    pub placer: PlacerConfig,
    /// Code-assembly tuning.
    pub codegen: CodegenConfig,
}

impl CompilerConfig {
    /// Parse the flat configuration format.
    pub fn from_json(input: &str) -> CompileResult<Self> {
        let value: Value = serde_json::from_str(input)
            .map_err(|e| CompileError::Config(format!("malformed JSON: {e}")))?;
        let Value::Object(map) = value else {
            return Err(CompileError::Config(
                "the configuration must be a JSON object".into(),
            ));
        };
        let mut placer_map = serde_json::Map::new();
        let mut codegen_map = serde_json::Map::new();
        for (key, value) in map {
            if PLACER_KEYS.contains(&key.as_str()) {
                placer_map.insert(key, value);
            } else if CODEGEN_KEYS.contains(&key.as_str()) {
                codegen_map.insert(key, value);
            } else {
                warn!(key, "ignoring unknown configuration key");
            }
        }
        let placer: PlacerConfig = serde_json::from_value(Value::Object(placer_map))
            .map_err(|e| CompileError::Config(e.to_string()))?;
        let codegen: CodegenConfig = serde_json::from_value(Value::Object(codegen_map))
            .map_err(|e| CompileError::Config(e.to_string()))?;
        Ok(Self { placer, codegen })
    }
}

/// The heuristic compiler: drives the full pipeline for one circuit.
pub struct Compiler<'a> {
    architecture: &'a Architecture,
    config: CompilerConfig,
}

impl<'a> Compiler<'a> {
    /// Create a compiler for an architecture.
    pub fn new(architecture: &'a Architecture, config: CompilerConfig) -> Self {
        Self {
            architecture,
            config,
        }
    }

    /// Compile a circuit into the instruction stream.
    pub fn compile(&self, circuit: &Circuit) -> CompileResult<Program> {
        let schedule = schedule(circuit)?;
        debug!(
            layers = schedule.two_qubit_layers.len(),
            "scheduled entangling layers"
        );
        let placer = AStarPlacer::new(self.architecture, self.config.placer.clone())?;
        let placements = placer.place(
            circuit.num_qubits as usize,
            &schedule.two_qubit_layers,
            &schedule.reuse,
        )?;
        let router = IndependentSetRouter::new(self.architecture);
        let routing = router.route(&placements)?;
        debug!(
            placements = placements.len(),
            steps = routing.len(),
            "placement and routing complete"
        );
        let generator = CodeGenerator::new(self.architecture, self.config.codegen.clone());
        Ok(generator.generate(&schedule.single_qubit_layers, &placements, &routing)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alsvin_arch::Site;
    use alsvin_codegen::Instruction;
    use rustc_hash::FxHashMap;

    const ARCH: &str = r#"{
        "name": "compiler_test",
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

    /// Replay the program and collect the unordered CZ pairs executed by
    /// each global pulse, identified by atoms sitting on the two sides of
    /// one entanglement pair site.
    fn executed_pairs(arch: &Architecture, program: &Program) -> Vec<(u32, u32)> {
        let mut positions: FxHashMap<String, (f64, f64)> = program
            .atoms
            .iter()
            .map(|a| (a.name.clone(), (a.x, a.y)))
            .collect();
        let mut pairs: Vec<(u32, u32)> = Vec::new();
        for instruction in &program.instructions {
            match instruction {
                Instruction::Move(targets) => {
                    for target in targets {
                        positions.insert(target.atom.clone(), (target.x, target.y));
                    }
                }
                Instruction::GlobalCz(_) => {
                    let at = |x: i64, y: i64| -> Option<u32> {
                        positions.iter().find_map(|(name, &(px, py))| {
                            (px == x as f64 && py == y as f64).then(|| {
                                name.strip_prefix("atom")
                                    .expect("atom names are canonical")
                                    .parse::<u32>()
                                    .expect("atom names are canonical")
                            })
                        })
                    };
                    for pair in &arch.entanglement_zones {
                        let left = arch.slm(pair[0]).unwrap();
                        let right = arch.slm(pair[1]).unwrap();
                        for r in 0..left.rows {
                            for c in 0..left.cols {
                                let (lx, ly) = left.site_location(r, c);
                                let (rx, ry) = right.site_location(r, c);
                                if let (Some(a), Some(b)) = (at(lx, ly), at(rx, ry)) {
                                    pairs.push((a.min(b), a.max(b)));
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        pairs
    }

    #[test]
    fn compiled_program_executes_exactly_the_circuit_pairs() {
        let arch = arch();
        let mut circuit = Circuit::new("qaoa_ring", 6);
        for q in 0..6 {
            circuit.h(q).unwrap();
        }
        for q in 0..6u32 {
            circuit.cz(q, (q + 1) % 6).unwrap();
        }
        for q in 0..6 {
            circuit
                .push(alsvin_ir::Op::gate(alsvin_ir::OpKind::RZ, [q], vec![0.37]))
                .unwrap();
        }
        let compiler = Compiler::new(&arch, CompilerConfig::default());
        let program = compiler.compile(&circuit).unwrap();
        program.validate_shuttles().unwrap();
        let mut executed = executed_pairs(&arch, &program);
        executed.sort_unstable();
        let mut expected: Vec<(u32, u32)> = circuit
            .cz_pairs()
            .into_iter()
            .map(|(a, b)| (a.0.min(b.0), a.0.max(b.0)))
            .collect();
        expected.sort_unstable();
        assert_eq!(executed, expected);
    }

    #[test]
    fn initial_atom_declarations_match_the_initial_placement() {
        let arch = arch();
        let mut circuit = Circuit::new("two", 2);
        circuit.cz(0, 1).unwrap();
        let compiler = Compiler::new(&arch, CompilerConfig::default());
        let program = compiler.compile(&circuit).unwrap();
        let (x, y) = arch.exact_location(Site::new(0, 19, 0)).unwrap();
        assert_eq!(program.atoms[0].x, x as f64);
        assert_eq!(program.atoms[0].y, y as f64);
    }

    #[test]
    fn config_parses_flat_keys_and_warns_on_unknown() {
        let config = CompilerConfig::from_json(
            r#"{
                "use_window": false,
                "parking_offset": 3,
                "not_a_key": 17
            }"#,
        )
        .unwrap();
        assert!(!config.placer.use_window);
        assert_eq!(config.codegen.parking_offset, 3);
        assert!(config.codegen.warn_unsupported_gates);
    }

    #[test]
    fn non_object_config_is_rejected() {
        assert!(matches!(
            CompilerConfig::from_json("[1, 2]"),
            Err(CompileError::Config(_))
        ));
    }
}
