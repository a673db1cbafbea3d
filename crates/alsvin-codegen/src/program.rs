//! The emitted instruction stream.
//!
//! One instruction per line: `atom (x, y) <name>` declarations first, then
//! `@+`-prefixed operations. Coordinates print with three fractional
//! digits, angles with five.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::error::{CodegenError, CodegenResult};

/// Declaration of one atom with its initial position.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomDecl {
    /// Atom name, referenced by later instructions.
    pub name: String,
    /// Initial x coordinate.
    pub x: f64,
    /// Initial y coordinate.
    pub y: f64,
}

/// One entry of a move: the target position of a named atom.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveTarget {
    /// Target x coordinate.
    pub x: f64,
    /// Target y coordinate.
    pub y: f64,
    /// The atom to move.
    pub atom: String,
}

/// One emitted instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Transfer atoms from their SLM sites into the AOD.
    Load(Vec<String>),
    /// Transfer atoms from the AOD into SLM sites.
    Store(Vec<String>),
    /// Move AOD-held atoms to new positions.
    Move(Vec<MoveTarget>),
    /// Global entangling pulse over a zone.
    GlobalCz(String),
    /// Global Y rotation.
    GlobalRy(f64),
    /// Local Z rotation on one atom.
    LocalRz(f64, String),
    /// Local U(θ, φ, λ) on one atom.
    LocalU(f64, f64, f64, String),
}

/// A complete emitted program.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    /// Atom declarations with initial positions.
    pub atoms: Vec<AtomDecl>,
    /// Instructions in execution order.
    pub instructions: Vec<Instruction>,
}

fn coord(value: f64) -> String {
    format!("{value:.3}")
}

fn angle(value: f64) -> String {
    format!("{value:.5}")
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Load(atoms) => write!(f, "@+ load [{}]", atoms.join(", ")),
            Instruction::Store(atoms) => write!(f, "@+ store [{}]", atoms.join(", ")),
            Instruction::Move(targets) => {
                let entries: Vec<String> = targets
                    .iter()
                    .map(|t| format!("({}, {}) {}", coord(t.x), coord(t.y), t.atom))
                    .collect();
                write!(f, "@+ move [{}]", entries.join(", "))
            }
            Instruction::GlobalCz(zone) => write!(f, "@+ cz {zone}"),
            Instruction::GlobalRy(theta) => write!(f, "@+ ry {} global", angle(*theta)),
            Instruction::LocalRz(theta, atom) => write!(f, "@+ rz {} {atom}", angle(*theta)),
            Instruction::LocalU(theta, phi, lambda, atom) => write!(
                f,
                "@+ u {} {} {} {atom}",
                angle(*theta),
                angle(*phi),
                angle(*lambda)
            ),
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for atom in &self.atoms {
            writeln!(f, "atom ({}, {}) {}", coord(atom.x), coord(atom.y), atom.name)?;
        }
        for instruction in &self.instructions {
            writeln!(f, "{instruction}")?;
        }
        Ok(())
    }
}

impl Program {
    /// Verify that every move preserves the pairwise AOD order of its
    /// atoms, replaying the program from the initial positions.
    pub fn validate_shuttles(&self) -> CodegenResult<()> {
        let mut positions: FxHashMap<&str, (f64, f64)> = self
            .atoms
            .iter()
            .map(|a| (a.name.as_str(), (a.x, a.y)))
            .collect();
        for (index, instruction) in self.instructions.iter().enumerate() {
            if let Instruction::Move(targets) = instruction {
                let position_of = |atom: &str| {
                    positions
                        .get(atom)
                        .copied()
                        .ok_or_else(|| CodegenError::IllegalShuttle {
                            instruction: index,
                            reason: format!("atom '{atom}' was never declared"),
                        })
                };
                for (i, a) in targets.iter().enumerate() {
                    for b in &targets[i + 1..] {
                        let sa = position_of(&a.atom)?;
                        let sb = position_of(&b.atom)?;
                        let ea = (a.x, a.y);
                        let eb = (b.x, b.y);
                        if sa == sb || ea == eb {
                            return Err(CodegenError::IllegalShuttle {
                                instruction: index,
                                reason: format!(
                                    "atoms {} and {} coincide",
                                    a.atom, b.atom
                                ),
                            });
                        }
                        for (s1, e1, s2, e2, axis) in [
                            (sa.0, ea.0, sb.0, eb.0, "column"),
                            (sa.1, ea.1, sb.1, eb.1, "row"),
                        ] {
                            let broken = match s1.partial_cmp(&s2).expect("finite coordinates") {
                                std::cmp::Ordering::Equal => e1 != e2,
                                std::cmp::Ordering::Less => e1 >= e2,
                                std::cmp::Ordering::Greater => e1 <= e2,
                            };
                            if broken {
                                return Err(CodegenError::IllegalShuttle {
                                    instruction: index,
                                    reason: format!(
                                        "{axis} order of {} and {} not preserved",
                                        a.atom, b.atom
                                    ),
                                });
                            }
                        }
                    }
                }
                for target in targets {
                    positions.insert(target.atom.as_str(), (target.x, target.y));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatting_matches_the_grammar() {
        let program = Program {
            atoms: vec![
                AtomDecl {
                    name: "atom0".into(),
                    x: 0.0,
                    y: 57.0,
                },
                AtomDecl {
                    name: "atom1".into(),
                    x: 3.0,
                    y: 57.0,
                },
            ],
            instructions: vec![
                Instruction::Load(vec!["atom0".into(), "atom1".into()]),
                Instruction::Move(vec![
                    MoveTarget {
                        x: 5.0,
                        y: 70.0,
                        atom: "atom0".into(),
                    },
                    MoveTarget {
                        x: 7.0,
                        y: 70.0,
                        atom: "atom1".into(),
                    },
                ]),
                Instruction::Store(vec!["atom0".into(), "atom1".into()]),
                Instruction::GlobalCz("zone_cz0".into()),
                Instruction::GlobalRy(std::f64::consts::FRAC_PI_2),
                Instruction::LocalRz(std::f64::consts::PI, "atom1".into()),
                Instruction::LocalU(std::f64::consts::FRAC_PI_2, 0.0, std::f64::consts::PI, "atom0".into()),
            ],
        };
        let text = program.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "atom (0.000, 57.000) atom0");
        assert_eq!(lines[1], "atom (3.000, 57.000) atom1");
        assert_eq!(lines[2], "@+ load [atom0, atom1]");
        assert_eq!(
            lines[3],
            "@+ move [(5.000, 70.000) atom0, (7.000, 70.000) atom1]"
        );
        assert_eq!(lines[4], "@+ store [atom0, atom1]");
        assert_eq!(lines[5], "@+ cz zone_cz0");
        assert_eq!(lines[6], "@+ ry 1.57080 global");
        assert_eq!(lines[7], "@+ rz 3.14159 atom1");
        assert_eq!(lines[8], "@+ u 1.57080 0.00000 3.14159 atom0");
    }

    #[test]
    fn order_preserving_moves_validate() {
        let program = Program {
            atoms: vec![
                AtomDecl {
                    name: "a".into(),
                    x: 0.0,
                    y: 0.0,
                },
                AtomDecl {
                    name: "b".into(),
                    x: 1.0,
                    y: 0.0,
                },
            ],
            instructions: vec![Instruction::Move(vec![
                MoveTarget {
                    x: 2.0,
                    y: 5.0,
                    atom: "a".into(),
                },
                MoveTarget {
                    x: 4.0,
                    y: 5.0,
                    atom: "b".into(),
                },
            ])],
        };
        program.validate_shuttles().unwrap();
    }

    #[test]
    fn crossing_moves_fail_validation() {
        let program = Program {
            atoms: vec![
                AtomDecl {
                    name: "a".into(),
                    x: 0.0,
                    y: 0.0,
                },
                AtomDecl {
                    name: "b".into(),
                    x: 1.0,
                    y: 0.0,
                },
            ],
            instructions: vec![Instruction::Move(vec![
                MoveTarget {
                    x: 4.0,
                    y: 5.0,
                    atom: "a".into(),
                },
                MoveTarget {
                    x: 2.0,
                    y: 5.0,
                    atom: "b".into(),
                },
            ])],
        };
        assert!(matches!(
            program.validate_shuttles(),
            Err(CodegenError::IllegalShuttle { .. })
        ));
    }
}
