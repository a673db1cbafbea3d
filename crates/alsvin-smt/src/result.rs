//! The solver's result document.
//!
//! The document round-trips through JSON: a top-level `sat` flag and, when
//! satisfiable, one entry per stage with the stage kind, every qubit's
//! variables, and the gates firing in that stage.

use serde::{Deserialize, Serialize};

use crate::error::{SolverError, SolverResult};

/// The state of one qubit in one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QubitState {
    /// Discrete x coordinate of the site.
    pub x: u32,
    /// Discrete y coordinate of the site.
    pub y: u32,
    /// Whether the atom is held by the AOD (else by the SLM).
    pub a: bool,
    /// AOD column index, meaningful only when `a` is set.
    pub c: u32,
    /// AOD row index, meaningful only when `a` is set.
    pub r: u32,
    /// Signed horizontal offset within the site cell.
    pub h: i32,
    /// Signed vertical offset within the site cell.
    pub v: i32,
}

/// One gate execution extracted from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateExec {
    /// The stage at which the gate fires.
    pub stage: u32,
    /// The two operands.
    pub qubits: [u32; 2],
}

/// One stage of the solved schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    /// Whether the stage is a Rydberg stage (else a transfer stage).
    pub rydberg: bool,
    /// Per-qubit state.
    pub qubits: Vec<QubitState>,
    /// Gates firing in this stage.
    pub gates: Vec<GateExec>,
}

/// The complete outcome of one solver call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolveResult {
    /// Whether the formula was satisfiable.
    pub sat: bool,
    /// The stages of the model; empty when unsatisfiable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<StageResult>,
}

impl SolveResult {
    /// The unsatisfiable outcome.
    pub fn unsat() -> Self {
        Self {
            sat: false,
            stages: Vec::new(),
        }
    }

    /// Serialize the document to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("result document serialization cannot fail")
    }

    /// Parse a document from JSON.
    pub fn from_json(input: &str) -> SolverResult<Self> {
        serde_json::from_str(input).map_err(|e| SolverError::MalformedResult(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip() {
        let result = SolveResult {
            sat: true,
            stages: vec![
                StageResult {
                    rydberg: true,
                    qubits: vec![
                        QubitState {
                            x: 1,
                            y: 2,
                            a: true,
                            c: 0,
                            r: 1,
                            h: -1,
                            v: 2,
                        },
                        QubitState {
                            x: 1,
                            y: 2,
                            a: false,
                            c: 0,
                            r: 0,
                            h: 0,
                            v: 0,
                        },
                    ],
                    gates: vec![GateExec {
                        stage: 0,
                        qubits: [0, 1],
                    }],
                },
                StageResult {
                    rydberg: false,
                    qubits: vec![],
                    gates: vec![],
                },
            ],
        };
        let parsed = SolveResult::from_json(&result.to_json()).unwrap();
        assert_eq!(parsed, result);
    }

    #[test]
    fn unsat_round_trip() {
        let parsed = SolveResult::from_json(&SolveResult::unsat().to_json()).unwrap();
        assert_eq!(parsed, SolveResult::unsat());
        assert!(parsed.stages.is_empty());
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(matches!(
            SolveResult::from_json("{\"stages\": 3}"),
            Err(SolverError::MalformedResult(_))
        ));
    }
}
