//! Bit-vector encoding of the multi-stage placement problem.
//!
//! Every stage holds per-qubit variables (site coordinates, AOD membership,
//! AOD row/column indices, in-cell offsets) plus per-line load/store flags;
//! per-gate variables fix the stage at which each entangling operation
//! fires. Stage kinds are controlled by transfer variables, either as a
//! strictly ordered vector of stage indices (fixed transfer count) or as
//! one boolean per stage.

use std::time::Duration;

use itertools::Itertools;
use z3::ast::{Ast, BV, Bool};
use z3::{Config, Context, Params, SatResult, Solver};

use crate::error::{SolverError, SolverResult};
use crate::result::{GateExec, QubitState, SolveResult, StageResult};

/// Where the storage zone sits relative to the entangling y-range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageShape {
    /// The entangling range spans the whole grid; no storage.
    None,
    /// Storage rows lie below the entangling range (greater y).
    Bottom,
    /// Storage rows lie on both sides of the entangling range.
    TwoSided,
}

/// The solver's discrete geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolverSpec {
    /// Greatest discrete x coordinate.
    pub max_x: u32,
    /// Greatest discrete y coordinate.
    pub max_y: u32,
    /// First y of the entangling range.
    pub min_entangling_y: u32,
    /// Last y of the entangling range.
    pub max_entangling_y: u32,
    /// Greatest AOD column index.
    pub max_c: u32,
    /// Greatest AOD row index.
    pub max_r: u32,
    /// Greatest absolute horizontal in-cell offset.
    pub max_h_offset: u32,
    /// Greatest absolute vertical in-cell offset.
    pub max_v_offset: u32,
    /// Greatest horizontal offset distance at which two atoms interact.
    pub max_h_dist: u32,
    /// Greatest vertical offset distance at which two atoms interact.
    pub max_v_dist: u32,
}

impl SolverSpec {
    /// Classify the storage layout, rejecting unsupported shapes.
    pub fn storage_shape(&self) -> SolverResult<StorageShape> {
        if self.min_entangling_y == 0 && self.max_entangling_y < self.max_y {
            Ok(StorageShape::Bottom)
        } else if self.min_entangling_y > 0 && self.max_entangling_y < self.max_y {
            Ok(StorageShape::TwoSided)
        } else if self.min_entangling_y == 0 && self.max_entangling_y == self.max_y {
            Ok(StorageShape::None)
        } else {
            Err(SolverError::InvalidArchitecture(
                "a one-sided storage zone is only supported below the entangling zone (greater y)"
                    .into(),
            ))
        }
    }
}

/// Minimum number of bits to represent `n` as an unsigned value.
fn bits_uint(n: u32) -> u32 {
    (32 - n.leading_zeros()).max(1)
}

/// Minimum number of bits to represent values in `[-n, n]`.
fn bits_int(n: u32) -> u32 {
    bits_uint(n) + 1
}

struct QubitVars<'ctx> {
    x: BV<'ctx>,
    y: BV<'ctx>,
    a: Bool<'ctx>,
    c: BV<'ctx>,
    r: BV<'ctx>,
    h: BV<'ctx>,
    v: BV<'ctx>,
}

struct StageVars<'ctx> {
    qubits: Vec<QubitVars<'ctx>>,
    load_cols: Vec<Bool<'ctx>>,
    load_rows: Vec<Bool<'ctx>>,
    store_cols: Vec<Bool<'ctx>>,
    store_rows: Vec<Bool<'ctx>>,
}

enum Transfers<'ctx> {
    /// Strictly ordered stage indices of the transfer stages.
    Fixed(Vec<BV<'ctx>>),
    /// One flag per stage marking it as a transfer stage.
    Free(Vec<Bool<'ctx>>),
}

struct Encoder<'ctx> {
    ctx: &'ctx Context,
    spec: SolverSpec,
    shape: StorageShape,
    num_qubits: u32,
    num_stages: u32,
    stages: Vec<StageVars<'ctx>>,
    transfers: Transfers<'ctx>,
    gates: Vec<BV<'ctx>>,
}

impl<'ctx> Encoder<'ctx> {
    fn new(
        ctx: &'ctx Context,
        spec: SolverSpec,
        shape: StorageShape,
        num_qubits: u32,
        num_stages: u32,
        num_transfers: Option<u32>,
        num_gates: usize,
    ) -> Self {
        let wx = bits_uint(spec.max_x);
        let wy = bits_uint(spec.max_y);
        let wc = bits_uint(spec.max_c);
        let wr = bits_uint(spec.max_r);
        let wh = bits_int(spec.max_h_offset);
        let wv = bits_int(spec.max_v_offset);
        let ws = bits_uint(num_stages);
        let stages = (0..num_stages)
            .map(|t| StageVars {
                qubits: (0..num_qubits)
                    .map(|q| QubitVars {
                        x: BV::new_const(ctx, format!("x{t}^{q}"), wx),
                        y: BV::new_const(ctx, format!("y{t}^{q}"), wy),
                        a: Bool::new_const(ctx, format!("a{t}^{q}")),
                        c: BV::new_const(ctx, format!("c{t}^{q}"), wc),
                        r: BV::new_const(ctx, format!("r{t}^{q}"), wr),
                        h: BV::new_const(ctx, format!("h{t}^{q}"), wh),
                        v: BV::new_const(ctx, format!("v{t}^{q}"), wv),
                    })
                    .collect(),
                load_cols: (0..=spec.max_c)
                    .map(|c| Bool::new_const(ctx, format!("load_{t}^c{c}")))
                    .collect(),
                load_rows: (0..=spec.max_r)
                    .map(|r| Bool::new_const(ctx, format!("load_{t}^r{r}")))
                    .collect(),
                store_cols: (0..=spec.max_c)
                    .map(|c| Bool::new_const(ctx, format!("store_{t}^c{c}")))
                    .collect(),
                store_rows: (0..=spec.max_r)
                    .map(|r| Bool::new_const(ctx, format!("store_{t}^r{r}")))
                    .collect(),
            })
            .collect();
        let transfers = match num_transfers {
            Some(n) => Transfers::Fixed(
                (0..n)
                    .map(|t| BV::new_const(ctx, format!("transfer_{t}"), ws))
                    .collect(),
            ),
            None => Transfers::Free(
                (0..num_stages)
                    .map(|t| Bool::new_const(ctx, format!("transfer_{t}")))
                    .collect(),
            ),
        };
        let gates = (0..num_gates)
            .map(|g| BV::new_const(ctx, format!("gate_{g}"), ws))
            .collect();
        Encoder {
            ctx,
            spec,
            shape,
            num_qubits,
            num_stages,
            stages,
            transfers,
            gates,
        }
    }

    fn stage_val(&self, t: u32) -> BV<'ctx> {
        BV::from_u64(self.ctx, u64::from(t), bits_uint(self.num_stages))
    }

    fn qubit(&self, t: u32, q: u32) -> &QubitVars<'ctx> {
        &self.stages[t as usize].qubits[q as usize]
    }

    fn and(&self, terms: &[&Bool<'ctx>]) -> Bool<'ctx> {
        Bool::and(self.ctx, terms)
    }

    /// The stage is a transfer stage.
    fn is_transfer(&self, t: u32) -> Bool<'ctx> {
        match &self.transfers {
            Transfers::Fixed(vars) => {
                let clauses: Vec<Bool> =
                    vars.iter().map(|tr| tr._eq(&self.stage_val(t))).collect();
                let refs: Vec<&Bool> = clauses.iter().collect();
                Bool::or(self.ctx, &refs)
            }
            Transfers::Free(vars) => vars[t as usize].clone(),
        }
    }

    /// The stage is a Rydberg stage.
    fn is_rydberg(&self, t: u32) -> Bool<'ctx> {
        self.is_transfer(t).not()
    }

    /// The transfer vector is strictly increasing and in range.
    fn exact_num_transfers(&self, solver: &Solver<'ctx>) {
        if let Transfers::Fixed(vars) = &self.transfers
            && !vars.is_empty()
        {
            for pair in vars.windows(2) {
                solver.assert(&pair[0].bvult(&pair[1]));
            }
            solver.assert(
                &vars[vars.len() - 1].bvult(&BV::from_u64(
                    self.ctx,
                    u64::from(self.num_stages),
                    bits_uint(self.num_stages),
                )),
            );
        }
    }

    fn same_position(&self, q0: u32, q1: u32, t: u32) -> Bool<'ctx> {
        let a = self.qubit(t, q0);
        let b = self.qubit(t, q1);
        self.and(&[&a.x._eq(&b.x), &a.y._eq(&b.y)])
    }

    fn different_position(&self, q0: u32, q1: u32, t: u32) -> Bool<'ctx> {
        self.same_position(q0, q1, t).not()
    }

    /// The qubit lies inside the entangling y-range.
    fn affected_by_beam(&self, q: u32, t: u32) -> Bool<'ctx> {
        let wy = bits_uint(self.spec.max_y);
        let y = &self.qubit(t, q).y;
        match self.shape {
            StorageShape::None => Bool::from_bool(self.ctx, true),
            StorageShape::Bottom => y.bvule(&BV::from_u64(
                self.ctx,
                u64::from(self.spec.max_entangling_y),
                wy,
            )),
            StorageShape::TwoSided => self.and(&[
                &BV::from_u64(self.ctx, u64::from(self.spec.min_entangling_y), wy).bvule(y),
                &y.bvule(&BV::from_u64(
                    self.ctx,
                    u64::from(self.spec.max_entangling_y),
                    wy,
                )),
            ]),
        }
    }

    fn shielded_from_beam(&self, q: u32, t: u32) -> Bool<'ctx> {
        self.affected_by_beam(q, t).not()
    }

    /// State validity within one stage.
    fn assert_valid_stage(&self, solver: &Solver<'ctx>, t: u32) {
        let spec = &self.spec;
        let wh = bits_int(spec.max_h_offset);
        let wv = bits_int(spec.max_v_offset);
        for i in 0..self.num_qubits {
            let q = self.qubit(t, i);
            solver.assert(&q.x.bvule(&BV::from_u64(
                self.ctx,
                u64::from(spec.max_x),
                bits_uint(spec.max_x),
            )));
            solver.assert(&q.y.bvule(&BV::from_u64(
                self.ctx,
                u64::from(spec.max_y),
                bits_uint(spec.max_y),
            )));
            solver.assert(&q.a.implies(&q.c.bvule(&BV::from_u64(
                self.ctx,
                u64::from(spec.max_c),
                bits_uint(spec.max_c),
            ))));
            solver.assert(&q.a.implies(&q.r.bvule(&BV::from_u64(
                self.ctx,
                u64::from(spec.max_r),
                bits_uint(spec.max_r),
            ))));
            let h_min = BV::from_i64(self.ctx, -i64::from(spec.max_h_offset), wh);
            let h_max = BV::from_i64(self.ctx, i64::from(spec.max_h_offset), wh);
            solver.assert(
                &q.a.implies(&self.and(&[&h_min.bvsle(&q.h), &q.h.bvsle(&h_max)])),
            );
            let v_min = BV::from_i64(self.ctx, -i64::from(spec.max_v_offset), wv);
            let v_max = BV::from_i64(self.ctx, i64::from(spec.max_v_offset), wv);
            solver.assert(
                &q.a.implies(&self.and(&[&v_min.bvsle(&q.v), &q.v.bvsle(&v_max)])),
            );
            // parked atoms have no AOD indices and no offsets
            let zeros = self.and(&[
                &q.c._eq(&BV::from_u64(self.ctx, 0, bits_uint(spec.max_c))),
                &q.r._eq(&BV::from_u64(self.ctx, 0, bits_uint(spec.max_r))),
                &q.h._eq(&BV::from_i64(self.ctx, 0, wh)),
                &q.v._eq(&BV::from_i64(self.ctx, 0, wv)),
            ]);
            solver.assert(&q.a.not().implies(&zeros));
            for j in 0..self.num_qubits {
                if i == j {
                    continue;
                }
                let p = self.qubit(t, j);
                let both_aod = self.and(&[&q.a, &p.a]);
                // AOD ordering: lexicographic site order matches index order
                let x_before = Bool::or(
                    self.ctx,
                    &[
                        &q.x.bvult(&p.x),
                        &self.and(&[&q.x._eq(&p.x), &q.h.bvslt(&p.h)]),
                    ],
                );
                solver.assert(&both_aod.implies(&x_before._eq(&q.c.bvult(&p.c))));
                let y_before = Bool::or(
                    self.ctx,
                    &[
                        &q.y.bvult(&p.y),
                        &self.and(&[&q.y._eq(&p.y), &q.v.bvslt(&p.v)]),
                    ],
                );
                solver.assert(&both_aod.implies(&y_before._eq(&q.r.bvult(&p.r))));
            }
            for j in i + 1..self.num_qubits {
                let p = self.qubit(t, j);
                // equal offsets force distinct sites
                let same_offsets = self.and(&[&q.h._eq(&p.h), &q.v._eq(&p.v)]);
                solver.assert(&same_offsets.implies(&self.different_position(i, j, t)));
            }
        }
    }

    /// Transition constraints when `t` is a Rydberg stage.
    fn assert_rydberg_transition(&self, solver: &Solver<'ctx>, t: u32) {
        let rydberg = self.is_rydberg(t);
        for i in 0..self.num_qubits {
            let now = self.qubit(t, i);
            let next = self.qubit(t + 1, i);
            solver.assert(&rydberg.implies(&now.a._eq(&next.a)));
            solver.assert(
                &self
                    .and(&[&rydberg, &now.a])
                    .implies(&self.and(&[&now.c._eq(&next.c), &now.r._eq(&next.r)])),
            );
            solver.assert(
                &self
                    .and(&[&rydberg, &now.a.not()])
                    .implies(&self.and(&[&now.x._eq(&next.x), &now.y._eq(&next.y)])),
            );
        }
        // load and store flags carry no meaning in a Rydberg stage
        let stage = &self.stages[t as usize];
        for flag in stage
            .load_cols
            .iter()
            .chain(&stage.load_rows)
            .chain(&stage.store_cols)
            .chain(&stage.store_rows)
        {
            solver.assert(&rydberg.implies(&flag.not()));
        }
    }

    /// Transition constraints when `t` is a transfer stage.
    fn assert_transfer_transition(&self, solver: &Solver<'ctx>, t: u32) {
        let transfer = self.is_transfer(t);
        let stage = &self.stages[t as usize];
        let wc = bits_uint(self.spec.max_c);
        let wr = bits_uint(self.spec.max_r);
        let wh = bits_int(self.spec.max_h_offset);
        let wv = bits_int(self.spec.max_v_offset);
        for i in 0..self.num_qubits {
            let now = self.qubit(t, i);
            let next = self.qubit(t + 1, i);
            // atoms parked after the transfer keep their site
            solver.assert(
                &self
                    .and(&[&transfer, &next.a.not()])
                    .implies(&self.and(&[&now.x._eq(&next.x), &now.y._eq(&next.y)])),
            );
            // atoms changing hands sit at zero offset
            let changes = now.a._eq(&next.a).not();
            solver.assert(&self.and(&[&transfer, &changes]).implies(&self.and(&[
                &now.h._eq(&BV::from_i64(self.ctx, 0, wh)),
                &now.v._eq(&BV::from_i64(self.ctx, 0, wv)),
            ])));
            // a load requires the atom's whole column or row to transfer
            let mut load_col = Bool::from_bool(self.ctx, true);
            for c in 0..=self.spec.max_c {
                load_col = self.and(&[
                    &load_col,
                    &now.c
                        ._eq(&BV::from_u64(self.ctx, u64::from(c), wc))
                        .implies(&stage.load_cols[c as usize]),
                ]);
            }
            let mut load_row = Bool::from_bool(self.ctx, true);
            for r in 0..=self.spec.max_r {
                load_row = self.and(&[
                    &load_row,
                    &now.r
                        ._eq(&BV::from_u64(self.ctx, u64::from(r), wr))
                        .implies(&stage.load_rows[r as usize]),
                ]);
            }
            let whole_line_loads = Bool::or(self.ctx, &[&load_col, &load_row]);
            solver.assert(
                &self
                    .and(&[&transfer, &now.a.not()])
                    .implies(&next.a._eq(&whole_line_loads)),
            );
            // a store requires the atom's whole column or row to transfer
            let mut store_col = Bool::from_bool(self.ctx, true);
            for c in 0..=self.spec.max_c {
                store_col = self.and(&[
                    &store_col,
                    &now.c
                        ._eq(&BV::from_u64(self.ctx, u64::from(c), wc))
                        .implies(&stage.store_cols[c as usize]),
                ]);
            }
            let mut store_row = Bool::from_bool(self.ctx, true);
            for r in 0..=self.spec.max_r {
                store_row = self.and(&[
                    &store_row,
                    &now.r
                        ._eq(&BV::from_u64(self.ctx, u64::from(r), wr))
                        .implies(&stage.store_rows[r as usize]),
                ]);
            }
            let whole_line_stores = Bool::or(self.ctx, &[&store_col, &store_row]);
            solver.assert(
                &self
                    .and(&[&transfer, &now.a])
                    .implies(&next.a.not()._eq(&whole_line_stores)),
            );
            // loaded atoms preserve their relative order among AOD atoms
            for j in 0..self.num_qubits {
                if i == j {
                    continue;
                }
                let now_j = self.qubit(t, j);
                let next_j = self.qubit(t + 1, j);
                let both_next_aod = self.and(&[&transfer, &next.a, &next_j.a]);
                let x_before = Bool::or(
                    self.ctx,
                    &[
                        &now.x.bvult(&now_j.x),
                        &self.and(&[&now.x._eq(&now_j.x), &now.h.bvslt(&now_j.h)]),
                    ],
                );
                solver.assert(&both_next_aod.implies(&x_before._eq(&next.c.bvult(&next_j.c))));
                let y_before = Bool::or(
                    self.ctx,
                    &[
                        &now.y.bvult(&now_j.y),
                        &self.and(&[&now.y._eq(&now_j.y), &now.v.bvslt(&now_j.v)]),
                    ],
                );
                solver.assert(&both_next_aod.implies(&y_before._eq(&next.r.bvult(&next_j.r))));
            }
        }
    }

    /// Absolute difference of two equally sized signed bit-vectors.
    fn abs_diff(&self, a: &BV<'ctx>, b: &BV<'ctx>, width: u32) -> BV<'ctx> {
        let diff = b.bvsub(a);
        let sign = diff.bvashr(&BV::from_u64(self.ctx, u64::from(width - 1), width));
        diff.bvxor(&sign).bvsub(&sign)
    }

    /// Constraints tying gate variables to Rydberg interactions.
    fn assert_circuit_execution(
        &self,
        solver: &Solver<'ctx>,
        ops: &[(u32, u32)],
        mind_ops_order: bool,
        shield_idle_atoms: bool,
    ) {
        let ws = bits_uint(self.num_stages);
        let wh = bits_int(self.spec.max_h_offset);
        let wv = bits_int(self.spec.max_v_offset);
        let mut pair_to_gates: std::collections::BTreeMap<(u32, u32), Vec<usize>> =
            std::collections::BTreeMap::new();
        let mut gates_for_qubit: Vec<Vec<usize>> = vec![Vec::new(); self.num_qubits as usize];
        for (g, &(a, b)) in ops.iter().enumerate() {
            pair_to_gates.entry((a.min(b), a.max(b))).or_default().push(g);
            gates_for_qubit[a as usize].push(g);
            gates_for_qubit[b as usize].push(g);
        }
        if mind_ops_order {
            // gates on the same qubit fire in program order
            let mut last_gate_on: Vec<Option<usize>> = vec![None; self.num_qubits as usize];
            for (g, &(a, b)) in ops.iter().enumerate() {
                for q in [a, b] {
                    if let Some(last) = last_gate_on[q as usize] {
                        solver.assert(&self.gates[last].bvult(&self.gates[g]));
                    }
                    last_gate_on[q as usize] = Some(g);
                }
            }
            let mut finals: std::collections::BTreeSet<usize> = std::collections::BTreeSet::new();
            for last in last_gate_on.into_iter().flatten() {
                finals.insert(last);
            }
            for g in finals {
                solver.assert(&self.gates[g].bvult(&BV::from_u64(
                    self.ctx,
                    u64::from(self.num_stages),
                    ws,
                )));
            }
        } else {
            for g in 0..ops.len() {
                solver.assert(&self.gates[g].bvult(&BV::from_u64(
                    self.ctx,
                    u64::from(self.num_stages),
                    ws,
                )));
            }
            // gates sharing an operand cannot share a stage
            for ((g, &(a, b)), (h, &(c, d))) in ops.iter().enumerate().tuple_combinations() {
                if a == c || a == d || b == c || b == d {
                    solver.assert(&self.gates[g]._eq(&self.gates[h]).not());
                }
            }
        }
        for t in 0..self.num_stages {
            for i in 0..self.num_qubits {
                for j in i + 1..self.num_qubits {
                    let rydberg = self.is_rydberg(t);
                    let affected = self.and(&[
                        &self.affected_by_beam(i, t),
                        &self.affected_by_beam(j, t),
                    ]);
                    if let Some(gate_ids) = pair_to_gates.get(&(i, j)) {
                        let qi = self.qubit(t, i);
                        let qj = self.qubit(t, j);
                        let abs_h = self.abs_diff(&qi.h, &qj.h, wh);
                        let abs_v = self.abs_diff(&qi.v, &qj.v, wv);
                        let close = self.and(&[
                            &abs_h.bvult(&BV::from_u64(
                                self.ctx,
                                u64::from(self.spec.max_h_dist),
                                wh,
                            )),
                            &abs_v.bvult(&BV::from_u64(
                                self.ctx,
                                u64::from(self.spec.max_v_dist),
                                wv,
                            )),
                        ]);
                        for &g in gate_ids {
                            solver.assert(&self.gates[g]._eq(&self.stage_val(t)).implies(
                                &self.and(&[
                                    &rydberg,
                                    &self.same_position(i, j, t),
                                    &affected,
                                    &close,
                                ]),
                            ));
                        }
                        // no hosted gate at this stage: distinct positions
                        let mut premises = self.and(&[&rydberg, &affected]);
                        for &g in gate_ids {
                            premises = self.and(&[
                                &premises,
                                &self.gates[g]._eq(&self.stage_val(t)).not(),
                            ]);
                        }
                        solver.assert(&premises.implies(&self.different_position(i, j, t)));
                    } else {
                        solver.assert(
                            &self
                                .and(&[&rydberg, &affected])
                                .implies(&self.different_position(i, j, t)),
                        );
                    }
                }
                if shield_idle_atoms {
                    let rydberg = self.is_rydberg(t);
                    if gates_for_qubit[i as usize].is_empty() {
                        solver.assert(&rydberg.implies(&self.shielded_from_beam(i, t)));
                    } else {
                        let mut premises = rydberg;
                        for &g in &gates_for_qubit[i as usize] {
                            premises = self.and(&[
                                &premises,
                                &self.gates[g]._eq(&self.stage_val(t)).not(),
                            ]);
                        }
                        solver.assert(&premises.implies(&self.shielded_from_beam(i, t)));
                    }
                }
            }
        }
    }

    /// Read the model back into a result document.
    fn extract(
        &self,
        model: &z3::Model<'ctx>,
        ops: &[(u32, u32)],
        num_transfers: Option<u32>,
    ) -> SolveResult {
        let eval_u32 = |bv: &BV<'ctx>| -> u32 {
            model
                .eval(bv, true)
                .and_then(|v| v.as_u64())
                .expect("model assigns every variable") as u32
        };
        let eval_signed = |bv: &BV<'ctx>, width: u32| -> i32 {
            let raw = model
                .eval(bv, true)
                .and_then(|v| v.as_u64())
                .expect("model assigns every variable");
            let sign_bit = 1u64 << (width - 1);
            if raw & sign_bit != 0 {
                (raw as i64 - (1i64 << width)) as i32
            } else {
                raw as i32
            }
        };
        let eval_bool = |b: &Bool<'ctx>| -> bool {
            model
                .eval(b, true)
                .and_then(|v| v.as_bool())
                .expect("model assigns every variable")
        };
        let wh = bits_int(self.spec.max_h_offset);
        let wv = bits_int(self.spec.max_v_offset);
        let mut n_trans = 0u32;
        let mut stages = Vec::with_capacity(self.num_stages as usize);
        for t in 0..self.num_stages {
            let rydberg = match (&self.transfers, num_transfers) {
                (Transfers::Fixed(vars), Some(total)) => {
                    let rydberg =
                        n_trans == total || eval_u32(&vars[n_trans as usize]) != t;
                    if !rydberg {
                        n_trans += 1;
                    }
                    rydberg
                }
                (Transfers::Free(vars), _) => !eval_bool(&vars[t as usize]),
                (Transfers::Fixed(_), None) => unreachable!("fixed transfers carry a count"),
            };
            let qubits = (0..self.num_qubits)
                .map(|i| {
                    let q = self.qubit(t, i);
                    QubitState {
                        x: eval_u32(&q.x),
                        y: eval_u32(&q.y),
                        a: eval_bool(&q.a),
                        c: eval_u32(&q.c),
                        r: eval_u32(&q.r),
                        h: eval_signed(&q.h, wh),
                        v: eval_signed(&q.v, wv),
                    }
                })
                .collect();
            let gates = self
                .gates
                .iter()
                .enumerate()
                .filter(|(_, g)| eval_u32(g) == t)
                .map(|(g, _)| GateExec {
                    stage: t,
                    qubits: [ops[g].0, ops[g].1],
                })
                .collect();
            stages.push(StageResult {
                rydberg,
                qubits,
                gates,
            });
        }
        SolveResult { sat: true, stages }
    }
}

/// The exact solver: builds and checks the formula for a fixed stage count.
#[derive(Debug, Clone)]
pub struct NaSolver {
    spec: SolverSpec,
}

impl NaSolver {
    /// Create a solver, validating the storage geometry.
    pub fn new(spec: SolverSpec) -> SolverResult<Self> {
        spec.storage_shape()?;
        Ok(Self { spec })
    }

    /// The solver's geometry.
    #[inline]
    pub fn spec(&self) -> &SolverSpec {
        &self.spec
    }

    /// Solve with a fresh context.
    pub fn solve(
        &self,
        ops: &[(u32, u32)],
        num_qubits: u32,
        num_stages: u32,
        num_transfers: Option<u32>,
        mind_ops_order: bool,
        shield_idle_atoms: bool,
    ) -> SolverResult<SolveResult> {
        let ctx = Context::new(&Config::new());
        self.solve_in(
            &ctx,
            None,
            ops,
            num_qubits,
            num_stages,
            num_transfers,
            mind_ops_order,
            shield_idle_atoms,
        )
    }

    /// Solve within a caller-supplied context, optionally bounding the
    /// backend's runtime. The context owner may interrupt the check through
    /// its handle; an interrupted or timed-out check reports
    /// [`SolverError::Interrupted`].
    #[allow(clippy::too_many_arguments)]
    pub fn solve_in(
        &self,
        ctx: &Context,
        timeout: Option<Duration>,
        ops: &[(u32, u32)],
        num_qubits: u32,
        num_stages: u32,
        num_transfers: Option<u32>,
        mind_ops_order: bool,
        shield_idle_atoms: bool,
    ) -> SolverResult<SolveResult> {
        let shape = self.spec.storage_shape()?;
        if shield_idle_atoms && shape == StorageShape::None {
            return Err(SolverError::NoStorageZone);
        }
        let encoder = Encoder::new(
            ctx,
            self.spec,
            shape,
            num_qubits,
            num_stages,
            num_transfers,
            ops.len(),
        );
        let solver = Solver::new_for_logic(ctx, "QF_BV")
            .expect("QF_BV is a logic supported by Z3");
        if let Some(timeout) = timeout {
            let mut params = Params::new(ctx);
            params.set_u32("timeout", timeout.as_millis().min(u128::from(u32::MAX)) as u32);
            solver.set_params(&params);
        }
        encoder.exact_num_transfers(&solver);
        encoder.assert_circuit_execution(&solver, ops, mind_ops_order, shield_idle_atoms);
        for t in 0..num_stages {
            encoder.assert_valid_stage(&solver, t);
            if t < num_stages - 1 {
                encoder.assert_rydberg_transition(&solver, t);
                encoder.assert_transfer_transition(&solver, t);
            }
        }
        match solver.check() {
            SatResult::Unsat => Ok(SolveResult::unsat()),
            SatResult::Unknown => Err(SolverError::Interrupted),
            SatResult::Sat => {
                let model = solver.get_model().expect("sat check yields a model");
                Ok(encoder.extract(&model, ops, num_transfers))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 4×8 grid, entangling rows y ∈ [2, 4], storage on both sides.
    fn two_sided_spec() -> SolverSpec {
        SolverSpec {
            max_x: 3,
            max_y: 7,
            min_entangling_y: 2,
            max_entangling_y: 4,
            max_c: 2,
            max_r: 3,
            max_h_offset: 2,
            max_v_offset: 2,
            max_h_dist: 2,
            max_v_dist: 2,
        }
    }

    #[test]
    fn storage_shapes() {
        assert_eq!(
            two_sided_spec().storage_shape().unwrap(),
            StorageShape::TwoSided
        );
        let bottom = SolverSpec {
            min_entangling_y: 0,
            max_entangling_y: 4,
            ..two_sided_spec()
        };
        assert_eq!(bottom.storage_shape().unwrap(), StorageShape::Bottom);
        let none = SolverSpec {
            min_entangling_y: 0,
            max_entangling_y: 7,
            ..two_sided_spec()
        };
        assert_eq!(none.storage_shape().unwrap(), StorageShape::None);
        let invalid = SolverSpec {
            min_entangling_y: 2,
            max_entangling_y: 7,
            ..two_sided_spec()
        };
        assert!(matches!(
            NaSolver::new(invalid),
            Err(SolverError::InvalidArchitecture(_))
        ));
    }

    #[test]
    fn shielding_requires_storage() {
        let none = SolverSpec {
            min_entangling_y: 0,
            max_entangling_y: 7,
            ..two_sided_spec()
        };
        let solver = NaSolver::new(none).unwrap();
        assert!(matches!(
            solver.solve(&[(0, 1)], 2, 1, None, false, true),
            Err(SolverError::NoStorageZone)
        ));
    }

    #[test]
    fn bit_widths() {
        assert_eq!(bits_uint(0), 1);
        assert_eq!(bits_uint(1), 1);
        assert_eq!(bits_uint(3), 2);
        assert_eq!(bits_uint(4), 3);
        assert_eq!(bits_int(2), 3);
    }

    #[test]
    fn single_gate_is_sat_in_two_stages() {
        let solver = NaSolver::new(two_sided_spec()).unwrap();
        let result = solver.solve(&[(0, 1)], 2, 2, None, false, true).unwrap();
        assert!(result.sat);
        assert_eq!(result.stages.len(), 2);
        // the gate fires in exactly one Rydberg stage with both operands
        // sharing a position inside the entangling range
        let hosted: Vec<&StageResult> = result
            .stages
            .iter()
            .filter(|s| !s.gates.is_empty())
            .collect();
        assert_eq!(hosted.len(), 1);
        let stage = hosted[0];
        assert!(stage.rydberg);
        let (a, b) = (stage.qubits[0], stage.qubits[1]);
        assert_eq!((a.x, a.y), (b.x, b.y));
        assert!(a.y >= 2 && a.y <= 4);
    }

    #[test]
    fn triangle_needs_three_stages() {
        // three gates pairwise sharing qubits require distinct stages
        let solver = NaSolver::new(two_sided_spec()).unwrap();
        let ops = [(0, 1), (1, 2), (0, 2)];
        let unsat = solver.solve(&ops, 3, 2, None, false, false).unwrap();
        assert!(!unsat.sat);
    }

    #[test]
    fn solved_gates_match_the_input_pairs() {
        let solver = NaSolver::new(two_sided_spec()).unwrap();
        let ops = [(0, 1), (2, 3)];
        let result = solver.solve(&ops, 4, 2, None, false, true).unwrap();
        assert!(result.sat);
        let mut executed: Vec<[u32; 2]> = result
            .stages
            .iter()
            .flat_map(|s| s.gates.iter().map(|g| g.qubits))
            .collect();
        executed.sort_unstable();
        assert_eq!(executed, vec![[0, 1], [2, 3]]);
    }

    #[test]
    fn idle_atoms_are_shielded() {
        let solver = NaSolver::new(two_sided_spec()).unwrap();
        let result = solver.solve(&[(0, 1)], 3, 2, None, false, true).unwrap();
        assert!(result.sat);
        for stage in result.stages.iter().filter(|s| s.rydberg) {
            let idle = stage.qubits[2];
            assert!(idle.y < 2 || idle.y > 4, "idle atom must sit outside the beam");
        }
    }

    #[test]
    fn fixed_transfer_count_is_honored() {
        let solver = NaSolver::new(two_sided_spec()).unwrap();
        let result = solver.solve(&[(0, 1)], 2, 3, Some(1), false, true).unwrap();
        assert!(result.sat);
        let transfers = result.stages.iter().filter(|s| !s.rydberg).count();
        assert_eq!(transfers, 1);
    }

    #[test]
    fn mind_ops_order_keeps_program_order() {
        let solver = NaSolver::new(two_sided_spec()).unwrap();
        let ops = [(0, 1), (1, 2)];
        let result = solver.solve(&ops, 3, 4, None, true, true).unwrap();
        assert!(result.sat);
        let stage_of = |pair: [u32; 2]| {
            result
                .stages
                .iter()
                .flat_map(|s| &s.gates)
                .find(|g| g.qubits == pair)
                .expect("gate executed")
                .stage
        };
        assert!(stage_of([0, 1]) < stage_of([1, 2]));
    }
}
