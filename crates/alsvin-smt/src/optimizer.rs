//! Parallel minimization of the stage or transfer count.
//!
//! The optimizer probes candidate values `k` with concurrent workers, each
//! solving in its own context. It scans upward from an initial value with
//! per-worker budgets that grow tenfold per full pass; once a satisfiable
//! `k` is found it sweeps downward to refine, eagerly interrupting workers
//! whose `k` can no longer improve the result. An interrupted or timed-out
//! check counts as neither SAT nor UNSAT. Exceeding the wall clock returns
//! the last-found SAT best-effort, or [`SolverError::Timeout`] when there
//! is none.

use std::sync::mpsc;
use std::time::{Duration, Instant};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};
use z3::{Config, Context};

use crate::error::{SolverError, SolverResult};
use crate::result::SolveResult;

/// Outcome of a minimization run.
///
/// When the wall clock runs out after a satisfiable value was found, the
/// last-found SAT is returned best-effort with `timed_out` set; running
/// out without any SAT is a [`SolverError::Timeout`] instead.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerReport {
    /// The smallest satisfiable value and its model, if any was found.
    pub best: Option<(u16, SolveResult)>,
    /// The smallest value that reported SAT.
    pub min_sat: Option<u16>,
    /// The greatest value that reported UNSAT.
    pub max_unsat: Option<u16>,
    /// Whether the wall-clock budget ran out before the sweep finished.
    pub timed_out: bool,
}

/// The parallel optimizer.
#[derive(Debug, Clone)]
pub struct Optimizer {
    /// Wall-clock budget for the whole minimization.
    pub timeout: Duration,
    /// Maximum number of concurrently running workers.
    pub max_workers: usize,
    /// First candidate value of the upward scan.
    pub initial_value: u16,
    /// Greatest candidate value.
    pub max_value: u16,
}

impl Optimizer {
    /// Create an optimizer for the inclusive range
    /// `[initial_value, max_value]`.
    pub fn new(timeout: Duration, max_workers: usize, initial_value: u16, max_value: u16) -> Self {
        Self {
            timeout,
            max_workers: max_workers.max(1),
            initial_value,
            max_value,
        }
    }

    /// Find the minimum `k` for which the objective is satisfiable.
    ///
    /// The objective runs inside worker threads, each with a dedicated
    /// context whose handle the optimizer uses for cancellation; it must
    /// honor the passed per-call budget (see
    /// [`NaSolver::solve_in`](crate::solver::NaSolver::solve_in)).
    pub fn minimize<F>(&self, objective: F) -> SolverResult<OptimizerReport>
    where
        F: Fn(u16, &Context, Duration) -> SolverResult<SolveResult> + Sync,
    {
        if self.initial_value > self.max_value {
            return Err(SolverError::InvalidArchitecture(
                "optimizer range is empty".into(),
            ));
        }
        let start = Instant::now();
        let span = usize::from(self.max_value - self.initial_value) + 1;
        let contexts: Vec<Context> = (0..span).map(|_| Context::new(&Config::new())).collect();
        let handles: Vec<z3::ContextHandle<'_>> = contexts.iter().map(|c| c.handle()).collect();
        let index = |k: u16| usize::from(k - self.initial_value);

        let mut report = OptimizerReport {
            best: None,
            min_sat: None,
            max_unsat: None,
            timed_out: false,
        };
        let mut failure: Option<SolverError> = None;

        std::thread::scope(|scope| {
            let (tx, rx) = mpsc::channel::<(u16, SolverResult<SolveResult>)>();
            let mut active: FxHashSet<u16> = FxHashSet::default();
            // ks that resolved definitively; re-probing them is pointless
            let mut resolved: FxHashMap<u16, bool> = FxHashMap::default();

            let remaining = |start: Instant, timeout: Duration| {
                timeout.checked_sub(start.elapsed()).unwrap_or_default()
            };

            let mut reap = |active: &mut FxHashSet<u16>,
                            report: &mut OptimizerReport,
                            resolved: &mut FxHashMap<u16, bool>,
                            failure: &mut Option<SolverError>| {
                let Ok((k, outcome)) = rx.recv() else {
                    return;
                };
                active.remove(&k);
                match outcome {
                    Ok(result) if result.sat => {
                        debug!(k, "sat");
                        resolved.insert(k, true);
                        if report.min_sat.is_none_or(|m| k < m) {
                            report.min_sat = Some(k);
                            report.best = Some((k, result));
                        }
                        let min_sat = report.min_sat.expect("just set");
                        for &other in active.iter() {
                            if other > min_sat {
                                debug!(k = other, "interrupting uninteresting worker");
                                handles[index(other)].interrupt();
                            }
                        }
                    }
                    Ok(_) => {
                        debug!(k, "unsat");
                        resolved.insert(k, false);
                        if report.max_unsat.is_none_or(|m| k > m) {
                            report.max_unsat = Some(k);
                        }
                        let max_unsat = report.max_unsat.expect("just set");
                        for &other in active.iter() {
                            if other < max_unsat {
                                debug!(k = other, "interrupting uninteresting worker");
                                handles[index(other)].interrupt();
                            }
                        }
                    }
                    Err(SolverError::Interrupted) => {
                        debug!(k, "worker gave up (timeout or interrupt)");
                    }
                    Err(error) => {
                        warn!(k, %error, "worker failed");
                        if failure.is_none() {
                            *failure = Some(SolverError::WorkerFailure {
                                k,
                                message: error.to_string(),
                            });
                        }
                        for &other in active.iter() {
                            handles[index(other)].interrupt();
                        }
                    }
                }
            };

            // Upward scan: ramp per-worker budgets ×10 per pass so cheap
            // passes resolve the easy values first.
            let mut per_call = Duration::from_secs(10);
            'scan: while report.min_sat.is_none() && failure.is_none() {
                let mut k = report.max_unsat.unwrap_or(self.initial_value);
                while report.min_sat.is_none() && failure.is_none() && k <= self.max_value {
                    let left = remaining(start, self.timeout);
                    if left.is_zero() {
                        report.timed_out = true;
                        break 'scan;
                    }
                    if resolved.contains_key(&k) {
                        k += 1;
                        continue;
                    }
                    while active.contains(&k) {
                        // this k is still busy from the previous pass
                        reap(&mut active, &mut report, &mut resolved, &mut failure);
                        if report.min_sat.is_some() || failure.is_some() {
                            continue 'scan;
                        }
                    }
                    let budget = per_call.min(left);
                    let ctx = &contexts[index(k)];
                    let tx = tx.clone();
                    let objective = &objective;
                    active.insert(k);
                    scope.spawn(move || {
                        let outcome = objective(k, ctx, budget);
                        let _ = tx.send((k, outcome));
                    });
                    if active.len() == self.max_workers {
                        reap(&mut active, &mut report, &mut resolved, &mut failure);
                    }
                    k += 1;
                }
                if report.max_unsat == Some(self.max_value) {
                    // the whole range is unsatisfiable
                    break;
                }
                if report.min_sat.is_none() && failure.is_none() && active.is_empty() {
                    // everything pending resolved; next pass with a larger
                    // per-worker budget retries the undecided values
                    let undecided = (self.initial_value..=self.max_value)
                        .any(|k| !resolved.contains_key(&k));
                    if !undecided {
                        break;
                    }
                }
                per_call = per_call.saturating_mul(10);
            }
            while !active.is_empty() {
                reap(&mut active, &mut report, &mut resolved, &mut failure);
            }

            // Downward sweep from just below the first satisfiable value.
            if let Some(min_sat) = report.min_sat
                && failure.is_none()
                && !report.timed_out
            {
                let mut k = min_sat;
                while k > 0
                    && k - 1 > report.max_unsat.unwrap_or(self.initial_value)
                    && failure.is_none()
                {
                    k -= 1;
                    if k >= report.min_sat.expect("sweep runs after a sat")
                        || resolved.contains_key(&k)
                    {
                        continue;
                    }
                    let left = remaining(start, self.timeout);
                    if left.is_zero() {
                        report.timed_out = true;
                        break;
                    }
                    let ctx = &contexts[index(k)];
                    let tx = tx.clone();
                    let objective = &objective;
                    active.insert(k);
                    scope.spawn(move || {
                        let outcome = objective(k, ctx, left);
                        let _ = tx.send((k, outcome));
                    });
                    if active.len() == self.max_workers {
                        reap(&mut active, &mut report, &mut resolved, &mut failure);
                    }
                }
                while !active.is_empty() {
                    reap(&mut active, &mut report, &mut resolved, &mut failure);
                }
            }
        });
        if let Some(error) = failure {
            return Err(error);
        }
        if report.best.is_none() && report.timed_out {
            return Err(SolverError::Timeout);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::SolveResult;

    fn fake_result() -> SolveResult {
        SolveResult {
            sat: true,
            stages: Vec::new(),
        }
    }

    #[test]
    fn finds_the_minimum_sat_value() {
        let optimizer = Optimizer::new(Duration::from_secs(60), 3, 1, 12);
        let report = optimizer
            .minimize(|k, _ctx, _budget| {
                if k >= 5 {
                    Ok(fake_result())
                } else {
                    Ok(SolveResult::unsat())
                }
            })
            .unwrap();
        assert_eq!(report.min_sat, Some(5));
        assert_eq!(report.best.as_ref().map(|(k, _)| *k), Some(5));
        assert_eq!(report.max_unsat, Some(4));
        assert!(!report.timed_out);
    }

    #[test]
    fn fully_unsat_range_reports_no_result() {
        let optimizer = Optimizer::new(Duration::from_secs(60), 2, 0, 4);
        let report = optimizer
            .minimize(|_k, _ctx, _budget| Ok(SolveResult::unsat()))
            .unwrap();
        assert_eq!(report.min_sat, None);
        assert!(report.best.is_none());
        assert_eq!(report.max_unsat, Some(4));
    }

    #[test]
    fn monotone_verdicts_bracket_the_minimum() {
        let optimizer = Optimizer::new(Duration::from_secs(60), 4, 0, 20);
        let report = optimizer
            .minimize(|k, _ctx, _budget| {
                if k >= 13 {
                    Ok(fake_result())
                } else {
                    Ok(SolveResult::unsat())
                }
            })
            .unwrap();
        assert_eq!(report.min_sat, Some(13));
        let max_unsat = report.max_unsat.unwrap();
        assert!(max_unsat < 13);
    }

    #[test]
    fn exhausted_wall_clock_without_a_sat_is_a_timeout() {
        let optimizer = Optimizer::new(Duration::ZERO, 2, 0, 8);
        let outcome = optimizer.minimize(|_k, _ctx, _budget| Ok(fake_result()));
        assert!(matches!(outcome, Err(SolverError::Timeout)));
    }

    #[test]
    fn worker_failure_aborts() {
        let optimizer = Optimizer::new(Duration::from_secs(60), 2, 0, 3);
        let outcome = optimizer.minimize(|_k, _ctx, _budget| {
            Err(SolverError::InvalidArchitecture("broken objective".into()))
        });
        assert!(matches!(
            outcome,
            Err(SolverError::WorkerFailure { .. })
        ));
    }

    #[test]
    fn undecided_values_do_not_count_as_verdicts() {
        // k = 2 never answers; the minimum must still be found at 3
        let optimizer = Optimizer::new(Duration::from_secs(60), 2, 1, 6);
        let report = optimizer
            .minimize(|k, _ctx, _budget| {
                if k == 2 {
                    Err(SolverError::Interrupted)
                } else if k >= 3 {
                    Ok(fake_result())
                } else {
                    Ok(SolveResult::unsat())
                }
            })
            .unwrap();
        assert_eq!(report.min_sat, Some(3));
        assert_eq!(report.max_unsat, Some(1));
    }
}
