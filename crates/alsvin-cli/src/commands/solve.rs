//! Solve command implementation.

use std::fs;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use console::style;

use alsvin_arch::SiteGrid;
use alsvin_ir::Circuit;
use alsvin_smt::{BeamParameters, Optimizer, solver_from_grid};

/// Arguments of the solve command.
pub struct SolveArgs {
    pub grid: String,
    pub input: String,
    pub stages: Option<u32>,
    pub transfers: Option<u32>,
    pub min_entangling_y: u32,
    pub max_entangling_y: u32,
    pub aod_rows: u32,
    pub aod_cols: u32,
    pub interaction_radius: i64,
    pub min_atom_distance: i64,
    pub no_interaction_radius: i64,
    pub mind_order: bool,
    pub shield_idle: bool,
    pub min_stages: u16,
    pub max_stages: u16,
    pub timeout: u64,
    pub workers: usize,
    pub output: Option<String>,
}

/// Execute the solve command.
pub fn execute(args: SolveArgs) -> Result<()> {
    let grid_text = fs::read_to_string(&args.grid)
        .with_context(|| format!("reading grid '{}'", args.grid))?;
    let grid = SiteGrid::from_csv(&grid_text)?;

    let circuit_text = fs::read_to_string(&args.input)
        .with_context(|| format!("reading circuit '{}'", args.input))?;
    let circuit = Circuit::from_json(&circuit_text)?;
    let pairs: Vec<(u32, u32)> = circuit
        .cz_pairs()
        .into_iter()
        .map(|(a, b)| (a.0, b.0))
        .collect();
    eprintln!(
        "{} Solving {} pairs over {} sites",
        style("→").cyan().bold(),
        style(pairs.len()).green(),
        grid.sites().len()
    );

    let beam = BeamParameters {
        interaction_radius: args.interaction_radius,
        min_atom_distance: args.min_atom_distance,
        no_interaction_radius: args.no_interaction_radius,
    };
    let solver = solver_from_grid(
        &grid,
        args.min_entangling_y,
        args.max_entangling_y,
        args.aod_rows,
        args.aod_cols,
        &beam,
    )?;

    let result = match args.stages {
        Some(stages) => solver.solve(
            &pairs,
            circuit.num_qubits,
            stages,
            args.transfers,
            args.mind_order,
            args.shield_idle,
        )?,
        None => {
            let optimizer = Optimizer::new(
                Duration::from_secs(args.timeout),
                args.workers,
                args.min_stages,
                args.max_stages,
            );
            let report = optimizer.minimize(|k, ctx, budget| {
                solver.solve_in(
                    ctx,
                    Some(budget),
                    &pairs,
                    circuit.num_qubits,
                    u32::from(k),
                    args.transfers,
                    args.mind_order,
                    args.shield_idle,
                )
            })?;
            if report.timed_out {
                eprintln!(
                    "{} Wall clock ran out; the reported minimum may not be optimal",
                    style("!").yellow().bold()
                );
            }
            match report.best {
                Some((k, result)) => {
                    eprintln!(
                        "{} Minimum stage count: {}",
                        style("✓").green().bold(),
                        style(k).green()
                    );
                    result
                }
                None => bail!("no satisfiable stage count in the probed range"),
            }
        }
    };

    let document = result.to_json();
    match &args.output {
        Some(path) => {
            fs::write(path, document).with_context(|| format!("writing output '{path}'"))?;
            eprintln!("  Written to {}", style(path).green());
        }
        None => println!("{document}"),
    }
    Ok(())
}
