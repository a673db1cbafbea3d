//! Alsvin Command-Line Interface
//!
//! Entry point for the `alsvin` tool: compiles circuits for zoned
//! neutral-atom architectures, either through the heuristic A\* pipeline
//! (`compile`) or through the exact SMT solver and its parallel optimizer
//! (`solve`).

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{compile, solve};

/// Alsvin - placement-and-routing compiler for neutral-atom hardware
#[derive(Parser)]
#[command(name = "alsvin")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a circuit with the heuristic A* pipeline
    Compile {
        /// Architecture description (JSON)
        #[arg(short, long)]
        arch: String,

        /// Input circuit (JSON)
        #[arg(short, long)]
        input: String,

        /// Placer/code-generator configuration (JSON)
        #[arg(short, long)]
        config: Option<String>,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Solve a circuit exactly with the SMT backend
    Solve {
        /// Site grid enumeration (CSV with an x,y header)
        #[arg(short, long)]
        grid: String,

        /// Input circuit (JSON); its one-control Z pairs are solved
        #[arg(short, long)]
        input: String,

        /// Number of stages; when omitted, the optimizer searches for the
        /// minimum between --min-stages and --max-stages
        #[arg(short, long)]
        stages: Option<u32>,

        /// Exact number of transfer stages
        #[arg(short, long)]
        transfers: Option<u32>,

        /// First y of the entangling range
        #[arg(long, default_value_t = 0)]
        min_entangling_y: u32,

        /// Last y of the entangling range
        #[arg(long)]
        max_entangling_y: u32,

        /// AOD rows
        #[arg(long, default_value_t = 4)]
        aod_rows: u32,

        /// AOD columns
        #[arg(long, default_value_t = 4)]
        aod_cols: u32,

        /// Rydberg interaction radius
        #[arg(long, default_value_t = 2)]
        interaction_radius: i64,

        /// Minimum atom distance
        #[arg(long, default_value_t = 1)]
        min_atom_distance: i64,

        /// No-interaction radius
        #[arg(long, default_value_t = 5)]
        no_interaction_radius: i64,

        /// Enforce program order between gates on the same qubit
        #[arg(long)]
        mind_order: bool,

        /// Keep idle atoms outside the entangling range
        #[arg(long)]
        shield_idle: bool,

        /// Smallest stage count probed by the optimizer
        #[arg(long, default_value_t = 1)]
        min_stages: u16,

        /// Greatest stage count probed by the optimizer
        #[arg(long, default_value_t = 16)]
        max_stages: u16,

        /// Optimizer wall-clock timeout in seconds
        #[arg(long, default_value_t = 300)]
        timeout: u64,

        /// Maximum number of concurrent solver workers
        #[arg(long, default_value_t = 4)]
        workers: usize,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Compile {
            arch,
            input,
            config,
            output,
        } => compile::execute(&arch, &input, config.as_deref(), output.as_deref()),
        Commands::Solve {
            grid,
            input,
            stages,
            transfers,
            min_entangling_y,
            max_entangling_y,
            aod_rows,
            aod_cols,
            interaction_radius,
            min_atom_distance,
            no_interaction_radius,
            mind_order,
            shield_idle,
            min_stages,
            max_stages,
            timeout,
            workers,
            output,
        } => solve::execute(solve::SolveArgs {
            grid,
            input,
            stages,
            transfers,
            min_entangling_y,
            max_entangling_y,
            aod_rows,
            aod_cols,
            interaction_radius,
            min_atom_distance,
            no_interaction_radius,
            mind_order,
            shield_idle,
            min_stages,
            max_stages,
            timeout,
            workers,
            output,
        }),
    }
}
