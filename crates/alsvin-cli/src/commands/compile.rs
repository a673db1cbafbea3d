//! Compile command implementation.

use anyhow::{Context, Result};
use console::style;
use std::fs;

use alsvin_arch::Architecture;
use alsvin_compile::{Compiler, CompilerConfig};
use alsvin_ir::Circuit;

/// Execute the compile command.
pub fn execute(
    arch_path: &str,
    input_path: &str,
    config_path: Option<&str>,
    output_path: Option<&str>,
) -> Result<()> {
    eprintln!(
        "{} Compiling {} for {}",
        style("→").cyan().bold(),
        style(input_path).green(),
        style(arch_path).yellow()
    );

    let arch_text = fs::read_to_string(arch_path)
        .with_context(|| format!("reading architecture '{arch_path}'"))?;
    let architecture = Architecture::from_json(&arch_text)?;

    let circuit_text =
        fs::read_to_string(input_path).with_context(|| format!("reading circuit '{input_path}'"))?;
    let circuit = Circuit::from_json(&circuit_text)?;
    eprintln!(
        "  Loaded: {} qubits, {} operations",
        circuit.num_qubits,
        circuit.ops.len()
    );

    let config = match config_path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading configuration '{path}'"))?;
            CompilerConfig::from_json(&text)?
        }
        None => CompilerConfig::default(),
    };

    let program = Compiler::new(&architecture, config).compile(&circuit)?;
    eprintln!(
        "{} Compilation complete: {} atoms, {} instructions",
        style("✓").green().bold(),
        program.atoms.len(),
        program.instructions.len()
    );

    match output_path {
        Some(path) => {
            fs::write(path, program.to_string())
                .with_context(|| format!("writing output '{path}'"))?;
            eprintln!("  Written to {}", style(path).green());
        }
        None => print!("{program}"),
    }
    Ok(())
}
