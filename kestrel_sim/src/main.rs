// kestrel_sim/src/main.rs

//! Runs one scenario, or every scenario in a directory, and prints how the
//! estimate compares to the truth.
//!
//! `cargo run -p kestrel_sim -- --scenario assets/scenarios/02_drive_gps.toml`

use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

use kestrel_sim::cli::Cli;
use kestrel_sim::simulation::config::{discover_scenarios, load_scenario};
use kestrel_sim::simulation::runner::{RunSummary, ScenarioRunner};
use kestrel_sim::SimError;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // A good filter for focusing on our crates' logs; RUST_LOG takes precedence.
    let default_filter = if cli.verbose {
        "info,kestrel_core=debug,kestrel_sim=debug"
    } else {
        "warn,kestrel_sim=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let paths: Vec<PathBuf> = match &cli.all {
        Some(dir) => discover_scenarios(dir),
        None => vec![cli.scenario.clone()],
    };
    if paths.is_empty() {
        error!("No scenarios to run");
        return ExitCode::FAILURE;
    }

    let mut failed = 0;
    for path in &paths {
        match run_scenario(path, cli.dump_config) {
            Ok(summary) => println!("{}\n", summary),
            Err(e) => {
                error!("{}: {}", path.display(), e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        error!("{} of {} scenarios failed", failed, paths.len());
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run_scenario(path: &Path, dump_config: bool) -> Result<RunSummary, SimError> {
    let config = load_scenario(path)?;
    if dump_config {
        match toml::to_string_pretty(&config) {
            Ok(text) => println!("# {}\n{}", path.display(), text),
            Err(e) => error!("Cannot print scenario {}: {}", path.display(), e),
        }
    }
    ScenarioRunner::new(config)?.run()
}
