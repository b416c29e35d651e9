use clap::Parser;
use std::path::PathBuf;

/// Kestrel: runs pose-estimation scenarios against synthetic sensors.
///
/// This struct defines the command-line arguments of the scenario runner.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The path to the scenario TOML file to run.
    #[arg(
        short,
        long,
        default_value = "assets/scenarios/00_hover_altimeter.toml"
    )]
    pub scenario: PathBuf,

    /// Run every scenario found below this directory instead.
    #[arg(long, value_name = "DIR")]
    pub all: Option<PathBuf>,

    /// Log estimator internals at debug level.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Print the fully resolved scenario, defaults included, before running it.
    #[arg(long, default_value_t = false)]
    pub dump_config: bool,
}
