//! CLI interface for wick-engine
//!
//! Provides subcommands for:
//! - `run`: start the detection engine
//! - `status`: print the latest status snapshot
//! - `config`: show the resolved configuration

mod run;

pub use run::RunArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "wick-engine")]
#[command(about = "Real-time wick detection and market-microstructure analytics")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the detection engine
    Run(RunArgs),
    /// Print the latest status snapshot
    Status,
    /// Show the resolved configuration
    Config,
}
