//! CLI module for clinsupply
//!
//! Command-line interface definitions and handlers.
//!
//! # Commands
//!
//! - `run` - Run the orchestrator over a JSON input document
//! - `rules` - Evaluate the resupply rules for one site
//! - `config` - Configuration utilities (init)
//! - `completions` - Generate shell completions
//!
//! # Example
//!
//! ```bash
//! # Run with default config, print a table
//! clinsupply run -i sites.json
//!
//! # Rules only, machine-readable output
//! clinsupply run -i sites.json --rules-only --json
//!
//! # Generate shell completions
//! clinsupply completions bash > ~/.bash_completion.d/clinsupply
//! ```

pub mod completions;
pub mod config;
pub mod output;
pub mod rules;
pub mod run;

pub use completions::handle_completions;
pub use config::handle_config_init;
pub use rules::handle_rules;
pub use run::handle_run;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// clinsupply - clinical-trial supply orchestrator
#[derive(Parser, Debug)]
#[command(
    name = "clinsupply",
    version,
    about = "Hybrid rules and reasoning orchestrator for clinical-trial resupply"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the orchestrator over a set of sites
    Run(RunArgs),
    /// Evaluate the rule engine for one site
    Rules(RulesArgs),
    /// Configuration utilities
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Run input document (JSON with sites, depots, enrichment)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Path to configuration file
    #[arg(short, long, default_value = "clinsupply.toml")]
    pub config: PathBuf,

    /// Output the full run document as JSON
    #[arg(long)]
    pub json: bool,

    /// Never call the reasoning service
    #[arg(long)]
    pub rules_only: bool,

    /// Override sites per batched reasoning call
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Override the reasoning concurrency limit
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Print a Prometheus metrics snapshot to stderr after the run
    #[arg(long)]
    pub metrics: bool,
}

#[derive(Args, Debug)]
pub struct RulesArgs {
    /// Projected 30-day demand in kits
    #[arg(long)]
    pub demand: u32,

    /// Current on-site inventory in kits
    #[arg(long)]
    pub inventory: u32,

    /// Days until the earliest lot expires
    #[arg(long, allow_hyphen_values = true)]
    pub days_to_expiry: i32,

    /// Path to configuration file
    #[arg(short, long, default_value = "clinsupply.toml")]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Initialize a new configuration file
    Init(ConfigInitArgs),
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Output file path
    #[arg(short, long, default_value = "clinsupply.toml")]
    pub output: PathBuf,

    /// Overwrite existing file
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
