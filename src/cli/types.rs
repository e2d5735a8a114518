//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::cli::commands::config::ConfigArgs;
use crate::cli::commands::key::KeyArgs;
use crate::cli::commands::on_demand::OnDemandArgs;
use crate::cli::commands::run::RunArgs;
use crate::cli::commands::search::SearchArgs;

#[derive(Parser, Debug)]
#[command(name = "cats")]
#[command(about = "Cluster-aware caching agents with on-demand refresh and search", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file used instead of .cats/config.yaml and .cats/local.yaml
    #[arg(short, long, global = true, env = "CATS_CONFIG_FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the caching agents under the configured scheduler
    Run(RunArgs),

    /// Search cached keys
    Search(SearchArgs),

    /// Encode or parse cache keys
    Key(KeyArgs),

    /// Refresh a single resource ahead of the next full sync
    OnDemand(OnDemandArgs),

    /// Inspect configuration
    Config(ConfigArgs),
}
