//! Configuration inspection commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use std::path::Path;

use crate::cli::context::load_config;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration after merging all sources
    Show,
    /// Load and validate the configuration
    Validate,
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ConfigShowOutput(pub Config);

impl CommandOutput for ConfigShowOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.0).unwrap_or_else(|e| format!("<unprintable config: {e}>"))
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigValidateOutput {
    pub valid: bool,
    pub providers: usize,
    pub accounts: usize,
    pub caching_agents: u64,
}

impl CommandOutput for ConfigValidateOutput {
    fn to_human(&self) -> String {
        format!(
            "Configuration is valid: {} provider(s), {} account(s), {} caching agent(s).",
            self.providers, self.accounts, self.caching_agents
        )
    }
}

pub async fn execute(args: ConfigArgs, config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let config = load_config(config_path).context("Configuration is invalid")?;

    match args.command {
        ConfigCommands::Show => output(&ConfigShowOutput(config), json_mode),
        ConfigCommands::Validate => {
            let accounts = config.providers.iter().flat_map(|p| &p.accounts);
            let out = ConfigValidateOutput {
                valid: true,
                providers: config.providers.len(),
                accounts: accounts.clone().count(),
                caching_agents: accounts.map(|a| u64::from(a.shards)).sum(),
            };
            output(&out, json_mode);
        }
    }
    Ok(())
}
