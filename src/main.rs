//! Cats CLI entry point.

use clap::Parser;

use cats::cli::{Cli, Commands};
use cats::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    // Default logging when the config does not load; the command reports why.
    let log_config = cats::cli::context::load_config(config_path)
        .map(|config| LogConfig::from(&config.logging))
        .unwrap_or_default();
    let _logger = match LoggerImpl::init(&log_config) {
        Ok(logger) => Some(logger),
        Err(err) => {
            eprintln!("Warning: logging disabled: {err:#}");
            None
        }
    };

    let result = match cli.command {
        Commands::Run(args) => cats::cli::commands::run::execute(args, config_path, cli.json).await,
        Commands::Search(args) => cats::cli::commands::search::execute(args, config_path, cli.json).await,
        Commands::Key(args) => cats::cli::commands::key::execute(args, cli.json).await,
        Commands::OnDemand(args) => cats::cli::commands::on_demand::execute(args, config_path, cli.json).await,
        Commands::Config(args) => cats::cli::commands::config::execute(args, config_path, cli.json).await,
    };

    if let Err(err) = result {
        cats::cli::handle_error(err, cli.json);
    }
}
