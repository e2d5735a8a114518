//! Targeted cache refresh.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::cli::context::{load_config, CliContext, MissingSources};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{OnDemandRequest, OnDemandType, PendingOnDemandRequest, RequestContext};
use crate::services::{OnDemandCacheStatus, OnDemandCacheUpdater, OnDemandOutcome};

#[derive(Args, Debug)]
pub struct OnDemandArgs {
    /// Cloud provider handling the request
    #[arg(long)]
    pub provider: String,

    /// Resource type, or `manifest` with a "<TYPE> <name>" name
    #[arg(long = "type", value_name = "TYPE")]
    pub on_demand_type: OnDemandType,

    #[arg(long)]
    pub account: String,

    #[arg(long)]
    pub location: String,

    #[arg(long)]
    pub name: String,

    /// Fixture file (YAML or JSON) providing resources per account
    #[arg(long)]
    pub fixtures: Option<PathBuf>,

    /// List staged requests afterwards
    #[arg(long)]
    pub pending: bool,
}

#[derive(Debug, Serialize)]
pub struct OnDemandOutput {
    #[serde(flatten)]
    pub outcome: OnDemandOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<Vec<PendingOnDemandRequest>>,
}

impl CommandOutput for OnDemandOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![match self.outcome.status {
            OnDemandCacheStatus::Successful => {
                format!("Refreshed by {} agent(s):", self.outcome.results.len())
            }
            OnDemandCacheStatus::Pending => "No agent claimed the request; it stays pending.".to_string(),
        }];
        for result in &self.outcome.results {
            lines.push(format!(
                "  {}: {} additions, {} evictions",
                result.agent_type,
                result.cache_result.addition_count(),
                result.evictions.values().map(Vec::len).sum::<usize>()
            ));
        }
        if let Some(pending) = &self.pending {
            lines.push(format!("Staged requests: {}", pending.len()));
            for request in pending {
                lines.push(format!(
                    "  {} (processed {} time(s))",
                    request.id, request.processed_count
                ));
            }
        }
        lines.join("\n")
    }
}

pub async fn execute(args: OnDemandArgs, config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let ctx = CliContext::open(config, args.fixtures.as_deref(), MissingSources::Reject).await?;
    let updater = OnDemandCacheUpdater::from_registry(&ctx.registry);

    let request = OnDemandRequest::new(args.account, args.location, args.name);
    let outcome = updater
        .handle(&args.on_demand_type, &args.provider, &request, &RequestContext::system())
        .await
        .context("On-demand refresh failed")?;

    let pending = if args.pending {
        Some(
            updater
                .pending_on_demand_requests(&args.on_demand_type, &args.provider)
                .await
                .context("Failed to list staged on-demand requests")?,
        )
    } else {
        None
    };

    output(&OnDemandOutput { outcome, pending }, json_mode);
    Ok(())
}
