//! Caching agent runner.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cli::context::{load_config, CliContext, MissingSources};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::SchedulerPolicy;
use crate::services::scheduler::{
    CacheExecution, CountingInstrumentation, ExecutionCounts, NodeIdentity, StaticNodeStatus,
};
use crate::services::{build_scheduler, SchedulerDeps, SchedulerStats, ShadowIndex};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Fixture file (YAML or JSON) providing resources per account
    #[arg(long)]
    pub fixtures: Option<PathBuf>,

    /// Run a single scheduling pass and exit
    #[arg(long)]
    pub once: bool,
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub node: String,
    pub policy: SchedulerPolicy,
    pub scheduled_agents: usize,
    pub started_this_pass: Option<usize>,
    pub stats: SchedulerStats,
    pub executions: ExecutionCounts,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("Node: {} ({:?} policy)", self.node, self.policy),
            format!("Scheduled agents: {}", self.scheduled_agents),
        ];
        if let Some(started) = self.started_this_pass {
            lines.push(format!("Started this pass: {started}"));
        }
        lines.push(format!(
            "Executions: {} started, {} succeeded, {} failed, {} timed out",
            self.executions.started,
            self.executions.succeeded,
            self.executions.failed,
            self.executions.timed_out
        ));
        if self.stats.results_discarded > 0 {
            lines.push(format!(
                "Results discarded after losing the lock: {}",
                self.stats.results_discarded
            ));
        }
        if self.stats.lock_denied > 0 {
            lines.push(format!("Lock attempts denied: {}", self.stats.lock_denied));
        }
        lines.join("\n")
    }
}

pub async fn execute(args: RunArgs, config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let ctx = CliContext::open(config, args.fixtures.as_deref(), MissingSources::Reject).await?;

    let counters = Arc::new(CountingInstrumentation::new());
    let execution = Arc::new(
        CacheExecution::new(Arc::clone(&ctx.store)).with_instrumentation(Arc::clone(&counters) as _),
    );
    let node = NodeIdentity::from_config(&ctx.config.node);
    let deps = SchedulerDeps {
        lock: Arc::clone(&ctx.lock),
        node: node.clone(),
        node_status: Arc::new(StaticNodeStatus::new(ctx.config.node.enabled)),
        execution,
    };
    let scheduler = build_scheduler(&ctx.config.scheduler, deps).context("Failed to create scheduler")?;

    let mut scheduled_agents = 0;
    for agent in ctx.registry.caching_agents() {
        if scheduler.schedule(agent).await {
            scheduled_agents += 1;
        }
    }

    let started_this_pass = if args.once {
        let started = scheduler.run_once().await;
        scheduler.wait_idle().await;
        Some(started)
    } else {
        let shadow = ctx.config.search.shadow_index_enabled.then(|| {
            Arc::new(ShadowIndex::new(ctx.config.search.shadow_index_types.clone())).spawn_refresh(
                Arc::clone(&ctx.store),
                Duration::from_secs(ctx.config.search.shadow_refresh_interval_seconds),
            )
        });

        Arc::clone(&scheduler).start().await;
        tracing::info!(node = %node, scheduled_agents, "caching agents running, press Ctrl-C to stop");
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;

        tracing::info!("shutdown requested");
        scheduler.stop().await;
        if let Some(handle) = shadow {
            handle.stop();
        }
        None
    };

    let out = RunOutput {
        node: node.to_string(),
        policy: ctx.config.scheduler.policy,
        scheduled_agents,
        started_this_pass,
        stats: scheduler.stats().await,
        executions: counters.counts(),
    };
    output(&out, json_mode);
    Ok(())
}
