//! Cluster agent scheduling.
//!
//! Two interchangeable policies decide which node runs which caching agent:
//! - `default`: a TTL lock per agent per interval ([`ClusteredAgentScheduler`])
//! - `sort`: static hash partitioning over worker slots ([`SortAgentScheduler`])

pub mod execution;
pub mod interval;
pub mod lock_based;
pub mod node;
pub mod sort;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::{JoinHandle, JoinSet};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{SchedulerConfig, SchedulerPolicy};
use crate::domain::ports::{AgentLockClient, CachingAgent, NodeStatusProvider};

pub use execution::{
    CacheExecution, CountingInstrumentation, ExecutionCounts, ExecutionInstrumentation,
    ExecutionOutcome, LockGuard, LoggingInstrumentation,
};
pub use interval::{AgentInterval, AgentIntervalProvider};
pub use lock_based::ClusteredAgentScheduler;
pub use node::{NodeIdentity, StaticNodeStatus};
pub use sort::SortAgentScheduler;

/// Bound on how long `stop` waits for running agents.
const STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifecycle of one scheduled agent on this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Idle,
    LockAttempt,
    Running,
    LockDenied,
}

/// Counters exposed by a scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub scheduled_agents: usize,
    pub active_agents: usize,
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub lock_denied: u64,
    pub runs_started: u64,
    pub runs_succeeded: u64,
    pub runs_failed: u64,
    pub runs_timed_out: u64,
    pub results_discarded: u64,
}

impl SchedulerStats {
    fn record(&mut self, outcome: &ExecutionOutcome) {
        match outcome {
            ExecutionOutcome::Stored { .. } => self.runs_succeeded += 1,
            ExecutionOutcome::Discarded => self.results_discarded += 1,
            ExecutionOutcome::Failed(_) => self.runs_failed += 1,
            ExecutionOutcome::TimedOut => self.runs_timed_out += 1,
        }
    }
}

/// Decides when, and on which node, each caching agent runs.
#[async_trait]
pub trait AgentScheduler: Send + Sync {
    /// Register an agent. Returns false when the agent is filtered out.
    async fn schedule(&self, agent: Arc<dyn CachingAgent>) -> bool;

    /// Forget an agent and give up any lock it holds.
    async fn unschedule(&self, agent_type: &str) -> DomainResult<()>;

    /// One scheduling pass. Returns the number of agents launched.
    async fn run_once(&self) -> usize;

    /// Wait for every agent launched so far to finish.
    async fn wait_idle(&self);

    async fn stats(&self) -> SchedulerStats;

    async fn slot_state(&self, agent_type: &str) -> Option<SlotState>;

    /// Spawn the periodic scheduling loop.
    async fn start(self: Arc<Self>);

    /// Stop the loop and wait, bounded, for running agents.
    async fn stop(&self);
}

/// Everything a scheduler needs, assembled once at startup.
pub struct SchedulerDeps {
    pub lock: Arc<dyn AgentLockClient>,
    pub node: NodeIdentity,
    pub node_status: Arc<dyn NodeStatusProvider>,
    pub execution: Arc<CacheExecution>,
}

/// Build the scheduler selected by `config.policy`.
pub fn build_scheduler(config: &SchedulerConfig, deps: SchedulerDeps) -> DomainResult<Arc<dyn AgentScheduler>> {
    let scheduler: Arc<dyn AgentScheduler> = match config.policy {
        SchedulerPolicy::Default => Arc::new(ClusteredAgentScheduler::new(config, deps)?),
        SchedulerPolicy::Sort => Arc::new(SortAgentScheduler::new(config, deps)?),
    };
    tracing::info!(policy = ?config.policy, "agent scheduler created");
    Ok(scheduler)
}

/// `None` for unbounded (-1), else the positive bound.
pub(crate) fn parallelism_limit(parallelism: i64) -> DomainResult<Option<usize>> {
    match parallelism {
        -1 => Ok(None),
        p if p > 0 => usize::try_from(p)
            .map(Some)
            .map_err(|e| DomainError::ValidationFailed(e.to_string())),
        p => Err(DomainError::ValidationFailed(format!(
            "parallelism must be -1 or positive, got {p}"
        ))),
    }
}

pub(crate) fn compile_agent_pattern(pattern: &str) -> DomainResult<regex::Regex> {
    regex::RegexBuilder::new(&format!("^(?:{pattern})$"))
        .case_insensitive(true)
        .build()
        .map_err(DomainError::from)
}

/// Tick loop, in-flight tasks and shutdown signal shared by both policies.
pub(crate) struct SchedulerRuntime {
    shutdown_tx: broadcast::Sender<()>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    in_flight: Mutex<JoinSet<()>>,
}

impl SchedulerRuntime {
    pub(crate) fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_tx,
            loop_handle: Mutex::new(None),
            in_flight: Mutex::new(JoinSet::new()),
        }
    }

    pub(crate) async fn spawn_job<F>(&self, job: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut in_flight = self.in_flight.lock().await;
        while in_flight.try_join_next().is_some() {}
        in_flight.spawn(job);
    }

    pub(crate) async fn wait_idle(&self) {
        let mut in_flight = self.in_flight.lock().await;
        while in_flight.join_next().await.is_some() {}
    }

    /// Call `tick` every `period` until shutdown is broadcast.
    pub(crate) async fn start<S>(&self, scheduler: Arc<S>, period: Duration)
    where
        S: AgentScheduler + ?Sized + 'static,
    {
        let mut handle = self.loop_handle.lock().await;
        if handle.is_some() {
            return;
        }
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        *handle = Some(tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        scheduler.run_once().await;
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
            tracing::info!("scheduling loop stopped");
        }));
    }

    pub(crate) async fn stop(&self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.loop_handle.lock().await.take() {
            let _ = handle.await;
        }

        let mut in_flight = self.in_flight.lock().await;
        let drained = tokio::time::timeout(STOP_TIMEOUT, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                remaining = in_flight.len(),
                "agents still running after stop timeout, detaching"
            );
            in_flight.detach_all();
        }
    }
}
