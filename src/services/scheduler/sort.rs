//! Static partitioning: agent types hash onto worker slots and each node
//! runs only the agents of its own slot, in order of readiness.

use async_trait::async_trait;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info};

use super::execution::CacheExecution;
use super::interval::AgentIntervalProvider;
use super::node::NodeIdentity;
use super::{
    compile_agent_pattern, parallelism_limit, AgentScheduler, SchedulerDeps, SchedulerRuntime,
    SchedulerStats, SlotState,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{shard_of, SchedulerConfig};
use crate::domain::ports::{CachingAgent, NodeStatusProvider};

struct Inner {
    node: NodeIdentity,
    node_status: Arc<dyn NodeStatusProvider>,
    execution: Arc<CacheExecution>,
    intervals: AgentIntervalProvider,
    enabled_pattern: Regex,
    permits: Option<Arc<Semaphore>>,
    agents: RwLock<BTreeMap<String, Arc<dyn CachingAgent>>>,
    /// Ready time of each idle agent
    waiting: RwLock<HashMap<String, Instant>>,
    /// Deadline of each running agent
    working: RwLock<HashMap<String, Instant>>,
    stats: RwLock<SchedulerStats>,
}

impl Inner {
    /// Running agents past their deadline go back to waiting, ready now.
    async fn cull_working(&self, now: Instant) {
        let mut working = self.working.write().await;
        let expired: Vec<String> = working
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(agent_type, _)| agent_type.clone())
            .collect();
        if expired.is_empty() {
            return;
        }
        let mut waiting = self.waiting.write().await;
        for agent_type in expired {
            info!(agent_type = %agent_type, "agent exceeded its timeout, rescheduling");
            working.remove(&agent_type);
            waiting.insert(agent_type, now);
        }
    }

    /// Waiting agents whose ready time has passed, earliest first.
    async fn ready(&self, now: Instant) -> Vec<String> {
        let waiting = self.waiting.read().await;
        let mut ready: Vec<(&String, &Instant)> = waiting.iter().filter(|(_, due)| **due <= now).collect();
        ready.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));
        ready.into_iter().map(|(agent_type, _)| agent_type.clone()).collect()
    }

    async fn run_agent(
        self: Arc<Self>,
        agent: Arc<dyn CachingAgent>,
        permit: Option<tokio::sync::OwnedSemaphorePermit>,
    ) {
        let agent_type = agent.agent_type().to_string();
        let interval = self.intervals.interval_for(agent.as_ref());
        let started = Instant::now();

        let outcome = self.execution.execute(agent.as_ref(), interval.timeout, None).await;
        drop(permit);

        self.stats.write().await.record(&outcome);
        let next = started
            + if outcome.is_success() {
                interval.interval
            } else {
                interval.error_interval
            };

        let mut working = self.working.write().await;
        if working.remove(&agent_type).is_some() && self.agents.read().await.contains_key(&agent_type) {
            self.waiting.write().await.insert(agent_type, next);
        }
    }
}

/// The `sort` policy.
pub struct SortAgentScheduler {
    inner: Arc<Inner>,
    runtime: SchedulerRuntime,
    worker_slot: u32,
    worker_slots: u32,
    tick: Duration,
}

impl SortAgentScheduler {
    pub fn new(config: &SchedulerConfig, deps: SchedulerDeps) -> DomainResult<Self> {
        if config.worker_slots == 0 || config.worker_slot >= config.worker_slots {
            return Err(DomainError::ValidationFailed(format!(
                "worker slot {} outside of {} worker slots",
                config.worker_slot, config.worker_slots
            )));
        }
        let permits = parallelism_limit(config.parallelism)?.map(|p| Arc::new(Semaphore::new(p)));

        Ok(Self {
            inner: Arc::new(Inner {
                node: deps.node,
                node_status: deps.node_status,
                execution: deps.execution,
                intervals: AgentIntervalProvider::from_config(config),
                enabled_pattern: compile_agent_pattern(&config.enabled_agent_pattern)?,
                permits,
                agents: RwLock::new(BTreeMap::new()),
                waiting: RwLock::new(HashMap::new()),
                working: RwLock::new(HashMap::new()),
                stats: RwLock::new(SchedulerStats::default()),
            }),
            runtime: SchedulerRuntime::new(),
            worker_slot: config.worker_slot,
            worker_slots: config.worker_slots,
            tick: Duration::from_secs(config.lock_acquisition_interval_seconds.max(1)),
        })
    }

    /// Whether this node's slot owns the agent type.
    pub fn owns(&self, agent_type: &str) -> bool {
        shard_of(agent_type, self.worker_slots) == self.worker_slot
    }
}

#[async_trait]
impl AgentScheduler for SortAgentScheduler {
    async fn schedule(&self, agent: Arc<dyn CachingAgent>) -> bool {
        let agent_type = agent.agent_type().to_string();
        if !self.inner.enabled_pattern.is_match(&agent_type) {
            debug!(agent_type = %agent_type, "agent is not enabled");
            return false;
        }
        if !self.owns(&agent_type) {
            debug!(
                agent_type = %agent_type,
                worker_slot = self.worker_slot,
                worker_slots = self.worker_slots,
                "agent belongs to another worker slot"
            );
            return false;
        }
        self.inner.waiting.write().await.insert(agent_type.clone(), Instant::now());
        self.inner.agents.write().await.insert(agent_type, agent);
        true
    }

    async fn unschedule(&self, agent_type: &str) -> DomainResult<()> {
        self.inner.agents.write().await.remove(agent_type);
        self.inner.waiting.write().await.remove(agent_type);
        self.inner.working.write().await.remove(agent_type);
        Ok(())
    }

    async fn run_once(&self) -> usize {
        self.inner.stats.write().await.ticks += 1;
        if !self.inner.node_status.is_node_enabled() {
            debug!("node disabled, skipping scheduling pass");
            self.inner.stats.write().await.skipped_ticks += 1;
            return 0;
        }

        let now = Instant::now();
        self.inner.cull_working(now).await;

        let mut launched = 0;
        for agent_type in self.inner.ready(now).await {
            let permit = match &self.inner.permits {
                Some(permits) => match Arc::clone(permits).try_acquire_owned() {
                    Ok(permit) => Some(permit),
                    Err(_) => break,
                },
                None => None,
            };
            let Some(agent) = self.inner.agents.read().await.get(&agent_type).cloned() else {
                self.inner.waiting.write().await.remove(&agent_type);
                continue;
            };

            let timeout = self.inner.intervals.interval_for(agent.as_ref()).timeout;
            self.inner.waiting.write().await.remove(&agent_type);
            self.inner.working.write().await.insert(agent_type, now + timeout);

            let inner = Arc::clone(&self.inner);
            self.runtime.spawn_job(inner.run_agent(agent, permit)).await;
            launched += 1;
        }

        self.inner.stats.write().await.runs_started += launched as u64;
        launched
    }

    async fn wait_idle(&self) {
        self.runtime.wait_idle().await;
    }

    async fn stats(&self) -> SchedulerStats {
        let mut stats = self.inner.stats.read().await.clone();
        stats.scheduled_agents = self.inner.agents.read().await.len();
        stats.active_agents = self.inner.working.read().await.len();
        stats
    }

    async fn slot_state(&self, agent_type: &str) -> Option<SlotState> {
        if self.inner.working.read().await.contains_key(agent_type) {
            return Some(SlotState::Running);
        }
        self.inner
            .agents
            .read()
            .await
            .contains_key(agent_type)
            .then_some(SlotState::Idle)
    }

    async fn start(self: Arc<Self>) {
        info!(
            node = %self.inner.node,
            worker_slot = self.worker_slot,
            worker_slots = self.worker_slots,
            "starting sort scheduler"
        );
        self.runtime.start(Arc::clone(&self), self.tick).await;
    }

    async fn stop(&self) {
        self.runtime.stop().await;
        info!(node = %self.inner.node, "sort scheduler stopped");
    }
}
