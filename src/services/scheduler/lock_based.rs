//! Lock-per-interval scheduling: a node runs an agent only while it holds
//! that agent's cluster lock.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::execution::{CacheExecution, ExecutionOutcome, LockGuard};
use super::interval::{AgentInterval, AgentIntervalProvider};
use super::node::NodeIdentity;
use super::{
    compile_agent_pattern, parallelism_limit, AgentScheduler, SchedulerDeps, SchedulerRuntime,
    SchedulerStats, SlotState,
};
use crate::domain::errors::DomainResult;
use crate::domain::models::SchedulerConfig;
use crate::domain::ports::{AgentLockClient, CachingAgent, NodeStatusProvider};

/// Locks with less time than this left are deleted instead of shortened.
/// Active entries also get this much grace past their timeout before pruning.
const MIN_TTL_THRESHOLD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy)]
struct NextAttempt {
    started: Instant,
    interval: AgentInterval,
}

impl NextAttempt {
    fn next_time(&self, succeeded: bool) -> Instant {
        if succeeded {
            self.started + self.interval.interval
        } else {
            self.started + self.interval.error_interval
        }
    }

    fn expired(&self, now: Instant) -> bool {
        self.started + self.interval.timeout + MIN_TTL_THRESHOLD < now
    }
}

struct Inner {
    lock: Arc<dyn AgentLockClient>,
    node: NodeIdentity,
    node_status: Arc<dyn NodeStatusProvider>,
    execution: Arc<CacheExecution>,
    intervals: AgentIntervalProvider,
    enabled_pattern: Regex,
    parallelism: Option<usize>,
    agents: RwLock<BTreeMap<String, Arc<dyn CachingAgent>>>,
    active: RwLock<HashMap<String, NextAttempt>>,
    /// Agents whose lock this node keeps until their next run.
    resting: RwLock<HashMap<String, Instant>>,
    slots: RwLock<BTreeMap<String, SlotState>>,
    stats: RwLock<SchedulerStats>,
}

impl Inner {
    async fn set_slot(&self, agent_type: &str, state: SlotState) {
        let mut slots = self.slots.write().await;
        if let Some(slot) = slots.get_mut(agent_type) {
            *slot = state;
        }
    }

    async fn prune_active(&self) {
        let now = Instant::now();
        let mut active = self.active.write().await;
        let before = active.len();
        active.retain(|agent_type, attempt| {
            let keep = !attempt.expired(now);
            if !keep {
                info!(agent_type, "removing agent whose max execution time has elapsed");
            }
            keep
        });
        let pruned = before - active.len();
        if pruned > 0 {
            info!(pruned, "pruned active agents past their timeout");
        }
    }

    /// Take locks for up to `parallelism - active` idle agents, in random order.
    async fn acquire(&self) -> Vec<(Arc<dyn CachingAgent>, NextAttempt)> {
        let active: Vec<String> = self.active.read().await.keys().cloned().collect();
        let available = self
            .parallelism
            .map_or(usize::MAX, |limit| limit.saturating_sub(active.len()));
        if available == 0 {
            debug!(active = active.len(), "not acquiring more locks, parallelism reached");
            return Vec::new();
        }

        let now = Instant::now();
        let mut skip = active;
        {
            let mut resting = self.resting.write().await;
            resting.retain(|_, next_run| *next_run > now);
            skip.extend(resting.keys().cloned());
        }

        let mut candidates: Vec<Arc<dyn CachingAgent>> = self
            .agents
            .read()
            .await
            .iter()
            .filter(|(agent_type, _)| !skip.contains(agent_type))
            .map(|(_, agent)| Arc::clone(agent))
            .collect();
        candidates.shuffle(&mut rand::rng());

        let mut acquired = Vec::new();
        for agent in candidates {
            if acquired.len() >= available {
                break;
            }
            let agent_type = agent.agent_type().to_string();
            let interval = self.intervals.interval_for(agent.as_ref());
            self.set_slot(&agent_type, SlotState::LockAttempt).await;

            match self
                .lock
                .try_acquire(&agent_type, self.node.as_str(), interval.timeout)
                .await
            {
                Ok(true) => {
                    self.set_slot(&agent_type, SlotState::Running).await;
                    acquired.push((
                        agent,
                        NextAttempt {
                            started: Instant::now(),
                            interval,
                        },
                    ));
                }
                Ok(false) => {
                    debug!(agent_type = %agent_type, "lock held elsewhere");
                    self.set_slot(&agent_type, SlotState::LockDenied).await;
                    self.stats.write().await.lock_denied += 1;
                }
                Err(e) => {
                    warn!(agent_type = %agent_type, error = %e, "lock acquisition failed");
                    self.set_slot(&agent_type, SlotState::Idle).await;
                }
            }
        }
        acquired
    }

    /// Keep the lock until the next scheduled run so no other node starts early.
    /// Returns whether this node still holds it.
    async fn release_run_key(&self, agent_type: &str, next_time: Instant) -> bool {
        let remaining = next_time.saturating_duration_since(Instant::now());
        let owner = self.node.as_str();
        if remaining < MIN_TTL_THRESHOLD {
            if let Err(e) = self.lock.release(agent_type, owner).await {
                debug!(agent_type, error = %e, "lock delete failed");
            }
            return false;
        }
        match self.lock.set_ttl(agent_type, owner, remaining).await {
            Ok(true) => true,
            Ok(false) => {
                debug!(agent_type, "lock ttl update skipped, not held");
                false
            }
            Err(e) => {
                debug!(agent_type, error = %e, "lock ttl update failed");
                false
            }
        }
    }

    async fn run_agent(self: Arc<Self>, agent: Arc<dyn CachingAgent>, attempt: NextAttempt) {
        let agent_type = agent.agent_type().to_string();
        let guard = LockGuard {
            client: self.lock.as_ref(),
            owner: self.node.as_str(),
        };
        let outcome = self
            .execution
            .execute(agent.as_ref(), attempt.interval.timeout, Some(guard))
            .await;

        self.stats.write().await.record(&outcome);
        let next_time = attempt.next_time(outcome.is_success());
        if self.release_run_key(&agent_type, next_time).await {
            self.resting.write().await.insert(agent_type.clone(), next_time);
        }
        self.active.write().await.remove(&agent_type);
        self.set_slot(&agent_type, SlotState::Idle).await;

        if let ExecutionOutcome::Stored { additions, evictions } = outcome {
            debug!(agent_type = %agent_type, additions, evictions, "agent result stored");
        }
    }
}

/// The `default` policy.
pub struct ClusteredAgentScheduler {
    inner: Arc<Inner>,
    runtime: SchedulerRuntime,
    tick: Duration,
}

impl ClusteredAgentScheduler {
    pub fn new(config: &SchedulerConfig, deps: SchedulerDeps) -> DomainResult<Self> {
        Ok(Self {
            inner: Arc::new(Inner {
                lock: deps.lock,
                node: deps.node,
                node_status: deps.node_status,
                execution: deps.execution,
                intervals: AgentIntervalProvider::from_config(config),
                enabled_pattern: compile_agent_pattern(&config.enabled_agent_pattern)?,
                parallelism: parallelism_limit(config.parallelism)?,
                agents: RwLock::new(BTreeMap::new()),
                active: RwLock::new(HashMap::new()),
                resting: RwLock::new(HashMap::new()),
                slots: RwLock::new(BTreeMap::new()),
                stats: RwLock::new(SchedulerStats::default()),
            }),
            runtime: SchedulerRuntime::new(),
            tick: Duration::from_secs(config.lock_acquisition_interval_seconds.max(1)),
        })
    }

    pub fn node(&self) -> &NodeIdentity {
        &self.inner.node
    }
}

#[async_trait]
impl AgentScheduler for ClusteredAgentScheduler {
    async fn schedule(&self, agent: Arc<dyn CachingAgent>) -> bool {
        let agent_type = agent.agent_type().to_string();
        if !self.inner.enabled_pattern.is_match(&agent_type) {
            debug!(
                agent_type = %agent_type,
                pattern = self.inner.enabled_pattern.as_str(),
                "agent is not enabled"
            );
            return false;
        }
        self.inner.slots.write().await.insert(agent_type.clone(), SlotState::Idle);
        self.inner.agents.write().await.insert(agent_type, agent);
        true
    }

    async fn unschedule(&self, agent_type: &str) -> DomainResult<()> {
        let released = self.inner.lock.release(agent_type, self.inner.node.as_str()).await;
        self.inner.agents.write().await.remove(agent_type);
        self.inner.active.write().await.remove(agent_type);
        self.inner.resting.write().await.remove(agent_type);
        self.inner.slots.write().await.remove(agent_type);
        released
    }

    async fn run_once(&self) -> usize {
        self.inner.stats.write().await.ticks += 1;
        if !self.inner.node_status.is_node_enabled() {
            debug!("node disabled, skipping scheduling pass");
            self.inner.stats.write().await.skipped_ticks += 1;
            return 0;
        }

        self.inner.prune_active().await;
        let acquired = self.inner.acquire().await;
        {
            let mut active = self.inner.active.write().await;
            for (agent, attempt) in &acquired {
                active.insert(agent.agent_type().to_string(), *attempt);
            }
            debug!(new = acquired.len(), active = active.len(), "scheduling agents");
        }

        let launched = acquired.len();
        self.inner.stats.write().await.runs_started += launched as u64;
        for (agent, attempt) in acquired {
            let inner = Arc::clone(&self.inner);
            self.runtime.spawn_job(inner.run_agent(agent, attempt)).await;
        }
        launched
    }

    async fn wait_idle(&self) {
        self.runtime.wait_idle().await;
    }

    async fn stats(&self) -> SchedulerStats {
        let mut stats = self.inner.stats.read().await.clone();
        stats.scheduled_agents = self.inner.agents.read().await.len();
        stats.active_agents = self.inner.active.read().await.len();
        stats
    }

    async fn slot_state(&self, agent_type: &str) -> Option<SlotState> {
        self.inner.slots.read().await.get(agent_type).copied()
    }

    async fn start(self: Arc<Self>) {
        info!(node = %self.inner.node, tick_ms = self.tick.as_millis(), "starting lock-based scheduler");
        self.runtime.start(Arc::clone(&self), self.tick).await;
    }

    async fn stop(&self) {
        self.runtime.stop().await;
        info!(node = %self.inner.node, "lock-based scheduler stopped");
    }
}
