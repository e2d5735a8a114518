//! Running a caching agent and merging its result into the store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::errors::DomainError;
use crate::domain::models::RequestContext;
use crate::domain::ports::{AgentLockClient, CacheStore, CachingAgent};

/// Hooks around each agent execution.
pub trait ExecutionInstrumentation: Send + Sync {
    fn execution_started(&self, agent_type: &str);

    fn execution_completed(&self, agent_type: &str, elapsed: Duration);

    fn execution_failed(&self, agent_type: &str, error: &DomainError, elapsed: Duration);

    fn execution_timed_out(&self, agent_type: &str, timeout: Duration);
}

/// Writes every execution event to the tracing subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInstrumentation;

impl ExecutionInstrumentation for LoggingInstrumentation {
    fn execution_started(&self, agent_type: &str) {
        debug!(agent_type, "agent execution started");
    }

    fn execution_completed(&self, agent_type: &str, elapsed: Duration) {
        info!(agent_type, elapsed_ms = elapsed.as_millis(), "agent execution completed");
    }

    fn execution_failed(&self, agent_type: &str, error: &DomainError, elapsed: Duration) {
        warn!(agent_type, elapsed_ms = elapsed.as_millis(), error = %error, "agent execution failed");
    }

    fn execution_timed_out(&self, agent_type: &str, timeout: Duration) {
        warn!(agent_type, timeout_ms = timeout.as_millis(), "agent execution timed out");
    }
}

/// Snapshot of [`CountingInstrumentation`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExecutionCounts {
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
}

#[derive(Debug, Default)]
pub struct CountingInstrumentation {
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

impl CountingInstrumentation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counts(&self) -> ExecutionCounts {
        ExecutionCounts {
            started: self.started.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
        }
    }
}

impl ExecutionInstrumentation for CountingInstrumentation {
    fn execution_started(&self, _agent_type: &str) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    fn execution_completed(&self, _agent_type: &str, _elapsed: Duration) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    fn execution_failed(&self, _agent_type: &str, _error: &DomainError, _elapsed: Duration) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    fn execution_timed_out(&self, _agent_type: &str, _timeout: Duration) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }
}

/// How an execution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Result merged into the store
    Stored { additions: usize, evictions: usize },
    /// Load finished after the lock moved to another owner; nothing was written
    Discarded,
    Failed(String),
    TimedOut,
}

impl ExecutionOutcome {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Stored { .. })
    }
}

/// Lock that must still be held when the result is written.
#[derive(Clone, Copy)]
pub struct LockGuard<'a> {
    pub client: &'a dyn AgentLockClient,
    pub owner: &'a str,
}

/// Loads an agent's data and merges the result into the shared store.
pub struct CacheExecution {
    store: Arc<dyn CacheStore>,
    instrumentation: Vec<Arc<dyn ExecutionInstrumentation>>,
}

impl CacheExecution {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            instrumentation: vec![Arc::new(LoggingInstrumentation)],
        }
    }

    pub fn with_instrumentation(mut self, instrumentation: Arc<dyn ExecutionInstrumentation>) -> Self {
        self.instrumentation.push(instrumentation);
        self
    }

    pub fn store(&self) -> Arc<dyn CacheStore> {
        Arc::clone(&self.store)
    }

    /// Run `load_data` under a hard timeout, then store the result.
    ///
    /// Nothing is written when the load fails, times out, or the guard's lock
    /// is no longer held by its owner.
    pub async fn execute(
        &self,
        agent: &dyn CachingAgent,
        timeout: Duration,
        guard: Option<LockGuard<'_>>,
    ) -> ExecutionOutcome {
        let agent_type = agent.agent_type();
        let ctx = RequestContext::system();
        let started = Instant::now();
        self.each(|i| i.execution_started(agent_type));

        let loaded = tokio::time::timeout(timeout, agent.load_data(self.store.as_ref(), &ctx)).await;
        let result = match loaded {
            Err(_) => {
                self.each(|i| i.execution_timed_out(agent_type, timeout));
                return ExecutionOutcome::TimedOut;
            }
            Ok(Err(e)) => {
                self.each(|i| i.execution_failed(agent_type, &e, started.elapsed()));
                return ExecutionOutcome::Failed(e.to_string());
            }
            Ok(Ok(result)) => result,
        };

        if let Some(guard) = guard {
            match guard.client.is_held_by(agent_type, guard.owner).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(agent_type, owner = guard.owner, "lock lost before store, discarding result");
                    return ExecutionOutcome::Discarded;
                }
                Err(e) => {
                    self.each(|i| i.execution_failed(agent_type, &e, started.elapsed()));
                    return ExecutionOutcome::Failed(e.to_string());
                }
            }
        }

        if let Err(e) = self.store.put_cache_result(&result).await {
            self.each(|i| i.execution_failed(agent_type, &e, started.elapsed()));
            return ExecutionOutcome::Failed(e.to_string());
        }

        self.each(|i| i.execution_completed(agent_type, started.elapsed()));
        ExecutionOutcome::Stored {
            additions: result.addition_count(),
            evictions: result.eviction_count(),
        }
    }

    fn each(&self, f: impl Fn(&dyn ExecutionInstrumentation)) {
        for instrumentation in &self.instrumentation {
            f(instrumentation.as_ref());
        }
    }
}
