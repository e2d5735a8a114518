use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::domain::errors::DomainResult;
use crate::domain::ports::AgentLockClient;

#[derive(Debug, Clone)]
struct LockEntry {
    owner: String,
    expires_at: Instant,
}

/// Agent locks shared by schedulers within one process.
#[derive(Debug, Default)]
pub struct InMemoryAgentLock {
    locks: Mutex<HashMap<String, LockEntry>>,
}

impl InMemoryAgentLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current owner of a lock, if unexpired.
    pub async fn owner(&self, agent_type: &str) -> Option<String> {
        let locks = self.locks.lock().await;
        locks
            .get(agent_type)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.owner.clone())
    }
}

#[async_trait]
impl AgentLockClient for InMemoryAgentLock {
    async fn try_acquire(&self, agent_type: &str, owner: &str, ttl: Duration) -> DomainResult<bool> {
        let mut locks = self.locks.lock().await;
        let now = Instant::now();
        if let Some(entry) = locks.get(agent_type) {
            if entry.expires_at > now {
                return Ok(false);
            }
        }
        locks.insert(
            agent_type.to_string(),
            LockEntry {
                owner: owner.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn is_held_by(&self, agent_type: &str, owner: &str) -> DomainResult<bool> {
        let locks = self.locks.lock().await;
        Ok(locks
            .get(agent_type)
            .is_some_and(|entry| entry.owner == owner && entry.expires_at > Instant::now()))
    }

    async fn set_ttl(&self, agent_type: &str, owner: &str, ttl: Duration) -> DomainResult<bool> {
        let mut locks = self.locks.lock().await;
        let now = Instant::now();
        match locks.get_mut(agent_type) {
            Some(entry) if entry.owner == owner && entry.expires_at > now => {
                entry.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, agent_type: &str, owner: &str) -> DomainResult<()> {
        let mut locks = self.locks.lock().await;
        if locks.get(agent_type).is_some_and(|entry| entry.owner == owner) {
            locks.remove(agent_type);
        }
        Ok(())
    }
}
