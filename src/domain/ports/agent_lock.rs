use async_trait::async_trait;
use std::time::Duration;

use crate::domain::errors::DomainResult;

/// Cluster-wide mutual exclusion keyed by agent type.
///
/// A lock has a single owner (node identity) and expires after its TTL.
#[async_trait]
pub trait AgentLockClient: Send + Sync {
    /// Take the lock if free or expired. `Ok(false)` means another owner holds it.
    async fn try_acquire(&self, agent_type: &str, owner: &str, ttl: Duration) -> DomainResult<bool>;

    /// Whether `owner` still holds an unexpired lock
    async fn is_held_by(&self, agent_type: &str, owner: &str) -> DomainResult<bool>;

    /// Reset the TTL of a lock held by `owner`. Returns false if not held.
    async fn set_ttl(&self, agent_type: &str, owner: &str, ttl: Duration) -> DomainResult<bool>;

    /// Drop a lock held by `owner`. Releasing a lock held by someone else is a no-op.
    async fn release(&self, agent_type: &str, owner: &str) -> DomainResult<()>;
}
