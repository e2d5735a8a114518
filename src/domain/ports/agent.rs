use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    AgentDataType, CacheResult, OnDemandRequest, OnDemandResult, OnDemandType,
    PendingOnDemandRequest, RequestContext,
};
use crate::domain::ports::CacheStore;

/// Anything the scheduler can run.
pub trait Agent: Send + Sync {
    /// Unique identity, used as the lock key
    fn agent_type(&self) -> &str;

    fn provider_name(&self) -> &str;

    /// Overrides the scheduler's poll interval for this agent
    fn poll_interval_override_seconds(&self) -> Option<u64> {
        None
    }
}

/// Full-synchronization contract.
#[async_trait]
pub trait CachingAgent: Agent {
    /// Types this agent contributes, tagged with authority
    fn provided_data_types(&self) -> Vec<AgentDataType>;

    /// Fetch the agent's scope and diff it against the store.
    ///
    /// An error means no result is published for this interval.
    async fn load_data(&self, store: &dyn CacheStore, ctx: &RequestContext) -> DomainResult<CacheResult>;
}

/// Targeted-synchronization contract.
#[async_trait]
pub trait OnDemandAgent: Agent {
    fn on_demand_agent_type(&self) -> String {
        format!("{}-OnDemand", self.agent_type())
    }

    /// Whether requests of this type and provider are meant for this agent
    fn handles(&self, on_demand_type: &OnDemandType, cloud_provider: &str) -> bool;

    /// Refresh or evict one resource. `Ok(None)` when the request is not ours.
    async fn handle(
        &self,
        store: &dyn CacheStore,
        on_demand_type: &OnDemandType,
        request: &OnDemandRequest,
        ctx: &RequestContext,
    ) -> DomainResult<Option<OnDemandResult>>;

    /// Staged entries in this agent's scope and shard
    async fn pending_on_demand_requests(&self, store: &dyn CacheStore) -> DomainResult<Vec<PendingOnDemandRequest>>;
}
