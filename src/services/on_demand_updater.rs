//! Fans on-demand requests out to the agents that handle them and applies
//! their results to the shared store.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    OnDemandRequest, OnDemandResult, OnDemandType, PendingOnDemandRequest, RequestContext,
};
use crate::domain::ports::{CacheStore, OnDemandAgent};
use crate::services::provider_registry::ProviderRegistry;

/// Outcome of an on-demand request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDemandCacheStatus {
    /// At least one agent claimed and applied the request
    Successful,
    /// No agent claimed the request
    Pending,
}

/// Status plus the results applied, for callers that want to inspect them.
#[derive(Debug, Clone, Serialize)]
pub struct OnDemandOutcome {
    pub status: OnDemandCacheStatus,
    pub results: Vec<OnDemandResult>,
}

pub struct OnDemandCacheUpdater {
    store: Arc<dyn CacheStore>,
    agents: Vec<Arc<dyn OnDemandAgent>>,
}

impl OnDemandCacheUpdater {
    pub fn new(store: Arc<dyn CacheStore>, agents: Vec<Arc<dyn OnDemandAgent>>) -> Self {
        Self { store, agents }
    }

    pub fn from_registry(registry: &ProviderRegistry) -> Self {
        Self::new(registry.store(), registry.on_demand_agents())
    }

    /// Whether any agent handles this type for the provider.
    pub fn handles(&self, on_demand_type: &OnDemandType, cloud_provider: &str) -> bool {
        self.agents.iter().any(|a| a.handles(on_demand_type, cloud_provider))
    }

    /// Offer the request to every matching agent concurrently and apply what
    /// they return in registration order.
    ///
    /// An agent error is logged and skipped; it fails the request only if no
    /// other agent claimed it.
    pub async fn handle(
        &self,
        on_demand_type: &OnDemandType,
        cloud_provider: &str,
        request: &OnDemandRequest,
        ctx: &RequestContext,
    ) -> DomainResult<OnDemandOutcome> {
        let handling: Vec<_> = self
            .agents
            .iter()
            .filter(|a| a.handles(on_demand_type, cloud_provider))
            .collect();
        let started = Instant::now();
        let outcomes = join_all(
            handling
                .iter()
                .map(|agent| agent.handle(self.store.as_ref(), on_demand_type, request, ctx)),
        )
        .await;

        let mut results = Vec::new();
        let mut first_error: Option<DomainError> = None;
        for (agent, outcome) in handling.iter().zip(outcomes) {
            match outcome {
                Ok(Some(result)) => {
                    self.apply(&result).await?;
                    info!(
                        agent_type = %result.agent_type,
                        request_id = %ctx.request_id,
                        elapsed_ms = started.elapsed().as_millis(),
                        additions = result.cache_result.addition_count(),
                        evictions = result.evictions.values().map(Vec::len).sum::<usize>(),
                        "applied on-demand result"
                    );
                    results.push(result);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        agent_type = %agent.on_demand_agent_type(),
                        request_id = %ctx.request_id,
                        error = %e,
                        "on-demand agent failed"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        if results.is_empty() {
            if let Some(e) = first_error {
                return Err(e);
            }
            return Ok(OnDemandOutcome {
                status: OnDemandCacheStatus::Pending,
                results,
            });
        }

        Ok(OnDemandOutcome {
            status: OnDemandCacheStatus::Successful,
            results,
        })
    }

    /// Staged entries of every agent handling the provider.
    pub async fn pending_on_demand_requests(
        &self,
        on_demand_type: &OnDemandType,
        cloud_provider: &str,
    ) -> DomainResult<Vec<PendingOnDemandRequest>> {
        let mut pending = Vec::new();
        for agent in self.agents.iter().filter(|a| a.handles(on_demand_type, cloud_provider)) {
            pending.extend(agent.pending_on_demand_requests(self.store.as_ref()).await?);
        }
        pending.sort_by(|a, b| a.id.cmp(&b.id));
        pending.dedup_by(|a, b| a.id == b.id);
        Ok(pending)
    }

    async fn apply(&self, result: &OnDemandResult) -> DomainResult<()> {
        self.store.put_cache_result(&result.cache_result).await?;
        for (type_name, ids) in &result.evictions {
            if !ids.is_empty() {
                self.store.evict(type_name, ids).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fixture::FixtureResourceSource;
    use crate::adapters::memory::InMemoryCacheStore;
    use crate::domain::models::{AgentDataType, CacheData, Resource, Scope, ShardAssignment};
    use crate::services::agents::{ResourceAgentConfig, ResourceCachingAgent};
    use std::time::Duration;

    fn setup(shards: u32, source: Arc<FixtureResourceSource>) -> (Arc<InMemoryCacheStore>, OnDemandCacheUpdater) {
        let store = Arc::new(InMemoryCacheStore::new());
        let agents = (0..shards)
            .filter_map(|i| ShardAssignment::new(i, shards))
            .map(|shard| {
                Arc::new(ResourceCachingAgent::new(
                    ResourceAgentConfig {
                        provider: "kubernetes".to_string(),
                        scope: Scope::new("acct", vec!["ns1".to_string()]),
                        shard,
                        data_types: vec![AgentDataType::authoritative("deployment")],
                        on_demand_max_age: Duration::from_secs(600),
                    },
                    source.clone(),
                )) as Arc<dyn OnDemandAgent>
            })
            .collect();
        let updater = OnDemandCacheUpdater::new(store.clone(), agents);
        (store, updater)
    }

    #[tokio::test]
    async fn test_found_resource_is_applied_and_staged() {
        let source = Arc::new(FixtureResourceSource::new(
            "acct",
            vec![Resource::new("deployment", "ns1", "web")],
        ));
        let (store, updater) = setup(3, source);
        let request = OnDemandRequest::new("acct", "ns1", "deployment web");

        let outcome = updater
            .handle(&OnDemandType::Manifest, "kubernetes", &request, &RequestContext::system())
            .await
            .unwrap();

        assert_eq!(outcome.status, OnDemandCacheStatus::Successful);
        assert_eq!(outcome.results.len(), 1);
        let key = "kubernetes:deployment:acct:ns1:web";
        assert!(store.get("deployment", key).await.unwrap().is_some());
        assert!(store.get("onDemand", key).await.unwrap().is_some());

        let pending = updater
            .pending_on_demand_requests(&OnDemandType::Manifest, "kubernetes")
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_resource_is_evicted() {
        let source = Arc::new(FixtureResourceSource::new("acct", Vec::new()));
        let (store, updater) = setup(1, source);
        let key = "kubernetes:deployment:acct:ns1:gone";
        store.put_cache_data("deployment", CacheData::empty(key)).await.unwrap();

        let request = OnDemandRequest::new("acct", "ns1", "deployment gone");
        let outcome = updater
            .handle(&OnDemandType::Manifest, "kubernetes", &request, &RequestContext::system())
            .await
            .unwrap();

        assert_eq!(outcome.status, OnDemandCacheStatus::Successful);
        assert!(store.get("deployment", key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unclaimed_request_is_pending() {
        let source = Arc::new(FixtureResourceSource::new("acct", Vec::new()));
        let (_, updater) = setup(1, source);
        let request = OnDemandRequest::new("elsewhere", "ns1", "deployment web");

        let outcome = updater
            .handle(&OnDemandType::Manifest, "kubernetes", &request, &RequestContext::system())
            .await
            .unwrap();
        assert_eq!(outcome.status, OnDemandCacheStatus::Pending);

        assert!(!updater.handles(&OnDemandType::Manifest, "aws"));
    }

    #[tokio::test]
    async fn test_transient_failure_surfaces_when_nobody_succeeded() {
        let source = Arc::new(FixtureResourceSource::new("acct", Vec::new()));
        source.set_failing(true);
        let (_, updater) = setup(1, source);
        let request = OnDemandRequest::new("acct", "ns1", "deployment web");

        let outcome = updater
            .handle(&OnDemandType::Manifest, "kubernetes", &request, &RequestContext::system())
            .await;
        assert!(outcome.is_err());
    }
}
