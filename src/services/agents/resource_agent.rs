//! Scope- and shard-bound agent doing both full and on-demand synchronization
//! of one account's resources.
//!
//! A full load lists the scope from the resource source, merges on-demand
//! entries staged while the load was in flight, and evicts previously cached
//! keys of authoritative types that the listing no longer reports. On-demand
//! handling refreshes a single resource and stages it under the `onDemand`
//! type so the next load of the owning shard picks it up.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::on_demand::attributes::LAST_MODIFIED;
use crate::domain::models::{
    AgentDataType, Attributes, Authority, CacheData, CacheKey, CacheResult, OnDemandRequest,
    OnDemandResult, OnDemandType, PendingDetails, PendingOnDemandRequest, Relationships,
    RequestContext, Resource, ResourceLookup, Scope, ShardAssignment, StagedEntry,
    ON_DEMAND_TYPE,
};
use crate::domain::ports::{Agent, CacheStore, CachingAgent, OnDemandAgent, ResourceSource};

/// Construction parameters of a [`ResourceCachingAgent`].
#[derive(Debug, Clone)]
pub struct ResourceAgentConfig {
    pub provider: String,
    pub scope: Scope,
    pub shard: ShardAssignment,
    pub data_types: Vec<AgentDataType>,
    /// Unconsumed staging entries older than this are evicted
    pub on_demand_max_age: Duration,
}

pub struct ResourceCachingAgent {
    agent_type: String,
    config: ResourceAgentConfig,
    source: Arc<dyn ResourceSource>,
}

impl ResourceCachingAgent {
    pub fn new(config: ResourceAgentConfig, source: Arc<dyn ResourceSource>) -> Self {
        let agent_type = format!(
            "{}/{}/ResourceCachingAgent[{}]",
            config.provider, config.scope, config.shard
        );
        Self {
            agent_type,
            config,
            source,
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.config.scope
    }

    pub fn shard(&self) -> ShardAssignment {
        self.config.shard
    }

    fn kinds(&self) -> Vec<String> {
        self.config.data_types.iter().map(|t| t.type_name.clone()).collect()
    }

    fn provides(&self, kind: &str) -> bool {
        self.config.data_types.iter().any(|t| t.type_name == kind)
    }

    fn authoritative_kinds(&self) -> impl Iterator<Item = &str> {
        self.config
            .data_types
            .iter()
            .filter(|t| t.authority == Authority::Authoritative)
            .map(|t| t.type_name.as_str())
    }

    fn resource_key(&self, kind: &str, location: &str, name: &str) -> String {
        CacheKey::new(
            &self.config.provider,
            kind,
            &self.config.scope.account,
            location,
            name,
        )
        .encode()
    }

    /// Whether a parsed key belongs to this agent's provider, scope and shard.
    fn owns_key(&self, key: &str, kind: &str) -> bool {
        CacheKey::parse(key).is_some_and(|parsed| {
            parsed.provider == self.config.provider
                && parsed.type_name == kind
                && self.config.scope.contains_key(&parsed)
                && self.config.shard.owns(key)
        })
    }

    fn to_cache_data(&self, resource: &Resource) -> CacheData {
        let id = self.resource_key(&resource.kind, &resource.location, &resource.name);

        let mut attributes: Attributes = resource.attributes.clone();
        attributes.insert("name".to_string(), resource.name.clone().into());
        if let Some(last_modified) = resource.last_modified {
            attributes.insert(LAST_MODIFIED.to_string(), last_modified.into());
        }

        let relationships: Relationships = resource
            .relationships
            .iter()
            .map(|(kind, names)| {
                let ids = names
                    .iter()
                    .map(|name| self.resource_key(kind, &resource.location, name))
                    .collect::<BTreeSet<_>>();
                (kind.clone(), ids)
            })
            .collect();

        CacheData::new(id, attributes, relationships)
    }

    /// Staging entries under `onDemand` that belong to this agent.
    async fn owned_staged_entries(&self, store: &dyn CacheStore) -> DomainResult<Vec<(String, StagedEntry)>> {
        let mut entries = Vec::new();
        for kind in self.kinds() {
            let glob = CacheKey::scope_glob(
                &self.config.provider,
                &kind,
                Some(&self.config.scope.account),
                None,
            );
            let ids: Vec<String> = store
                .filter_identifiers(ON_DEMAND_TYPE, &glob)
                .await?
                .into_iter()
                .filter(|id| self.owns_key(id, &kind))
                .collect();
            if ids.is_empty() {
                continue;
            }
            for data in store.get_all_by_ids(ON_DEMAND_TYPE, &ids).await? {
                match StagedEntry::from_cache_data(&data) {
                    Ok(entry) => entries.push((kind.clone(), entry)),
                    Err(e) => warn!(
                        agent_type = %self.agent_type,
                        key = %data.id,
                        error = %e,
                        "skipping unreadable on-demand entry"
                    ),
                }
            }
        }
        Ok(entries)
    }

    /// Merge fresh staged entries into `new_data` and decide the fate of every
    /// staged entry. Returns the rewritten entries and the ids to evict.
    async fn process_staged_entries(
        &self,
        store: &dyn CacheStore,
        new_data: &mut BTreeMap<String, BTreeMap<String, CacheData>>,
        start: i64,
        now: i64,
    ) -> DomainResult<(Vec<CacheData>, Vec<String>)> {
        let max_age = i64::try_from(self.config.on_demand_max_age.as_millis()).unwrap_or(i64::MAX);
        let mut keep = Vec::new();
        let mut evict = Vec::new();

        let mut staged = self.owned_staged_entries(store).await?;
        staged.sort_by_key(|(_, entry)| entry.cache_time);

        for (kind, mut entry) in staged {
            if entry.is_consumed() {
                if entry.cache_time <= start {
                    evict.push(entry.id);
                }
                continue;
            }

            if entry.cache_time <= start {
                if now.saturating_sub(entry.cache_time) > max_age {
                    debug!(agent_type = %self.agent_type, key = %entry.id, "evicting abandoned on-demand entry");
                    evict.push(entry.id);
                }
                continue;
            }

            if self.staged_is_newer(store, new_data, &kind, &entry).await? {
                info!(
                    agent_type = %self.agent_type,
                    key = %entry.id,
                    "on-demand entry is overwriting load data entry"
                );
                for (type_name, staged_data) in &entry.cache_results {
                    if !self.provides(type_name) {
                        continue;
                    }
                    let bucket = new_data.entry(type_name.clone()).or_default();
                    for data in staged_data {
                        bucket
                            .entry(data.id.clone())
                            .and_modify(|current| current.merge_from(data))
                            .or_insert_with(|| data.clone());
                    }
                }
            }

            entry.consume(now);
            keep.push(entry.to_cache_data()?);
        }

        Ok((keep, evict))
    }

    /// A staged entry wins unless both it and the current copy carry a
    /// modification time and the current copy is strictly newer.
    async fn staged_is_newer(
        &self,
        store: &dyn CacheStore,
        new_data: &BTreeMap<String, BTreeMap<String, CacheData>>,
        kind: &str,
        entry: &StagedEntry,
    ) -> DomainResult<bool> {
        let Some(staged_modified) = entry.last_modified else {
            return Ok(true);
        };
        let reference = match new_data.get(kind).and_then(|bucket| bucket.get(&entry.id)) {
            Some(data) => Some(data.clone()),
            None => store.get(kind, &entry.id).await?,
        };
        Ok(reference
            .and_then(|data| data.i64_attribute(LAST_MODIFIED))
            .is_none_or(|current| staged_modified >= current))
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl Agent for ResourceCachingAgent {
    fn agent_type(&self) -> &str {
        &self.agent_type
    }

    fn provider_name(&self) -> &str {
        &self.config.provider
    }
}

#[async_trait]
impl CachingAgent for ResourceCachingAgent {
    fn provided_data_types(&self) -> Vec<AgentDataType> {
        let mut types = self.config.data_types.clone();
        types.push(AgentDataType::informative(ON_DEMAND_TYPE));
        types
    }

    async fn load_data(&self, store: &dyn CacheStore, ctx: &RequestContext) -> DomainResult<CacheResult> {
        let start = now_ms();
        info!(agent_type = %self.agent_type, request_id = %ctx.request_id, "agent is starting");

        let resources = self.source.list(&self.config.scope, &self.kinds()).await?;

        let mut new_data: BTreeMap<String, BTreeMap<String, CacheData>> = BTreeMap::new();
        for resource in &resources {
            if !self.provides(&resource.kind) || !self.config.scope.contains_location(&resource.location) {
                continue;
            }
            let data = self.to_cache_data(resource);
            if !self.config.shard.owns(&data.id) {
                continue;
            }
            new_data.entry(resource.kind.clone()).or_default().insert(data.id.clone(), data);
        }

        let (keep_on_demand, evict_on_demand) = self
            .process_staged_entries(store, &mut new_data, start, now_ms())
            .await?;

        let mut result = CacheResult::new();
        for data_type in &self.config.data_types {
            result.touch_type(&data_type.type_name);
        }
        for (kind, entries) in new_data {
            for data in entries.into_values() {
                result.add(kind.clone(), data);
            }
        }

        for kind in self.authoritative_kinds() {
            let glob = CacheKey::scope_glob(&self.config.provider, kind, Some(&self.config.scope.account), None);
            let current: BTreeSet<&str> = result.additions_for(kind).iter().map(|d| d.id.as_str()).collect();
            let stale: Vec<String> = store
                .filter_identifiers(kind, &glob)
                .await?
                .into_iter()
                .filter(|id| self.owns_key(id, kind) && !current.contains(id.as_str()))
                .collect();
            for id in stale {
                result.evict(kind, id);
            }
        }

        for data in keep_on_demand {
            result.add(ON_DEMAND_TYPE, data);
        }
        for id in evict_on_demand {
            result.evict(ON_DEMAND_TYPE, id);
        }
        result.normalize();

        debug!(
            agent_type = %self.agent_type,
            additions = result.addition_count(),
            evictions = result.eviction_count(),
            elapsed_ms = now_ms() - start,
            "agent load complete"
        );
        Ok(result)
    }
}

#[async_trait]
impl OnDemandAgent for ResourceCachingAgent {
    fn handles(&self, on_demand_type: &OnDemandType, cloud_provider: &str) -> bool {
        cloud_provider == self.config.provider
            && match on_demand_type {
                OnDemandType::Manifest => true,
                OnDemandType::Type(kind) => self.provides(kind),
            }
    }

    async fn handle(
        &self,
        store: &dyn CacheStore,
        on_demand_type: &OnDemandType,
        request: &OnDemandRequest,
        ctx: &RequestContext,
    ) -> DomainResult<Option<OnDemandResult>> {
        let Some((kind, name)) = request.target(on_demand_type) else {
            return Ok(None);
        };
        if !self.provides(&kind) || !self.config.scope.contains(&request.account, &request.location) {
            return Ok(None);
        }

        let key = self.resource_key(&kind, &request.location, &name);
        if !self.config.shard.owns(&key) {
            return Ok(None);
        }

        match self.source.get(&request.account, &kind, &request.location, &name).await {
            ResourceLookup::Found(resource) => {
                let data = self.to_cache_data(&resource);
                let mut cache_result = CacheResult::new();
                cache_result.add(kind.clone(), data);

                let staged = StagedEntry::new(
                    key.clone(),
                    now_ms(),
                    resource.last_modified,
                    cache_result.additions.clone(),
                );
                store.put_cache_data(ON_DEMAND_TYPE, staged.to_cache_data()?).await?;
                info!(
                    agent_type = %self.on_demand_agent_type(),
                    key = %key,
                    request_id = %ctx.request_id,
                    "storing on-demand entry"
                );

                Ok(Some(OnDemandResult {
                    agent_type: self.on_demand_agent_type(),
                    cache_result,
                    evictions: BTreeMap::new(),
                }))
            }
            ResourceLookup::NotFound => {
                info!(
                    agent_type = %self.on_demand_agent_type(),
                    key = %key,
                    request_id = %ctx.request_id,
                    "evicting on-demand entry"
                );
                store.evict(ON_DEMAND_TYPE, std::slice::from_ref(&key)).await?;

                let mut evictions = BTreeMap::new();
                evictions.insert(kind, vec![key]);
                Ok(Some(OnDemandResult {
                    agent_type: self.on_demand_agent_type(),
                    cache_result: CacheResult::new(),
                    evictions,
                }))
            }
            ResourceLookup::TransientError(reason) => {
                warn!(
                    agent_type = %self.on_demand_agent_type(),
                    key = %key,
                    reason = %reason,
                    "on-demand lookup failed"
                );
                Err(DomainError::ExternalCallFailed {
                    agent_type: self.on_demand_agent_type(),
                    reason,
                })
            }
        }
    }

    async fn pending_on_demand_requests(&self, store: &dyn CacheStore) -> DomainResult<Vec<PendingOnDemandRequest>> {
        let mut pending = Vec::new();
        for (_, entry) in self.owned_staged_entries(store).await? {
            let Some(key) = CacheKey::parse(&entry.id) else {
                continue;
            };
            pending.push(PendingOnDemandRequest {
                id: entry.id.clone(),
                details: PendingDetails {
                    name: key.name,
                    account: key.account,
                    location: key.location,
                },
                cache_time: entry.cache_time,
                processed_count: entry.processed_count,
                processed_time: entry.processed_time,
            });
        }
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fixture::FixtureResourceSource;
    use crate::adapters::memory::InMemoryCacheStore;
    use serde_json::json;

    fn agent(source: Arc<FixtureResourceSource>) -> ResourceCachingAgent {
        ResourceCachingAgent::new(
            ResourceAgentConfig {
                provider: "kubernetes".to_string(),
                scope: Scope::new("acct", vec!["ns1".to_string()]),
                shard: ShardAssignment::single(),
                data_types: vec![
                    AgentDataType::authoritative("deployment"),
                    AgentDataType::authoritative("pod"),
                    AgentDataType::informative("event"),
                ],
                on_demand_max_age: Duration::from_secs(600),
            },
            source,
        )
    }

    fn staged(key: &str, cache_time: i64, last_modified: Option<i64>, replicas: i64) -> CacheData {
        let mut snapshot = BTreeMap::new();
        snapshot.insert(
            "deployment".to_string(),
            vec![CacheData::empty(key).with_attribute("replicas", replicas)],
        );
        StagedEntry::new(key, cache_time, last_modified, snapshot)
            .to_cache_data()
            .unwrap()
    }

    #[test]
    fn test_agent_type_names_scope_and_shard() {
        let agent = agent(Arc::new(FixtureResourceSource::new("acct", Vec::new())));
        assert_eq!(agent.agent_type(), "kubernetes/acct/ns1/ResourceCachingAgent[1/1]");
        assert_eq!(agent.on_demand_agent_type(), "kubernetes/acct/ns1/ResourceCachingAgent[1/1]-OnDemand");
    }

    #[tokio::test]
    async fn test_load_evicts_only_within_scope() {
        let source = Arc::new(FixtureResourceSource::new(
            "acct",
            vec![Resource::new("deployment", "ns1", "web")],
        ));
        let store = InMemoryCacheStore::new();
        for id in [
            "kubernetes:deployment:acct:ns1:gone",
            "kubernetes:deployment:acct:ns2:other-namespace",
            "kubernetes:deployment:other:ns1:other-account",
            "kubernetes:deployment:acct:ns1",
        ] {
            store.put_cache_data("deployment", CacheData::empty(id)).await.unwrap();
        }

        let result = agent(source).load_data(&store, &RequestContext::system()).await.unwrap();

        assert_eq!(result.additions_for("deployment").len(), 1);
        assert_eq!(
            result.evictions_for("deployment"),
            &["kubernetes:deployment:acct:ns1:gone".to_string()]
        );
        assert!(result.evictions_for("event").is_empty());
    }

    #[tokio::test]
    async fn test_empty_listing_evicts_everything_owned() {
        let source = Arc::new(FixtureResourceSource::new("acct", Vec::new()));
        let store = InMemoryCacheStore::new();
        store
            .put_cache_data("pod", CacheData::empty("kubernetes:pod:acct:ns1:p1"))
            .await
            .unwrap();

        let result = agent(source).load_data(&store, &RequestContext::system()).await.unwrap();

        assert_eq!(result.evictions_for("pod"), &["kubernetes:pod:acct:ns1:p1".to_string()]);
        assert!(result.additions.contains_key("deployment"));
    }

    #[tokio::test]
    async fn test_source_failure_aborts_load() {
        let source = Arc::new(FixtureResourceSource::new("acct", Vec::new()));
        source.set_failing(true);
        let store = InMemoryCacheStore::new();

        let result = agent(source).load_data(&store, &RequestContext::system()).await;
        assert!(matches!(result, Err(DomainError::ExternalCallFailed { .. })));
    }

    #[tokio::test]
    async fn test_relationships_resolve_to_keys() {
        let source = Arc::new(FixtureResourceSource::new(
            "acct",
            vec![Resource::new("deployment", "ns1", "web").with_relationship("pod", "web-1")],
        ));
        let store = InMemoryCacheStore::new();

        let result = agent(source).load_data(&store, &RequestContext::system()).await.unwrap();
        let data = &result.additions_for("deployment")[0];
        assert!(data.relationships["pod"].contains("kubernetes:pod:acct:ns1:web-1"));
        assert_eq!(data.attributes["name"], json!("web"));
    }

    #[tokio::test]
    async fn test_staged_entry_after_start_is_merged_and_consumed() {
        let key = "kubernetes:deployment:acct:ns1:web";
        let source = Arc::new(FixtureResourceSource::new(
            "acct",
            vec![Resource::new("deployment", "ns1", "web")
                .with_attribute("replicas", 1)
                .with_last_modified(100)],
        ));
        let store = InMemoryCacheStore::new();
        let future = now_ms() + 60_000;
        store.put_cache_data(ON_DEMAND_TYPE, staged(key, future, Some(200), 5)).await.unwrap();

        let result = agent(source).load_data(&store, &RequestContext::system()).await.unwrap();

        let deployment = &result.additions_for("deployment")[0];
        assert_eq!(deployment.attributes["replicas"], json!(5));
        let rewritten = StagedEntry::from_cache_data(&result.additions_for(ON_DEMAND_TYPE)[0]).unwrap();
        assert!(rewritten.is_consumed());
    }

    #[tokio::test]
    async fn test_older_staged_copy_does_not_overwrite() {
        let key = "kubernetes:deployment:acct:ns1:web";
        let source = Arc::new(FixtureResourceSource::new(
            "acct",
            vec![Resource::new("deployment", "ns1", "web")
                .with_attribute("replicas", 1)
                .with_last_modified(300)],
        ));
        let store = InMemoryCacheStore::new();
        store
            .put_cache_data(ON_DEMAND_TYPE, staged(key, now_ms() + 60_000, Some(200), 5))
            .await
            .unwrap();

        let result = agent(source).load_data(&store, &RequestContext::system()).await.unwrap();

        assert_eq!(result.additions_for("deployment")[0].attributes["replicas"], json!(1));
        assert_eq!(result.additions_for(ON_DEMAND_TYPE).len(), 1);
    }

    #[tokio::test]
    async fn test_stale_and_consumed_entries() {
        let source = Arc::new(FixtureResourceSource::new("acct", Vec::new()));
        let store = InMemoryCacheStore::new();
        let now = now_ms();

        let stale = "kubernetes:deployment:acct:ns1:stale";
        let abandoned = "kubernetes:deployment:acct:ns1:abandoned";
        let consumed = "kubernetes:deployment:acct:ns1:consumed";
        store.put_cache_data(ON_DEMAND_TYPE, staged(stale, now - 1_000, None, 1)).await.unwrap();
        store
            .put_cache_data(ON_DEMAND_TYPE, staged(abandoned, now - 3_600_000, None, 1))
            .await
            .unwrap();
        let mut done = StagedEntry::from_cache_data(&staged(consumed, now - 1_000, None, 1)).unwrap();
        done.consume(now - 500);
        store.put_cache_data(ON_DEMAND_TYPE, done.to_cache_data().unwrap()).await.unwrap();

        let result = agent(source).load_data(&store, &RequestContext::system()).await.unwrap();

        assert!(result.additions_for("deployment").is_empty());
        assert!(result.additions_for(ON_DEMAND_TYPE).is_empty());
        let mut evicted = result.evictions_for(ON_DEMAND_TYPE).to_vec();
        evicted.sort();
        assert_eq!(evicted, vec![abandoned.to_string(), consumed.to_string()]);
    }

    #[tokio::test]
    async fn test_handle_rejects_requests_outside_scope() {
        let source = Arc::new(FixtureResourceSource::new(
            "acct",
            vec![Resource::new("deployment", "ns2", "web")],
        ));
        let agent = agent(source);
        let store = InMemoryCacheStore::new();
        let ctx = RequestContext::system();

        for request in [
            OnDemandRequest::new("other", "ns1", "deployment web"),
            OnDemandRequest::new("acct", "ns2", "deployment web"),
            OnDemandRequest::new("acct", "ns1", "service web"),
            OnDemandRequest::new("acct", "ns1", "web"),
        ] {
            let result = agent.handle(&store, &OnDemandType::Manifest, &request, &ctx).await.unwrap();
            assert!(result.is_none(), "{request:?} should be rejected");
        }
        assert_eq!(store.len(ON_DEMAND_TYPE).await, 0);
    }

    #[tokio::test]
    async fn test_handle_transient_error_is_reported() {
        let source = Arc::new(FixtureResourceSource::new("acct", Vec::new()));
        source.set_failing(true);
        let store = InMemoryCacheStore::new();
        let request = OnDemandRequest::new("acct", "ns1", "deployment web");

        let result = agent(source)
            .handle(&store, &OnDemandType::Manifest, &request, &RequestContext::system())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_pending_requests_list_staged_entries() {
        let source = Arc::new(FixtureResourceSource::new(
            "acct",
            vec![Resource::new("deployment", "ns1", "web")],
        ));
        let agent = agent(source);
        let store = InMemoryCacheStore::new();
        let request = OnDemandRequest::new("acct", "ns1", "deployment web");
        agent
            .handle(&store, &OnDemandType::Manifest, &request, &RequestContext::system())
            .await
            .unwrap();

        let pending = agent.pending_on_demand_requests(&store).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].details.name, "web");
        assert_eq!(pending[0].details.location, "ns1");
        assert_eq!(pending[0].processed_count, 0);
        assert_eq!(pending[0].processed_time, -1);
    }
}
