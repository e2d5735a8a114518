//! Demo configuration driven end to end: load, cache, refresh on demand, search.

use std::path::Path;
use std::sync::Arc;

use cats::adapters::memory::{InMemoryAgentLock, InMemoryCacheStore};
use cats::cli::context::{build_registry, MissingSources};
use cats::domain::models::{OnDemandRequest, OnDemandType, RequestContext, SearchQuery};
use cats::domain::ports::{CacheStore, ContextPermissionEvaluator};
use cats::services::scheduler::{CacheExecution, NodeIdentity, StaticNodeStatus};
use cats::services::{
    build_scheduler, OnDemandCacheStatus, OnDemandCacheUpdater, SchedulerDeps, SearchIndex,
};
use cats::ConfigLoader;

#[tokio::test]
async fn test_demo_configuration_round_trip() {
    let config = ConfigLoader::load_from_file("demos/config.yaml").unwrap();
    assert_eq!(config.providers.len(), 1);

    let store: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::new());
    let registry = build_registry(
        &config,
        Arc::clone(&store),
        Some(Path::new("demos/fixtures.yaml")),
        MissingSources::Reject,
    )
    .unwrap();
    assert_eq!(registry.caching_agents().len(), 2);

    let scheduler = build_scheduler(
        &config.scheduler,
        SchedulerDeps {
            lock: Arc::new(InMemoryAgentLock::new()),
            node: NodeIdentity::new("demo"),
            node_status: Arc::new(StaticNodeStatus::default()),
            execution: Arc::new(CacheExecution::new(Arc::clone(&store))),
        },
    )
    .unwrap();
    for agent in registry.caching_agents() {
        scheduler.schedule(agent).await;
    }
    assert_eq!(scheduler.run_once().await, 2);
    scheduler.wait_idle().await;
    assert_eq!(store.get_identifiers("deployment").await.unwrap().len(), 2);

    let updater = OnDemandCacheUpdater::from_registry(&registry);
    let outcome = updater
        .handle(
            &OnDemandType::Type("deployment".to_string()),
            "kubernetes",
            &OnDemandRequest::new("acct", "ns2", "checkout"),
            &RequestContext::system(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.status, OnDemandCacheStatus::Successful);
    assert_eq!(outcome.results.len(), 1);

    let index = SearchIndex::new(&registry, Arc::new(ContextPermissionEvaluator)).unwrap();
    let results = index
        .search(&SearchQuery::new("check"), &RequestContext::system())
        .await
        .unwrap();
    assert_eq!(results.total_matches, 1);
    let result = &results.results[0];
    assert_eq!(result["namespace"], "ns2");
    assert_eq!(result["replicas"], 1);
    assert_eq!(result["url"], "/clusters/acct/ns2/deployments/checkout");
}
