//! Search ranking, pagination, filters and permissions over a configured provider.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use cats::adapters::fixture::FixtureResourceSource;
use cats::adapters::memory::InMemoryCacheStore;
use cats::domain::errors::{DomainError, DomainResult};
use cats::domain::models::{CacheData, CacheKey, ProviderConfig, RequestContext, SearchQuery};
use cats::domain::ports::{
    CacheStore, ContextPermissionEvaluator, PermissionEvaluator, PermissionTarget, ResourceSource,
};
use cats::services::{ConfiguredProvider, ProviderRegistry, SearchIndex, ShadowIndex};
use proptest::prelude::*;

fn provider_config() -> ProviderConfig {
    serde_yaml::from_str(
        r"
name: aws
location_field: region
types:
  - name: instances
  - name: serverGroups
    name_alias: serverGroup
    application_from_name: true
    url_template: /applications/${application}/clusters/$account/$serverGroup
accounts:
  - name: prod
    locations: [us-east-1]
  - name: test
    locations: [us-west-2]
",
    )
    .unwrap()
}

fn registry(store: Arc<InMemoryCacheStore>) -> ProviderRegistry {
    let mut sources: BTreeMap<String, Arc<dyn ResourceSource>> = BTreeMap::new();
    for account in ["prod", "test"] {
        sources.insert(account.to_string(), Arc::new(FixtureResourceSource::new(account, Vec::new())));
    }
    let provider = ConfiguredProvider::new(provider_config(), &sources, Duration::from_secs(600)).unwrap();
    ProviderRegistry::new(store).with_provider(Arc::new(provider))
}

fn instance_key(account: &str, region: &str, name: &str) -> String {
    CacheKey::new("aws", "instances", account, region, name).encode()
}

async fn store_with_instances(names: &[String]) -> Arc<InMemoryCacheStore> {
    let store = Arc::new(InMemoryCacheStore::new());
    for name in names {
        store
            .put_cache_data("instances", CacheData::empty(instance_key("prod", "us-east-1", name)))
            .await
            .unwrap();
    }
    store
}

fn index(store: &Arc<InMemoryCacheStore>) -> SearchIndex {
    SearchIndex::new(&registry(Arc::clone(store)), Arc::new(ContextPermissionEvaluator)).unwrap()
}

fn names(results: &[serde_json::Map<String, serde_json::Value>]) -> Vec<String> {
    results
        .iter()
        .map(|r| r["name"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn test_pagination_over_25_matches() {
    let all: Vec<String> = (0..25).map(|i| format!("i-{i:02}")).collect();
    let store = store_with_instances(&all).await;
    let index = index(&store);

    let page = |n| SearchQuery::new("i-").with_types(["instances"]).page(n, 10);

    let second = index.search(&page(2), &RequestContext::system()).await.unwrap();
    assert_eq!(second.total_matches, 25);
    assert_eq!(names(&second.results), all[10..20].to_vec());

    let third = index.search(&page(3), &RequestContext::system()).await.unwrap();
    assert_eq!(names(&third.results), all[20..25].to_vec());

    let fourth = index.search(&page(4), &RequestContext::system()).await.unwrap();
    assert!(fourth.results.is_empty());
    assert_eq!(fourth.total_matches, 25);
    assert_eq!(fourth.platform, "aws");
}

#[tokio::test]
async fn test_earlier_occurrence_ranks_first() {
    let store = store_with_instances(&["zz-deck".to_string(), "deck-zz".to_string(), "a-deck".to_string()]).await;

    let results = index(&store)
        .search(&SearchQuery::new("deck"), &RequestContext::system())
        .await
        .unwrap();

    assert_eq!(names(&results.results), vec!["deck-zz", "a-deck", "zz-deck"]);
}

#[tokio::test]
async fn test_results_carry_parsed_fields_and_url() {
    let store = Arc::new(InMemoryCacheStore::new());
    let key = CacheKey::new("aws", "serverGroups", "prod", "us-east-1", "deck-main-v001").encode();
    store.put_cache_data("serverGroups", CacheData::empty(&key)).await.unwrap();

    let results = index(&store)
        .search(&SearchQuery::new("deck"), &RequestContext::system())
        .await
        .unwrap();

    assert_eq!(results.total_matches, 1);
    let result = &results.results[0];
    assert_eq!(result["provider"], "aws");
    assert_eq!(result["type"], "serverGroups");
    assert_eq!(result["region"], "us-east-1");
    assert_eq!(result["application"], "deck");
    assert_eq!(result["url"], "/applications/deck/clusters/prod/deck-main-v001");
}

#[tokio::test]
async fn test_filters_accept_comma_separated_alternatives() {
    let store = Arc::new(InMemoryCacheStore::new());
    for (account, region) in [("prod", "us-east-1"), ("test", "us-west-2")] {
        store
            .put_cache_data("instances", CacheData::empty(instance_key(account, region, "i-1")))
            .await
            .unwrap();
    }
    let index = index(&store);

    let only_test = SearchQuery::new("i-1").with_filter("account", "test");
    let results = index.search(&only_test, &RequestContext::system()).await.unwrap();
    assert_eq!(results.total_matches, 1);
    assert_eq!(results.results[0]["account"], "test");

    let both = SearchQuery::new("i-1").with_filter("account", "prod, test");
    let results = index.search(&both, &RequestContext::system()).await.unwrap();
    assert_eq!(results.total_matches, 2);

    let other_provider = SearchQuery::new("i-1").with_filter("cloudProvider", "gce");
    let results = index.search(&other_provider, &RequestContext::system()).await.unwrap();
    assert_eq!(results.total_matches, 0);
}

#[tokio::test]
async fn test_unauthorized_accounts_are_filtered_before_pagination() {
    let store = Arc::new(InMemoryCacheStore::new());
    for i in 0..5 {
        store
            .put_cache_data("instances", CacheData::empty(instance_key("prod", "us-east-1", &format!("i-{i}"))))
            .await
            .unwrap();
        store
            .put_cache_data("instances", CacheData::empty(instance_key("test", "us-west-2", &format!("i-{i}"))))
            .await
            .unwrap();
    }

    let ctx = RequestContext::for_user("alice", ["test".to_string()]);
    let results = index(&store)
        .search(&SearchQuery::new("i-").page(1, 5), &ctx)
        .await
        .unwrap();

    assert_eq!(results.total_matches, 5);
    assert_eq!(results.results.len(), 5);
    assert!(results.results.iter().all(|r| r["account"] == "test"));
}

#[tokio::test]
async fn test_shadow_index_serves_same_results() {
    let all: Vec<String> = (0..12).map(|i| format!("i-{i:02}")).collect();
    let store = store_with_instances(&all).await;

    let shadow = Arc::new(ShadowIndex::new(["instances".to_string()]));
    shadow.refresh(store.as_ref()).await.unwrap();
    let shadowed = index(&store).with_shadow_index(shadow);

    let query = SearchQuery::new("I-0").with_types(["instances"]).page(1, 20);
    let direct = index(&store).search(&query, &RequestContext::system()).await.unwrap();
    let via_shadow = shadowed.search(&query, &RequestContext::system()).await.unwrap();

    assert_eq!(direct.total_matches, 10);
    assert_eq!(names(&via_shadow.results), names(&direct.results));
}

#[tokio::test]
async fn test_shadow_index_ignores_provider_and_type_prefix() {
    let all: Vec<String> = (0..3).map(|i| format!("i-{i}")).collect();
    let store = store_with_instances(&all).await;

    let shadow = Arc::new(ShadowIndex::new(["instances".to_string()]));
    shadow.refresh(store.as_ref()).await.unwrap();
    let shadowed = index(&store).with_shadow_index(shadow);

    for term in ["instances", "aws"] {
        let query = SearchQuery::new(term).with_types(["instances"]);
        let direct = index(&store).search(&query, &RequestContext::system()).await.unwrap();
        let via_shadow = shadowed.search(&query, &RequestContext::system()).await.unwrap();

        assert_eq!(direct.total_matches, 0, "direct search for {term}");
        assert_eq!(via_shadow.total_matches, 0, "shadow search for {term}");
    }
}

/// Evaluator whose backing permission service is unreachable.
struct UnavailablePermissions;

impl PermissionEvaluator for UnavailablePermissions {
    fn can_read(&self, _ctx: &RequestContext, _target: PermissionTarget, name: &str) -> DomainResult<bool> {
        Err(DomainError::PermissionLookupFailed(format!("no answer for {name}")))
    }
}

#[tokio::test]
async fn test_failed_permission_lookups_let_results_through() {
    let all: Vec<String> = (0..3).map(|i| format!("i-{i}")).collect();
    let store = store_with_instances(&all).await;
    let index = SearchIndex::new(&registry(Arc::clone(&store)), Arc::new(UnavailablePermissions)).unwrap();

    let ctx = RequestContext::for_user("alice", Vec::<String>::new());
    let results = index.search(&SearchQuery::new("i-"), &ctx).await.unwrap();

    assert_eq!(results.total_matches, 3);
    assert_eq!(names(&results.results), all);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_ranking_follows_match_position(prefixes in proptest::collection::btree_set("[a-c]{0,4}", 1..8)) {
        let names: Vec<String> = prefixes.iter().map(|p| format!("{p}xyz")).collect();

        let ranked = tokio_test::block_on(async {
            let store = store_with_instances(&names).await;
            let results = index(&store)
                .search(&SearchQuery::new("xyz").page(1, 50), &RequestContext::system())
                .await
                .unwrap();
            self::names(&results.results)
        });

        let mut expected = names.clone();
        expected.sort_by_key(|name| (name.len(), instance_key("prod", "us-east-1", name)));
        prop_assert_eq!(ranked, expected);
    }
}
