//! In-process cache store.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::glob::compile_glob;
use crate::domain::errors::DomainResult;
use crate::domain::models::CacheData;
use crate::domain::ports::CacheStore;

/// Cache store held in memory, ids kept ordered per type.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    types: RwLock<HashMap<String, BTreeMap<String, CacheData>>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries stored under a type.
    pub async fn len(&self, type_name: &str) -> usize {
        self.types.read().await.get(type_name).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, type_name: &str, id: &str) -> DomainResult<Option<CacheData>> {
        let types = self.types.read().await;
        Ok(types.get(type_name).and_then(|entries| entries.get(id)).cloned())
    }

    async fn get_all(&self, type_name: &str) -> DomainResult<Vec<CacheData>> {
        let types = self.types.read().await;
        Ok(types
            .get(type_name)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_all_by_ids(&self, type_name: &str, ids: &[String]) -> DomainResult<Vec<CacheData>> {
        let types = self.types.read().await;
        let Some(entries) = types.get(type_name) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| entries.get(id).cloned()).collect())
    }

    async fn get_identifiers(&self, type_name: &str) -> DomainResult<Vec<String>> {
        let types = self.types.read().await;
        Ok(types
            .get(type_name)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn filter_identifiers(&self, type_name: &str, glob: &str) -> DomainResult<Vec<String>> {
        let matcher = compile_glob(glob)?;
        let types = self.types.read().await;
        Ok(types
            .get(type_name)
            .map(|entries| entries.keys().filter(|id| matcher.is_match(id)).cloned().collect())
            .unwrap_or_default())
    }

    async fn existing_identifiers(&self, type_name: &str, ids: &[String]) -> DomainResult<Vec<String>> {
        let types = self.types.read().await;
        let Some(entries) = types.get(type_name) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter(|id| entries.contains_key(*id)).cloned().collect())
    }

    async fn put_cache_data(&self, type_name: &str, data: CacheData) -> DomainResult<()> {
        let mut types = self.types.write().await;
        types
            .entry(type_name.to_string())
            .or_default()
            .insert(data.id.clone(), data);
        Ok(())
    }

    async fn evict(&self, type_name: &str, ids: &[String]) -> DomainResult<()> {
        let mut types = self.types.write().await;
        if let Some(entries) = types.get_mut(type_name) {
            for id in ids {
                entries.remove(id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::CacheResult;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_then_get_all_returns_same_entry() {
        let store = InMemoryCacheStore::new();
        let data = CacheData::empty("kubernetes:pod:acct:ns1:web-1")
            .with_attribute("phase", "Running")
            .with_relationship("deployment", "kubernetes:deployment:acct:ns1:web");

        store.put_cache_data("pod", data.clone()).await.unwrap();

        let all = store.get_all("pod").await.unwrap();
        assert_eq!(all, vec![data]);
    }

    #[tokio::test]
    async fn test_upsert_replaces_entry() {
        let store = InMemoryCacheStore::new();
        store
            .put_cache_data("pod", CacheData::empty("a").with_attribute("v", 1))
            .await
            .unwrap();
        store
            .put_cache_data("pod", CacheData::empty("a").with_attribute("v", 2))
            .await
            .unwrap();

        let entry = store.get("pod", "a").await.unwrap().unwrap();
        assert_eq!(entry.attributes["v"], json!(2));
        assert_eq!(store.len("pod").await, 1);
    }

    #[tokio::test]
    async fn test_filter_and_existing_identifiers() {
        let store = InMemoryCacheStore::new();
        for id in ["aws:instances:prod:us-east-1:i-1", "aws:instances:test:us-east-1:i-2"] {
            store.put_cache_data("instances", CacheData::empty(id)).await.unwrap();
        }

        let prod = store
            .filter_identifiers("instances", "aws:instances:prod:*")
            .await
            .unwrap();
        assert_eq!(prod, vec!["aws:instances:prod:us-east-1:i-1".to_string()]);

        let existing = store
            .existing_identifiers(
                "instances",
                &["aws:instances:test:us-east-1:i-2".to_string(), "missing".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(existing, vec!["aws:instances:test:us-east-1:i-2".to_string()]);

        assert!(store.filter_identifiers("unknown", "*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_cache_result_applies_additions_and_evictions() {
        let store = InMemoryCacheStore::new();
        store.put_cache_data("pod", CacheData::empty("old")).await.unwrap();

        let mut result = CacheResult::new();
        result.add("pod", CacheData::empty("new"));
        result.evict("pod", "old");
        store.put_cache_result(&result).await.unwrap();

        assert_eq!(store.get_identifiers("pod").await.unwrap(), vec!["new".to_string()]);
    }

    #[tokio::test]
    async fn test_evict_unknown_ids_is_a_noop() {
        let store = InMemoryCacheStore::new();
        store.evict("pod", &["nothing".to_string()]).await.unwrap();
        assert_eq!(store.len("pod").await, 0);
    }
}
