use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{CacheData, CacheResult};

/// Typed key/value + relationship store.
///
/// Safe for concurrent readers. Writers are expected to be single-writer per
/// scope; the scheduler enforces that, not the store. There are no cross-type
/// transactions.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get one entry
    async fn get(&self, type_name: &str, id: &str) -> DomainResult<Option<CacheData>>;

    /// Get every entry of a type
    async fn get_all(&self, type_name: &str) -> DomainResult<Vec<CacheData>>;

    /// Get the entries of a type among `ids`; missing ids are skipped
    async fn get_all_by_ids(&self, type_name: &str, ids: &[String]) -> DomainResult<Vec<CacheData>>;

    /// Every id stored under a type
    async fn get_identifiers(&self, type_name: &str) -> DomainResult<Vec<String>>;

    /// Ids of a type matching a glob (`*`, `?`, `[...]`)
    async fn filter_identifiers(&self, type_name: &str, glob: &str) -> DomainResult<Vec<String>>;

    /// The subset of `ids` present under a type
    async fn existing_identifiers(&self, type_name: &str, ids: &[String]) -> DomainResult<Vec<String>>;

    /// Upsert one entry
    async fn put_cache_data(&self, type_name: &str, data: CacheData) -> DomainResult<()>;

    /// Remove entries; unknown ids are ignored
    async fn evict(&self, type_name: &str, ids: &[String]) -> DomainResult<()>;

    /// Merge an agent result: upsert every addition, then apply evictions.
    async fn put_cache_result(&self, result: &CacheResult) -> DomainResult<()> {
        for (type_name, entries) in &result.additions {
            for data in entries {
                self.put_cache_data(type_name, data.clone()).await?;
            }
        }
        for (type_name, ids) in &result.evictions {
            if !ids.is_empty() {
                self.evict(type_name, ids).await?;
            }
        }
        Ok(())
    }
}
