//! Output of one agent execution.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::cache_data::CacheData;

/// Additions and evictions produced by an agent, grouped by type.
///
/// Invariant (kept by [`CacheResult::normalize`]): for any type, no id is both
/// added and evicted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheResult {
    #[serde(default)]
    pub additions: BTreeMap<String, Vec<CacheData>>,
    #[serde(default)]
    pub evictions: BTreeMap<String, Vec<String>>,
}

impl CacheResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, type_name: impl Into<String>, data: CacheData) {
        self.additions.entry(type_name.into()).or_default().push(data);
    }

    pub fn evict(&mut self, type_name: impl Into<String>, id: impl Into<String>) {
        self.evictions.entry(type_name.into()).or_default().push(id.into());
    }

    /// Ensure an (possibly empty) additions bucket exists for a type.
    pub fn touch_type(&mut self, type_name: impl Into<String>) {
        self.additions.entry(type_name.into()).or_default();
    }

    pub fn additions_for(&self, type_name: &str) -> &[CacheData] {
        self.additions.get(type_name).map_or(&[], Vec::as_slice)
    }

    pub fn evictions_for(&self, type_name: &str) -> &[String] {
        self.evictions.get(type_name).map_or(&[], Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.additions.values().all(Vec::is_empty) && self.evictions.values().all(Vec::is_empty)
    }

    /// Total number of entries added across all types.
    pub fn addition_count(&self) -> usize {
        self.additions.values().map(Vec::len).sum()
    }

    pub fn eviction_count(&self) -> usize {
        self.evictions.values().map(Vec::len).sum()
    }

    /// Drop evictions that are also additions for the same type, de-duplicate
    /// eviction ids and remove empty eviction buckets.
    pub fn normalize(&mut self) {
        for (type_name, ids) in &mut self.evictions {
            let added: BTreeSet<&str> = self
                .additions
                .get(type_name)
                .map(|data| data.iter().map(|d| d.id.as_str()).collect())
                .unwrap_or_default();
            let mut seen = BTreeSet::new();
            ids.retain(|id| !added.contains(id.as_str()) && seen.insert(id.clone()));
        }
        self.evictions.retain(|_, ids| !ids.is_empty());
    }
}
