use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::domain::errors::DomainResult;
use crate::domain::models::keys::escape_glob;
use crate::domain::models::search::CLOUD_PROVIDER_FILTER;
use crate::domain::models::SearchResult;
use crate::domain::ports::{CacheStore, CachingAgent, OnDemandAgent};

/// Parses flat cache keys of one provider into field maps.
pub trait KeyParser: Send + Sync {
    fn cloud_provider(&self) -> &str;

    /// Field map of a key; `None` if the key is not ours or malformed
    fn parse_key(&self, key: &str) -> Option<BTreeMap<String, String>>;

    fn can_parse_type(&self, type_name: &str) -> bool;

    fn can_parse_field(&self, field: &str) -> bool;

    /// Type-specific alias of the `name` field, used by search filters
    fn name_mapping(&self, _type_name: &str) -> Option<String> {
        None
    }
}

/// Augments a search result with data from the cache store.
#[async_trait]
pub trait SearchResultHydrator: Send + Sync {
    async fn hydrate_result(
        &self,
        store: &dyn CacheStore,
        result: SearchResult,
        id: &str,
    ) -> DomainResult<SearchResult>;
}

/// Capability interface of a cloud provider, collected into a registry at startup.
pub trait Provider: Send + Sync {
    fn provider_name(&self) -> &str;

    fn caching_agents(&self) -> Vec<Arc<dyn CachingAgent>>;

    fn on_demand_agents(&self) -> Vec<Arc<dyn OnDemandAgent>>;

    fn key_parser(&self) -> Arc<dyn KeyParser>;

    /// Types offered to search
    fn searchable_types(&self) -> BTreeSet<String>;

    /// URL templates keyed by type
    fn url_templates(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Hydrators keyed by type
    fn search_hydrators(&self) -> BTreeMap<String, Arc<dyn SearchResultHydrator>> {
        BTreeMap::new()
    }

    /// Whether this provider takes part in a search of `type_name`.
    fn supports_search(&self, type_name: &str, filters: &BTreeMap<String, String>) -> bool {
        let provider_matches = filters
            .get(CLOUD_PROVIDER_FILTER)
            .is_none_or(|p| p.eq_ignore_ascii_case(self.provider_name()));
        provider_matches && self.searchable_types().contains(type_name)
    }

    /// Glob over this provider's keys of `type_name` containing `query`,
    /// matched case-insensitively.
    fn build_search_term(&self, type_name: &str, query: &str) -> String {
        format!(
            "{}:{}:*{}*",
            escape_glob(self.provider_name()),
            escape_glob(type_name),
            case_insensitive_glob(query)
        )
    }
}

/// Glob matching `value` literally, ignoring ASCII case.
pub fn case_insensitive_glob(value: &str) -> String {
    let mut out = String::with_capacity(value.len() * 4);
    for c in value.chars() {
        if c.is_ascii_alphabetic() {
            out.push('[');
            out.push(c.to_ascii_lowercase());
            out.push(c.to_ascii_uppercase());
            out.push(']');
        } else {
            out.push_str(&escape_glob(&c.to_string()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_glob() {
        assert_eq!(case_insensitive_glob("Web-1"), "[wW][eE][bB]-1");
        assert_eq!(case_insensitive_glob("a*"), "[aA][*]");
        assert_eq!(case_insensitive_glob(""), "");
    }
}
