//! Key-based search across every registered provider.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::shadow_index::ShadowIndex;
use super::template::TemplateResolver;
use crate::domain::errors::DomainResult;
use crate::domain::models::search::{CLOUD_PROVIDER_FILTER, DEFAULT_PLATFORM};
use crate::domain::models::{RequestContext, SearchQuery, SearchResult, SearchResultSet};
use crate::domain::ports::{CacheStore, KeyParser, PermissionEvaluator, PermissionTarget, Provider};
use crate::services::provider_registry::ProviderRegistry;

/// A candidate key and the type it was found under.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Match {
    type_name: String,
    key: String,
}

pub struct SearchIndex {
    store: Arc<dyn CacheStore>,
    providers: Vec<Arc<dyn Provider>>,
    permissions: Arc<dyn PermissionEvaluator>,
    shadow: Option<Arc<ShadowIndex>>,
    templates: TemplateResolver,
}

impl SearchIndex {
    pub fn new(registry: &ProviderRegistry, permissions: Arc<dyn PermissionEvaluator>) -> DomainResult<Self> {
        Ok(Self {
            store: registry.store(),
            providers: registry.providers().to_vec(),
            permissions,
            shadow: None,
            templates: TemplateResolver::new()?,
        })
    }

    pub fn with_shadow_index(mut self, shadow: Arc<ShadowIndex>) -> Self {
        self.shadow = Some(shadow);
        self
    }

    /// Every type some provider offers to search.
    pub fn searchable_types(&self) -> BTreeSet<String> {
        self.providers.iter().flat_map(|p| p.searchable_types()).collect()
    }

    pub async fn search(&self, query: &SearchQuery, ctx: &RequestContext) -> DomainResult<SearchResultSet> {
        let effective_query = self.effective_query(query);
        let normalized = effective_query.to_lowercase();

        let searchable = self.searchable_types();
        let types: Vec<String> = if query.types.is_empty() {
            searchable.into_iter().collect()
        } else {
            query
                .types
                .iter()
                .filter(|t| searchable.contains(*t))
                .cloned()
                .collect()
        };

        let mut matches = Vec::new();
        for type_name in &types {
            for key in self.candidates(type_name, &normalized, &query.filters).await? {
                if self.filters_match(type_name, &key, &query.filters) {
                    matches.push(Match {
                        type_name: type_name.clone(),
                        key,
                    });
                }
            }
        }

        rank(&mut matches, &normalized);
        let permitted: Vec<Match> = matches
            .into_iter()
            .filter(|m| self.is_permitted(m, ctx))
            .collect();

        let mut total_matches = permitted.len();
        let (start, end) = query.page_bounds(total_matches);
        info!(
            total_matches,
            page_number = query.page_number,
            page_size = query.page_size,
            request_id = %ctx.request_id,
            "paginating search results"
        );

        let mut results = Vec::with_capacity(end - start);
        for m in &permitted[start..end] {
            match self.hydrate(m).await {
                Some(result) => results.push(result),
                None => total_matches -= 1,
            }
        }

        Ok(SearchResultSet {
            total_matches,
            platform: DEFAULT_PLATFORM.to_string(),
            query: effective_query,
            page_number: query.page_number,
            page_size: query.page_size,
            results,
        })
    }

    /// The query, or the value of the first filter a key parser understands.
    fn effective_query(&self, query: &SearchQuery) -> String {
        let trimmed = query.query.trim();
        if !trimmed.is_empty() || query.filters.is_empty() {
            return trimmed.to_string();
        }
        query
            .filters
            .iter()
            .filter(|(field, _)| field.as_str() != CLOUD_PROVIDER_FILTER)
            .find(|(field, _)| self.providers.iter().any(|p| p.key_parser().can_parse_field(field)))
            .map(|(_, value)| value.split(',').next().unwrap_or_default().trim().to_string())
            .unwrap_or_default()
    }

    async fn candidates(
        &self,
        type_name: &str,
        normalized: &str,
        filters: &BTreeMap<String, String>,
    ) -> DomainResult<Vec<String>> {
        if let Some(shadow) = self.shadow.as_ref().filter(|s| s.indexes(type_name)) {
            if let Some(ids) = shadow.lookup(type_name, normalized).await {
                let ids: Vec<String> = ids
                    .into_iter()
                    .filter(|id| self.provider_filter_allows(id, filters))
                    .collect();
                return self.store.existing_identifiers(type_name, &ids).await;
            }
            debug!(type_name, "shadow index not ready, falling back to store");
        }

        let mut ids = BTreeSet::new();
        for provider in self.providers.iter().filter(|p| p.supports_search(type_name, filters)) {
            let term = provider.build_search_term(type_name, normalized);
            ids.extend(self.store.filter_identifiers(type_name, &term).await?);
        }
        let ids: Vec<String> = ids.into_iter().collect();
        self.store.existing_identifiers(type_name, &ids).await
    }

    /// Shadow hits bypass provider term building, so the structural
    /// `cloudProvider` filter is applied to the key's provider field here.
    fn provider_filter_allows(&self, key: &str, filters: &BTreeMap<String, String>) -> bool {
        filters.get(CLOUD_PROVIDER_FILTER).is_none_or(|provider| {
            key.split(':')
                .next()
                .is_some_and(|p| p.eq_ignore_ascii_case(provider))
        })
    }

    fn parser_for(&self, type_name: &str, key: &str, cloud_provider: Option<&str>) -> Option<Arc<dyn KeyParser>> {
        self.providers
            .iter()
            .map(|p| p.key_parser())
            .filter(|kp| cloud_provider.is_none_or(|cp| kp.cloud_provider().eq_ignore_ascii_case(cp)))
            .find(|kp| kp.can_parse_type(type_name) && (cloud_provider.is_some() || kp.parse_key(key).is_some()))
    }

    /// Every filter except `cloudProvider` must match a parsed field, or the
    /// type's name alias. Alternatives are comma separated.
    fn filters_match(&self, type_name: &str, key: &str, filters: &BTreeMap<String, String>) -> bool {
        if filters.is_empty() {
            return true;
        }
        let cloud_provider = filters.get(CLOUD_PROVIDER_FILTER).map(String::as_str);
        let Some(parser) = self.parser_for(type_name, key, cloud_provider) else {
            debug!(type_name, key, "no key parser, filters pass");
            return true;
        };
        let Some(parsed) = parser.parse_key(key) else {
            return false;
        };
        let alias = parser.name_mapping(type_name);

        filters
            .iter()
            .filter(|(field, _)| field.as_str() != CLOUD_PROVIDER_FILTER)
            .all(|(field, value)| {
                let accepted: Vec<&str> = value.split(',').map(str::trim).collect();
                let hit = |name: &str| parsed.get(name).is_some_and(|v| accepted.contains(&v.as_str()));
                hit(field.as_str()) || alias.as_deref().is_some_and(hit)
            })
    }

    /// Application and account read checks. Keys nobody can parse, and
    /// failed permission lookups, are let through with a warning.
    fn is_permitted(&self, m: &Match, ctx: &RequestContext) -> bool {
        let Some(parsed) = self
            .parser_for(&m.type_name, &m.key, None)
            .and_then(|parser| parser.parse_key(&m.key))
        else {
            warn!(key = %m.key, type_name = %m.type_name, "unparseable search result, allowing");
            return true;
        };

        let checks = [
            (PermissionTarget::Application, parsed.get("application")),
            (PermissionTarget::Account, parsed.get("account")),
        ];
        let permitted = checks
            .into_iter()
            .filter_map(|(target, name)| name.filter(|n| !n.is_empty()).map(|n| (target, n)))
            .all(|(target, name)| match self.permissions.can_read(ctx, target, name) {
                Ok(allowed) => allowed,
                Err(e) => {
                    warn!(key = %m.key, error = %e, "permission lookup failed, allowing");
                    true
                }
            });
        permitted
    }

    /// Parsed fields, augmented by the type's hydrator and resolved URL.
    /// `None` drops the result.
    async fn hydrate(&self, m: &Match) -> Option<SearchResult> {
        let parser = self.parser_for(&m.type_name, &m.key, None)?;
        let parsed = parser.parse_key(&m.key)?;

        let mut result: SearchResult = parsed
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        result
            .entry("provider".to_string())
            .or_insert_with(|| Value::String(DEFAULT_PLATFORM.to_string()));
        result.insert("type".to_string(), Value::String(m.type_name.clone()));

        let provider = self
            .providers
            .iter()
            .find(|p| p.provider_name().eq_ignore_ascii_case(parser.cloud_provider()));

        if let Some(hydrator) = provider.and_then(|p| p.search_hydrators().get(&m.type_name).cloned()) {
            match hydrator
                .hydrate_result(self.store.as_ref(), result.clone(), &m.key)
                .await
            {
                Ok(hydrated) => result = hydrated,
                Err(e) => warn!(key = %m.key, error = %e, "hydration failed, using parsed fields"),
            }
        }

        if let Some(template) = provider.and_then(|p| p.url_templates().get(&m.type_name).cloned()) {
            let url = self.templates.resolve(&template, &result);
            result.insert("url".to_string(), Value::String(url));
        }
        Some(result)
    }
}

/// Earlier occurrence of the query in the key (after the provider prefix)
/// ranks first; ties break on that key suffix, then the full key.
fn rank(matches: &mut [Match], normalized: &str) {
    matches.sort_by_cached_key(|m| {
        let lower = m.key.to_lowercase();
        let suffix = lower.find(':').map_or(lower.as_str(), |i| &lower[i..]).to_string();
        let position = suffix.find(normalized).unwrap_or(usize::MAX);
        (position, suffix, m.key.clone())
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matched(key: &str) -> Match {
        Match {
            type_name: "instances".to_string(),
            key: key.to_string(),
        }
    }

    #[test]
    fn test_rank_by_position_then_key() {
        let mut matches = vec![
            matched("aws:instances:prod:us-east-1:xx-web"),
            matched("aws:instances:web:us-east-1:a"),
            matched("aws:instances:prod:us-east-1:web"),
            matched("aws:instances:prod:us-east-1:b-web"),
        ];
        rank(&mut matches, "web");
        let keys: Vec<&str> = matches.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "aws:instances:web:us-east-1:a",
                "aws:instances:prod:us-east-1:web",
                "aws:instances:prod:us-east-1:b-web",
                "aws:instances:prod:us-east-1:xx-web",
            ]
        );
    }

    #[test]
    fn test_rank_is_case_insensitive() {
        let mut matches = vec![matched("aws:instances:p:r:zzWEB"), matched("aws:instances:p:r:WEB")];
        rank(&mut matches, "web");
        assert_eq!(matches[0].key, "aws:instances:p:r:WEB");
    }
}
