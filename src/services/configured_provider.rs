//! Provider assembled from a declarative [`ProviderConfig`].

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AgentDataType, CacheKey, ProviderConfig, ProviderTypeConfig, Scope, SearchResult,
    ShardAssignment,
};
use crate::domain::ports::{
    CacheStore, CachingAgent, KeyParser, OnDemandAgent, Provider, ResourceSource,
    SearchResultHydrator,
};
use crate::services::agents::{ResourceAgentConfig, ResourceCachingAgent};

const BASE_FIELDS: [&str; 5] = ["provider", "type", "account", "location", "name"];

/// Key parser driven by the provider's type catalog.
#[derive(Debug, Clone)]
pub struct StandardKeyParser {
    provider: String,
    location_field: String,
    types: BTreeMap<String, ProviderTypeConfig>,
}

impl StandardKeyParser {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            provider: config.name.clone(),
            location_field: config.location_field.clone(),
            types: config
                .types
                .iter()
                .map(|t| (t.name.clone(), t.clone()))
                .collect(),
        }
    }
}

impl KeyParser for StandardKeyParser {
    fn cloud_provider(&self) -> &str {
        &self.provider
    }

    fn parse_key(&self, key: &str) -> Option<BTreeMap<String, String>> {
        let parsed = CacheKey::parse(key)?;
        if parsed.provider != self.provider {
            return None;
        }

        let mut fields = parsed.field_map();
        if self.location_field != "location" {
            fields.insert(self.location_field.clone(), parsed.location.clone());
        }
        if let Some(type_config) = self.types.get(&parsed.type_name) {
            if let Some(alias) = &type_config.name_alias {
                fields.insert(alias.clone(), parsed.name.clone());
            }
            if type_config.application_from_name {
                if let Some(application) = parsed.name.split('-').next().filter(|a| !a.is_empty()) {
                    fields.insert("application".to_string(), application.to_lowercase());
                }
            }
        }
        Some(fields)
    }

    fn can_parse_type(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    fn can_parse_field(&self, field: &str) -> bool {
        BASE_FIELDS.contains(&field)
            || field == self.location_field
            || self.types.values().any(|t| {
                t.name_alias.as_deref() == Some(field)
                    || (t.application_from_name && field == "application")
            })
    }

    fn name_mapping(&self, type_name: &str) -> Option<String> {
        self.types.get(type_name).and_then(|t| t.name_alias.clone())
    }
}

/// Copies cached scalar attributes into a search result without overriding
/// the fields parsed from its key.
#[derive(Debug, Clone)]
pub struct AttributeHydrator {
    type_name: String,
}

impl AttributeHydrator {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
        }
    }
}

#[async_trait]
impl SearchResultHydrator for AttributeHydrator {
    async fn hydrate_result(
        &self,
        store: &dyn CacheStore,
        mut result: SearchResult,
        id: &str,
    ) -> DomainResult<SearchResult> {
        if let Some(data) = store.get(&self.type_name, id).await? {
            for (key, value) in data.attributes {
                if matches!(value, Value::Object(_) | Value::Array(_)) {
                    continue;
                }
                result.entry(key).or_insert(value);
            }
        }
        Ok(result)
    }
}

pub struct ConfiguredProvider {
    config: ProviderConfig,
    key_parser: Arc<StandardKeyParser>,
    agents: Vec<Arc<ResourceCachingAgent>>,
}

impl ConfiguredProvider {
    /// Build one agent per account shard. Every account needs a resource source.
    pub fn new(
        config: ProviderConfig,
        sources: &BTreeMap<String, Arc<dyn ResourceSource>>,
        on_demand_max_age: Duration,
    ) -> DomainResult<Self> {
        let data_types: Vec<AgentDataType> = config
            .types
            .iter()
            .map(|t| AgentDataType {
                type_name: t.name.clone(),
                authority: t.authority,
            })
            .collect();

        let mut agents = Vec::new();
        for account in &config.accounts {
            let source = sources.get(&account.name).ok_or_else(|| {
                DomainError::ValidationFailed(format!(
                    "provider '{}' has no resource source for account '{}'",
                    config.name, account.name
                ))
            })?;
            for index in 0..account.shards {
                let shard = ShardAssignment::new(index, account.shards).ok_or_else(|| {
                    DomainError::ValidationFailed(format!(
                        "account '{}' must have at least one shard",
                        account.name
                    ))
                })?;
                agents.push(Arc::new(ResourceCachingAgent::new(
                    ResourceAgentConfig {
                        provider: config.name.clone(),
                        scope: Scope::new(&account.name, account.locations.clone()),
                        shard,
                        data_types: data_types.clone(),
                        on_demand_max_age,
                    },
                    Arc::clone(source),
                )));
            }
        }

        Ok(Self {
            key_parser: Arc::new(StandardKeyParser::new(&config)),
            config,
            agents,
        })
    }
}

impl Provider for ConfiguredProvider {
    fn provider_name(&self) -> &str {
        &self.config.name
    }

    fn caching_agents(&self) -> Vec<Arc<dyn CachingAgent>> {
        self.agents
            .iter()
            .map(|a| Arc::clone(a) as Arc<dyn CachingAgent>)
            .collect()
    }

    fn on_demand_agents(&self) -> Vec<Arc<dyn OnDemandAgent>> {
        self.agents
            .iter()
            .map(|a| Arc::clone(a) as Arc<dyn OnDemandAgent>)
            .collect()
    }

    fn key_parser(&self) -> Arc<dyn KeyParser> {
        Arc::clone(&self.key_parser) as Arc<dyn KeyParser>
    }

    fn searchable_types(&self) -> BTreeSet<String> {
        self.config
            .types
            .iter()
            .filter(|t| t.searchable)
            .map(|t| t.name.clone())
            .collect()
    }

    fn url_templates(&self) -> BTreeMap<String, String> {
        self.config
            .types
            .iter()
            .filter_map(|t| t.url_template.clone().map(|url| (t.name.clone(), url)))
            .collect()
    }

    fn search_hydrators(&self) -> BTreeMap<String, Arc<dyn SearchResultHydrator>> {
        self.config
            .types
            .iter()
            .filter(|t| t.hydrate_attributes)
            .map(|t| {
                let hydrator: Arc<dyn SearchResultHydrator> = Arc::new(AttributeHydrator::new(&t.name));
                (t.name.clone(), hydrator)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fixture::FixtureResourceSource;
    use crate::adapters::memory::InMemoryCacheStore;
    use crate::domain::models::{AccountConfig, Authority, CacheData};
    use crate::domain::ports::Agent;
    use serde_json::json;

    fn provider_config() -> ProviderConfig {
        serde_yaml::from_str(
            r"
name: aws
location_field: region
types:
  - name: serverGroups
    name_alias: serverGroup
    application_from_name: true
    url_template: /applications/${application}/clusters/$account/$serverGroup
    hydrate_attributes: true
  - name: instances
  - name: launchConfigs
    authority: informative
    searchable: false
accounts:
  - name: prod
    locations: [us-east-1]
    shards: 2
",
        )
        .unwrap()
    }

    fn sources() -> BTreeMap<String, Arc<dyn ResourceSource>> {
        let mut sources: BTreeMap<String, Arc<dyn ResourceSource>> = BTreeMap::new();
        sources.insert("prod".to_string(), Arc::new(FixtureResourceSource::new("prod", Vec::new())));
        sources
    }

    #[test]
    fn test_parse_key_adds_aliases() {
        let parser = StandardKeyParser::new(&provider_config());
        let fields = parser
            .parse_key("aws:serverGroups:prod:us-east-1:deck-main-v001")
            .unwrap();

        assert_eq!(fields["region"], "us-east-1");
        assert_eq!(fields["serverGroup"], "deck-main-v001");
        assert_eq!(fields["application"], "deck");
        assert!(parser.parse_key("gce:serverGroups:prod:us-east-1:x").is_none());
        assert!(parser.parse_key("aws:serverGroups:prod").is_none());
    }

    #[test]
    fn test_parser_capabilities() {
        let parser = StandardKeyParser::new(&provider_config());
        assert!(parser.can_parse_type("instances"));
        assert!(!parser.can_parse_type("clusters"));
        assert!(parser.can_parse_field("region"));
        assert!(parser.can_parse_field("serverGroup"));
        assert!(parser.can_parse_field("application"));
        assert!(!parser.can_parse_field("stack"));
        assert_eq!(parser.name_mapping("serverGroups").as_deref(), Some("serverGroup"));
        assert_eq!(parser.name_mapping("instances"), None);
    }

    #[test]
    fn test_provider_builds_one_agent_per_shard() {
        let provider = ConfiguredProvider::new(provider_config(), &sources(), Duration::from_secs(60)).unwrap();

        let agents = provider.caching_agents();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].agent_type(), "aws/prod/us-east-1/ResourceCachingAgent[1/2]");
        assert_eq!(agents[1].agent_type(), "aws/prod/us-east-1/ResourceCachingAgent[2/2]");
        assert!(agents[0]
            .provided_data_types()
            .contains(&AgentDataType { type_name: "launchConfigs".to_string(), authority: Authority::Informative }));

        assert_eq!(
            provider.searchable_types().into_iter().collect::<Vec<_>>(),
            vec!["instances".to_string(), "serverGroups".to_string()]
        );
        assert!(provider.url_templates().contains_key("serverGroups"));
        assert!(provider.search_hydrators().contains_key("serverGroups"));
    }

    #[test]
    fn test_missing_source_is_rejected() {
        let mut config = provider_config();
        config.accounts.push(AccountConfig {
            name: "test".to_string(),
            locations: Vec::new(),
            shards: 1,
        });
        assert!(ConfiguredProvider::new(config, &sources(), Duration::from_secs(60)).is_err());
    }

    #[test]
    fn test_default_search_term_and_support() {
        let provider = ConfiguredProvider::new(provider_config(), &sources(), Duration::from_secs(60)).unwrap();
        assert_eq!(provider.build_search_term("instances", "i-1"), "aws:instances:*[iI]-1*");

        let mut filters = BTreeMap::new();
        assert!(provider.supports_search("instances", &filters));
        assert!(!provider.supports_search("launchConfigs", &filters));
        filters.insert("cloudProvider".to_string(), "gce".to_string());
        assert!(!provider.supports_search("instances", &filters));
    }

    #[tokio::test]
    async fn test_hydrator_keeps_parsed_fields() {
        let store = InMemoryCacheStore::new();
        let key = "aws:serverGroups:prod:us-east-1:deck-main-v001";
        store
            .put_cache_data(
                "serverGroups",
                CacheData::empty(key)
                    .with_attribute("account", "spoofed")
                    .with_attribute("instanceCount", 3)
                    .with_attribute("tags", json!({"a": "b"})),
            )
            .await
            .unwrap();

        let mut result = SearchResult::new();
        result.insert("account".to_string(), json!("prod"));

        let hydrated = AttributeHydrator::new("serverGroups")
            .hydrate_result(&store, result, key)
            .await
            .unwrap();
        assert_eq!(hydrated["account"], json!("prod"));
        assert_eq!(hydrated["instanceCount"], json!(3));
        assert!(!hydrated.contains_key("tags"));
    }
}
