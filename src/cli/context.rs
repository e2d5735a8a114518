//! Wiring shared by the CLI commands: configuration, store and providers.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::fixture::{FixtureResourceSource, FixtureSet};
use crate::adapters::sqlite::{initialize_database, SqliteAgentLock, SqliteCacheStore};
use crate::domain::models::Config;
use crate::domain::ports::{AgentLockClient, CacheStore, ResourceSource};
use crate::infrastructure::config::ConfigLoader;
use crate::services::{ConfiguredProvider, ProviderRegistry};

/// How accounts without fixture data are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingSources {
    /// Every configured account must have a resource source.
    Reject,
    /// Accounts without fixtures get an empty source; used by read-only commands.
    Empty,
}

/// Load configuration from an explicit file or the `.cats/` hierarchy.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Everything a command needs to talk to the cache.
pub struct CliContext {
    pub config: Config,
    pub store: Arc<dyn CacheStore>,
    pub lock: Arc<dyn AgentLockClient>,
    pub registry: ProviderRegistry,
}

impl CliContext {
    /// Open the configured database and register one provider per config entry.
    pub async fn open(config: Config, fixtures: Option<&Path>, missing: MissingSources) -> Result<Self> {
        let pool = initialize_database(&config.database)
            .await
            .with_context(|| format!("Failed to open cache database at {}", config.database.path))?;

        let store: Arc<dyn CacheStore> = Arc::new(SqliteCacheStore::new(pool.clone()));
        let lock: Arc<dyn AgentLockClient> = Arc::new(SqliteAgentLock::new(pool));
        let registry = build_registry(&config, Arc::clone(&store), fixtures, missing)?;

        Ok(Self {
            config,
            store,
            lock,
            registry,
        })
    }
}

/// Register a [`ConfiguredProvider`] per configured provider over `store`.
pub fn build_registry(
    config: &Config,
    store: Arc<dyn CacheStore>,
    fixtures: Option<&Path>,
    missing: MissingSources,
) -> Result<ProviderRegistry> {
    let mut sources: BTreeMap<String, Arc<dyn ResourceSource>> = match fixtures {
        Some(path) => FixtureSet::load(path)
            .with_context(|| format!("Failed to load fixtures from {}", path.display()))?
            .into_sources()
            .into_iter()
            .map(|(account, source)| (account, source as Arc<dyn ResourceSource>))
            .collect(),
        None => BTreeMap::new(),
    };

    if missing == MissingSources::Empty {
        for account in config.providers.iter().flat_map(|p| &p.accounts) {
            sources.entry(account.name.clone()).or_insert_with(|| {
                Arc::new(FixtureResourceSource::new(
                    account.name.clone(),
                    Vec::new(),
                ))
            });
        }
    }

    let max_age = Duration::from_secs(config.on_demand.max_age_seconds);
    let mut registry = ProviderRegistry::new(store);
    for provider in &config.providers {
        let configured = ConfiguredProvider::new(provider.clone(), &sources, max_age)
            .with_context(|| format!("Failed to build provider '{}'", provider.name))?;
        registry.register(Arc::new(configured));
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryCacheStore;

    fn config() -> Config {
        serde_yaml::from_str(
            r"
providers:
  - name: kubernetes
    types:
      - name: deployments
    accounts:
      - name: acct
        locations: [ns1]
",
        )
        .unwrap()
    }

    #[test]
    fn test_missing_sources_rejected_for_run() {
        let store: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::new());
        assert!(build_registry(&config(), store, None, MissingSources::Reject).is_err());
    }

    #[test]
    fn test_missing_sources_filled_for_reads() {
        let store: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::new());
        let registry = build_registry(&config(), store, None, MissingSources::Empty).unwrap();
        assert_eq!(registry.providers().len(), 1);
        assert_eq!(registry.caching_agents().len(), 1);
    }

    #[test]
    fn test_fixture_file_provides_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixtures.yaml");
        std::fs::write(
            &path,
            r"
accounts:
  acct:
    - kind: deployments
      location: ns1
      name: web
",
        )
        .unwrap();

        let store: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::new());
        let registry = build_registry(&config(), store, Some(&path), MissingSources::Reject).unwrap();
        assert_eq!(registry.caching_agents().len(), 1);
    }
}
