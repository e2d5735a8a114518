//! Registry of providers collected at startup.

use std::sync::Arc;

use crate::domain::ports::{CacheStore, CachingAgent, KeyParser, OnDemandAgent, Provider};

/// Providers sharing one cache store.
#[derive(Clone)]
pub struct ProviderRegistry {
    store: Arc<dyn CacheStore>,
    providers: Vec<Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            providers: Vec::new(),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.register(provider);
        self
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        tracing::info!(
            provider = provider.provider_name(),
            agents = provider.caching_agents().len(),
            "registered provider"
        );
        self.providers.push(provider);
    }

    pub fn store(&self) -> Arc<dyn CacheStore> {
        Arc::clone(&self.store)
    }

    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    pub fn provider(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers
            .iter()
            .find(|p| p.provider_name() == name)
            .cloned()
    }

    pub fn caching_agents(&self) -> Vec<Arc<dyn CachingAgent>> {
        self.providers.iter().flat_map(|p| p.caching_agents()).collect()
    }

    pub fn on_demand_agents(&self) -> Vec<Arc<dyn OnDemandAgent>> {
        self.providers.iter().flat_map(|p| p.on_demand_agents()).collect()
    }

    pub fn key_parsers(&self) -> Vec<Arc<dyn KeyParser>> {
        self.providers.iter().map(|p| p.key_parser()).collect()
    }
}
