//! Cats - Cluster-aware Caching Agents
//!
//! Cats keeps a shared cache of external resources fresh. Caching agents
//! periodically load everything in their scope, on-demand agents refresh a
//! single resource ahead of the next full pass, a cluster scheduler makes sure
//! each agent runs on exactly one node per interval, and a search index ranks
//! cached keys for free-text queries.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, ports and errors
//! - **Adapter Layer** (`adapters`): In-memory, SQLite and fixture backends
//! - **Service Layer** (`services`): Agents, scheduler, on-demand updater, search
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use cats::adapters::memory::InMemoryCacheStore;
//! use cats::services::{ProviderRegistry, SearchIndex};
//!
//! let registry = ProviderRegistry::new(Arc::new(InMemoryCacheStore::new()));
//! let index = SearchIndex::new(&registry, Arc::new(ContextPermissionEvaluator))?;
//! let results = index.search(&SearchQuery::new("deck"), &RequestContext::system()).await?;
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    CacheData, CacheKey, CacheResult, Config, OnDemandRequest, OnDemandType, RequestContext,
    SearchQuery, SearchResultSet,
};
pub use domain::ports::{AgentLockClient, CacheStore, CachingAgent, OnDemandAgent, Provider};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    build_scheduler, AgentScheduler, OnDemandCacheUpdater, ProviderRegistry, SearchIndex,
};
