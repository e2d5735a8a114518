//! Port trait definitions (Hexagonal Architecture)
//!
//! Interfaces the domain depends on and adapters implement:
//! - CacheStore: typed key/value + relationship storage
//! - CachingAgent / OnDemandAgent: full and targeted synchronization
//! - AgentLockClient: cluster-wide mutual exclusion per agent
//! - ResourceSource: the external system of record
//! - Provider / KeyParser / SearchResultHydrator: per-provider search capabilities

pub mod agent;
pub mod agent_lock;
pub mod cache_store;
pub mod node_status;
pub mod permission_evaluator;
pub mod provider;
pub mod resource_source;

pub use agent::{Agent, CachingAgent, OnDemandAgent};
pub use agent_lock::AgentLockClient;
pub use cache_store::CacheStore;
pub use node_status::NodeStatusProvider;
pub use permission_evaluator::{ContextPermissionEvaluator, PermissionEvaluator, PermissionTarget};
pub use provider::{KeyParser, Provider, SearchResultHydrator};
pub use resource_source::ResourceSource;
