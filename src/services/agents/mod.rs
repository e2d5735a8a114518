//! Caching agent implementations.

pub mod resource_agent;

pub use resource_agent::{ResourceAgentConfig, ResourceCachingAgent};
