//! In-process adapters: cache store and agent locks.

pub mod agent_lock;
pub mod cache_store;
pub mod glob;

pub use agent_lock::InMemoryAgentLock;
pub use cache_store::InMemoryCacheStore;
pub use glob::compile_glob;
