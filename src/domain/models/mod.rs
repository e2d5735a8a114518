pub mod agent;
pub mod cache_data;
pub mod cache_result;
pub mod config;
pub mod context;
pub mod keys;
pub mod on_demand;
pub mod resource;
pub mod search;

pub use agent::{shard_of, AgentDataType, Authority, Scope, ShardAssignment};
pub use cache_data::{Attributes, CacheData, Relationships};
pub use cache_result::CacheResult;
pub use config::{
    AccountConfig, Config, DatabaseConfig, LoggingConfig, NodeConfig, OnDemandConfig,
    ProviderConfig, ProviderTypeConfig, SchedulerConfig, SchedulerPolicy, SearchConfig,
};
pub use context::RequestContext;
pub use keys::CacheKey;
pub use on_demand::{
    OnDemandRequest, OnDemandResult, OnDemandType, PendingDetails, PendingOnDemandRequest,
    StagedEntry, ON_DEMAND_TYPE,
};
pub use resource::{Resource, ResourceLookup};
pub use search::{SearchQuery, SearchResult, SearchResultSet};
