pub mod agents;
pub mod configured_provider;
pub mod on_demand_updater;
pub mod provider_registry;
pub mod scheduler;
pub mod search;

pub use agents::{ResourceAgentConfig, ResourceCachingAgent};
pub use configured_provider::{AttributeHydrator, ConfiguredProvider, StandardKeyParser};
pub use on_demand_updater::{OnDemandCacheStatus, OnDemandCacheUpdater, OnDemandOutcome};
pub use provider_registry::ProviderRegistry;
pub use scheduler::{build_scheduler, AgentScheduler, SchedulerDeps, SchedulerStats, SlotState};
pub use search::{SearchIndex, ShadowIndex};
