use serde::{Deserialize, Serialize};

use super::agent::Authority;

/// Main configuration structure for the caching subsystem
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Agent scheduling configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Search index configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// On-demand staging configuration
    #[serde(default)]
    pub on_demand: OnDemandConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// This node's identity and health
    #[serde(default)]
    pub node: NodeConfig,

    /// Declarative provider catalog
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// Which cluster scheduling policy to run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerPolicy {
    /// Distributed lock per agent per interval
    #[default]
    Default,
    /// Static hash partitioning of agents across worker slots
    Sort,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    #[serde(default)]
    pub policy: SchedulerPolicy,

    /// Interval between successful runs of an agent
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,

    /// Interval before retrying an agent whose last run failed
    #[serde(default = "default_error_interval_seconds")]
    pub error_interval_seconds: u64,

    /// Lock TTL; also the hard timeout of a single agent execution
    #[serde(default = "default_agent_lock_ttl_seconds")]
    pub agent_lock_ttl_seconds: u64,

    /// Tick interval of the scheduling loop
    #[serde(default = "default_lock_acquisition_interval_seconds")]
    pub lock_acquisition_interval_seconds: u64,

    /// Maximum concurrently running agents on this node; -1 for unbounded
    #[serde(default = "default_parallelism")]
    pub parallelism: i64,

    /// Only agent types matching this regex (case-insensitive) are scheduled
    #[serde(default = "default_enabled_agent_pattern")]
    pub enabled_agent_pattern: String,

    /// Slot owned by this node under the `sort` policy
    #[serde(default)]
    pub worker_slot: u32,

    /// Number of worker slots under the `sort` policy
    #[serde(default = "default_worker_slots")]
    pub worker_slots: u32,
}

const fn default_poll_interval_seconds() -> u64 {
    60
}

const fn default_error_interval_seconds() -> u64 {
    60
}

const fn default_agent_lock_ttl_seconds() -> u64 {
    240
}

const fn default_lock_acquisition_interval_seconds() -> u64 {
    1
}

const fn default_parallelism() -> i64 {
    -1
}

fn default_enabled_agent_pattern() -> String {
    ".*".to_string()
}

const fn default_worker_slots() -> u32 {
    1
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            policy: SchedulerPolicy::default(),
            poll_interval_seconds: default_poll_interval_seconds(),
            error_interval_seconds: default_error_interval_seconds(),
            agent_lock_ttl_seconds: default_agent_lock_ttl_seconds(),
            lock_acquisition_interval_seconds: default_lock_acquisition_interval_seconds(),
            parallelism: default_parallelism(),
            enabled_agent_pattern: default_enabled_agent_pattern(),
            worker_slot: 0,
            worker_slots: default_worker_slots(),
        }
    }
}

/// Search index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SearchConfig {
    /// Types served from the in-memory shadow index
    #[serde(default = "default_shadow_index_types")]
    pub shadow_index_types: Vec<String>,

    #[serde(default = "default_shadow_refresh_interval_seconds")]
    pub shadow_refresh_interval_seconds: u64,

    #[serde(default)]
    pub shadow_index_enabled: bool,

    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
}

fn default_shadow_index_types() -> Vec<String> {
    vec!["instances".to_string()]
}

const fn default_shadow_refresh_interval_seconds() -> u64 {
    30
}

const fn default_page_size() -> usize {
    10
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            shadow_index_types: default_shadow_index_types(),
            shadow_refresh_interval_seconds: default_shadow_refresh_interval_seconds(),
            shadow_index_enabled: false,
            default_page_size: default_page_size(),
        }
    }
}

/// On-demand staging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OnDemandConfig {
    /// Unconsumed staging entries older than this are evicted as abandoned
    #[serde(default = "default_on_demand_max_age_seconds")]
    pub max_age_seconds: u64,
}

const fn default_on_demand_max_age_seconds() -> u64 {
    600
}

impl Default for OnDemandConfig {
    fn default() -> Self {
        Self {
            max_age_seconds: default_on_demand_max_age_seconds(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation of log files: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".cats/cats.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Node identity and health
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NodeConfig {
    /// Overrides the generated `hostname:uuid` identity
    #[serde(default)]
    pub identity: Option<String>,

    /// Whether this node starts out eligible to schedule agents
    #[serde(default = "default_true")]
    pub enabled: bool,
}

const fn default_true() -> bool {
    true
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            identity: None,
            enabled: true,
        }
    }
}

/// A provider assembled from configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProviderConfig {
    pub name: String,

    /// Alias for the `location` key field in filters and results (e.g. `region`)
    #[serde(default = "default_location_field")]
    pub location_field: String,

    #[serde(default)]
    pub types: Vec<ProviderTypeConfig>,

    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

fn default_location_field() -> String {
    "location".to_string()
}

/// One cache type served by a configured provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProviderTypeConfig {
    pub name: String,

    #[serde(default)]
    pub authority: Authority,

    /// Whether this type is offered to search
    #[serde(default = "default_true")]
    pub searchable: bool,

    /// Type-specific alias for the `name` field (e.g. `serverGroup`)
    #[serde(default)]
    pub name_alias: Option<String>,

    /// `${field}` / `$field` template resolved into each result's `url`
    #[serde(default)]
    pub url_template: Option<String>,

    /// Merge cached attributes into search results of this type
    #[serde(default)]
    pub hydrate_attributes: bool,

    /// Derive an `application` field from the name's first `-` segment
    #[serde(default)]
    pub application_from_name: bool,
}

/// An account served by a configured provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AccountConfig {
    pub name: String,

    /// Locations covered by this account; empty means all
    #[serde(default)]
    pub locations: Vec<String>,

    /// Number of sharded agent instances for this account
    #[serde(default = "default_shards")]
    pub shards: u32,
}

const fn default_shards() -> u32 {
    1
}
