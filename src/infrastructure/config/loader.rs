use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid parallelism: {0}. Must be -1 (unbounded) or positive")]
    InvalidParallelism(i64),

    #[error("Invalid poll_interval_seconds: {0}. Must be at least 1")]
    InvalidPollInterval(u64),

    #[error(
        "Invalid agent_lock_ttl_seconds: {ttl}. Must be at least poll_interval_seconds ({poll})"
    )]
    LockTtlTooShort { ttl: u64, poll: u64 },

    #[error("Invalid worker_slot: {slot}. Must be below worker_slots ({slots})")]
    InvalidWorkerSlot { slot: u32, slots: u32 },

    #[error("Invalid enabled_agent_pattern '{pattern}': {reason}")]
    InvalidAgentPattern { pattern: String, reason: String },

    #[error("Invalid default_page_size: {0}. Must be at least 1")]
    InvalidPageSize(usize),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .cats/config.yaml (node config)
    /// 3. .cats/local.yaml (local overrides, optional)
    /// 4. Environment variables (CATS_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".cats/config.yaml"))
            .merge(Yaml::file(".cats/local.yaml"))
            .merge(Env::prefixed("CATS_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honoring `CATS_*` overrides
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("CATS_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        Self::validate_scheduler(config)?;

        if config.search.default_page_size == 0 {
            return Err(ConfigError::InvalidPageSize(config.search.default_page_size));
        }

        Self::validate_providers(config)
    }

    fn validate_scheduler(config: &Config) -> Result<(), ConfigError> {
        let scheduler = &config.scheduler;

        if scheduler.poll_interval_seconds == 0 {
            return Err(ConfigError::InvalidPollInterval(scheduler.poll_interval_seconds));
        }

        if scheduler.agent_lock_ttl_seconds < scheduler.poll_interval_seconds {
            return Err(ConfigError::LockTtlTooShort {
                ttl: scheduler.agent_lock_ttl_seconds,
                poll: scheduler.poll_interval_seconds,
            });
        }

        if scheduler.parallelism == 0 || scheduler.parallelism < -1 {
            return Err(ConfigError::InvalidParallelism(scheduler.parallelism));
        }

        if scheduler.worker_slot >= scheduler.worker_slots {
            return Err(ConfigError::InvalidWorkerSlot {
                slot: scheduler.worker_slot,
                slots: scheduler.worker_slots,
            });
        }

        if let Err(e) = regex::Regex::new(&scheduler.enabled_agent_pattern) {
            return Err(ConfigError::InvalidAgentPattern {
                pattern: scheduler.enabled_agent_pattern.clone(),
                reason: e.to_string(),
            });
        }

        Ok(())
    }

    fn validate_providers(config: &Config) -> Result<(), ConfigError> {
        let mut names = BTreeSet::new();
        for provider in &config.providers {
            if provider.name.is_empty() || provider.name.contains(':') {
                return Err(ConfigError::ValidationFailed(format!(
                    "provider name '{}' must be non-empty and contain no ':'",
                    provider.name
                )));
            }
            if !names.insert(provider.name.as_str()) {
                return Err(ConfigError::ValidationFailed(format!(
                    "provider '{}' is configured twice",
                    provider.name
                )));
            }
            if provider.types.iter().any(|t| t.name.is_empty()) {
                return Err(ConfigError::ValidationFailed(format!(
                    "provider '{}' has a type without a name",
                    provider.name
                )));
            }
            for account in &provider.accounts {
                if account.name.is_empty() {
                    return Err(ConfigError::ValidationFailed(format!(
                        "provider '{}' has an account without a name",
                        provider.name
                    )));
                }
                if account.shards == 0 {
                    return Err(ConfigError::ValidationFailed(format!(
                        "account '{}' of provider '{}' must have at least one shard",
                        account.name, provider.name
                    )));
                }
            }
        }
        Ok(())
    }
}
