use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::domain::models::NodeConfig;
use crate::domain::ports::NodeStatusProvider;

/// Name this node writes as lock owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity(String);

impl NodeIdentity {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// `hostname:uuid`, unless the config pins an identity.
    pub fn from_config(config: &NodeConfig) -> Self {
        config
            .identity
            .as_ref()
            .filter(|id| !id.trim().is_empty())
            .map_or_else(Self::generate, |id| Self::new(id.trim()))
    }

    pub fn generate() -> Self {
        Self(format!("{}:{}", hostname(), Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Node status toggled locally, e.g. by discovery or an operator.
#[derive(Debug)]
pub struct StaticNodeStatus {
    enabled: AtomicBool,
}

impl StaticNodeStatus {
    pub const fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        let previous = self.enabled.swap(enabled, Ordering::AcqRel);
        if previous != enabled {
            tracing::info!(enabled, "node status changed");
        }
    }
}

impl Default for StaticNodeStatus {
    fn default() -> Self {
        Self::new(true)
    }
}

impl NodeStatusProvider for StaticNodeStatus {
    fn is_node_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_override() {
        let config = NodeConfig {
            identity: Some(" node-a ".to_string()),
            enabled: true,
        };
        assert_eq!(NodeIdentity::from_config(&config).as_str(), "node-a");
    }

    #[test]
    fn test_generated_identities_differ() {
        let a = NodeIdentity::from_config(&NodeConfig::default());
        let b = NodeIdentity::generate();
        assert_ne!(a, b);
        assert!(a.as_str().contains(':'));
    }

    #[test]
    fn test_status_toggle() {
        let status = StaticNodeStatus::default();
        assert!(status.is_node_enabled());
        status.set_enabled(false);
        assert!(!status.is_node_enabled());
    }
}
