//! Agent-facing models: data-type authority, scope and shard assignment.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::keys::CacheKey;

/// Whether an agent owns evictions for a type it contributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    /// Sole source of truth within the agent's scope, including evictions.
    #[default]
    Authoritative,
    /// Contributes data without evicting it.
    Informative,
}

impl Authority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authoritative => "AUTHORITATIVE",
            Self::Informative => "INFORMATIVE",
        }
    }
}

/// A cache type contributed by an agent, tagged with its authority.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentDataType {
    pub type_name: String,
    pub authority: Authority,
}

impl AgentDataType {
    pub fn authoritative(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            authority: Authority::Authoritative,
        }
    }

    pub fn informative(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            authority: Authority::Informative,
        }
    }
}

/// The `(account, locations)` slice of the keyspace an agent is bound to.
///
/// An empty location list means every location of the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub account: String,
    #[serde(default)]
    pub locations: Vec<String>,
}

impl Scope {
    pub fn new(account: impl Into<String>, locations: Vec<String>) -> Self {
        Self {
            account: account.into(),
            locations,
        }
    }

    pub fn all_locations(account: impl Into<String>) -> Self {
        Self::new(account, Vec::new())
    }

    pub fn contains_location(&self, location: &str) -> bool {
        self.locations.is_empty() || self.locations.iter().any(|l| l == location)
    }

    pub fn contains(&self, account: &str, location: &str) -> bool {
        self.account == account && self.contains_location(location)
    }

    pub fn contains_key(&self, key: &CacheKey) -> bool {
        self.contains(&key.account, &key.location)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.locations.is_empty() {
            write!(f, "{}/*", self.account)
        } else {
            write!(f, "{}/{}", self.account, self.locations.join(","))
        }
    }
}

/// `(index, count)` shard of a logical agent. Fixed for an agent's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardAssignment {
    pub index: u32,
    pub count: u32,
}

impl ShardAssignment {
    /// Returns `None` unless `index < count`.
    pub fn new(index: u32, count: u32) -> Option<Self> {
        (count > 0 && index < count).then_some(Self { index, count })
    }

    /// The single shard of an unsharded agent.
    pub const fn single() -> Self {
        Self { index: 0, count: 1 }
    }

    /// Whether `key` hashes into this shard.
    pub fn owns(&self, key: &str) -> bool {
        shard_of(key, self.count) == self.index
    }
}

impl Default for ShardAssignment {
    fn default() -> Self {
        Self::single()
    }
}

impl fmt::Display for ShardAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index + 1, self.count)
    }
}

/// Deterministic bucket of `value` among `count` buckets.
///
/// Uses the first eight bytes of the SHA-256 digest so the result is stable
/// across processes and platforms.
pub fn shard_of(value: &str, count: u32) -> u32 {
    if count <= 1 {
        return 0;
    }
    let digest = Sha256::digest(value.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let bucket = u64::from_be_bytes(prefix) % u64::from(count);
    u32::try_from(bucket).unwrap_or(0)
}
