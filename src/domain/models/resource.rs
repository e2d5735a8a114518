//! Resources as described by the external system of record.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// One resource reported by a [`crate::domain::ports::ResourceSource`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Cache type the resource is stored under.
    pub kind: String,
    pub location: String,
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    /// Related resource names keyed by their type, resolved within the same
    /// account and location.
    #[serde(default)]
    pub relationships: BTreeMap<String, BTreeSet<String>>,
    /// Last modification time in epoch milliseconds, if the source tracks it.
    #[serde(default)]
    pub last_modified: Option<i64>,
}

impl Resource {
    pub fn new(kind: impl Into<String>, location: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            location: location.into(),
            name: name.into(),
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
            last_modified: None,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_relationship(mut self, kind: impl Into<String>, name: impl Into<String>) -> Self {
        self.relationships.entry(kind.into()).or_default().insert(name.into());
        self
    }

    pub fn with_last_modified(mut self, millis: i64) -> Self {
        self.last_modified = Some(millis);
        self
    }
}

/// Outcome of looking up a single resource by exact identity.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceLookup {
    Found(Resource),
    NotFound,
    TransientError(String),
}
