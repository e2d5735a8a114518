//! Cache entries as stored per type.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Attribute map of a cache entry.
pub type Attributes = BTreeMap<String, Value>;

/// Relationships of a cache entry, keyed by related type.
pub type Relationships = BTreeMap<String, BTreeSet<String>>;

/// A single cached resource.
///
/// `id` is a fully-qualified cache key (see [`super::keys::CacheKey`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheData {
    pub id: String,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub relationships: Relationships,
}

impl CacheData {
    pub fn new(id: impl Into<String>, attributes: Attributes, relationships: Relationships) -> Self {
        Self {
            id: id.into(),
            attributes,
            relationships,
        }
    }

    /// An entry with no attributes or relationships.
    pub fn empty(id: impl Into<String>) -> Self {
        Self::new(id, Attributes::new(), Relationships::new())
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_relationship(mut self, type_name: impl Into<String>, id: impl Into<String>) -> Self {
        self.relationships
            .entry(type_name.into())
            .or_default()
            .insert(id.into());
        self
    }

    /// Read an integer attribute, tolerating values stored as floats or strings.
    pub fn i64_attribute(&self, key: &str) -> Option<i64> {
        match self.attributes.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn str_attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// Merge another entry for the same id into this one.
    ///
    /// Attributes from `other` win; relationship sets are unioned.
    pub fn merge_from(&mut self, other: &CacheData) {
        for (key, value) in &other.attributes {
            self.attributes.insert(key.clone(), value.clone());
        }
        for (type_name, ids) in &other.relationships {
            self.relationships
                .entry(type_name.clone())
                .or_default()
                .extend(ids.iter().cloned());
        }
    }
}
