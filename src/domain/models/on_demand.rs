//! On-demand refresh requests, results and staging entries.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::cache_data::{Attributes, CacheData, Relationships};
use super::cache_result::CacheResult;
use crate::domain::errors::{DomainError, DomainResult};

/// Reserved type holding staged on-demand entries.
pub const ON_DEMAND_TYPE: &str = "onDemand";

/// Staging entry attribute names.
pub mod attributes {
    pub const CACHE_TIME: &str = "cacheTime";
    pub const PROCESSED_COUNT: &str = "processedCount";
    pub const PROCESSED_TIME: &str = "processedTime";
    pub const CACHE_RESULTS: &str = "cacheResults";
    pub const LAST_MODIFIED: &str = "lastModified";
}

/// Kind of on-demand refresh being requested.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDemandType {
    /// Request name is `"<TYPE> <resourceName>"`.
    Manifest,
    /// Request targets one resource type; the name is the bare resource name.
    Type(String),
}

impl FromStr for OnDemandType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(DomainError::ValidationFailed(
                "on-demand type cannot be empty".to_string(),
            ));
        }
        if trimmed.eq_ignore_ascii_case("manifest") {
            Ok(Self::Manifest)
        } else {
            Ok(Self::Type(trimmed.to_string()))
        }
    }
}

impl fmt::Display for OnDemandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manifest => f.write_str("manifest"),
            Self::Type(t) => f.write_str(t),
        }
    }
}

/// A targeted refresh trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnDemandRequest {
    pub account: String,
    pub location: String,
    pub name: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl OnDemandRequest {
    pub fn new(account: impl Into<String>, location: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            location: location.into(),
            name: name.into(),
            extra: BTreeMap::new(),
        }
    }

    /// Resolve the `(type, resourceName)` this request targets.
    pub fn target(&self, on_demand_type: &OnDemandType) -> Option<(String, String)> {
        let name = self.name.trim();
        match on_demand_type {
            OnDemandType::Manifest => {
                let (kind, resource) = name.split_once(char::is_whitespace)?;
                let resource = resource.trim();
                (!kind.is_empty() && !resource.is_empty())
                    .then(|| (kind.to_string(), resource.to_string()))
            }
            OnDemandType::Type(type_name) => {
                let resource = name
                    .strip_prefix(type_name.as_str())
                    .and_then(|rest| rest.strip_prefix(char::is_whitespace))
                    .map_or(name, str::trim);
                (!resource.is_empty()).then(|| (type_name.clone(), resource.to_string()))
            }
        }
    }
}

/// Result of one on-demand agent handling a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnDemandResult {
    pub agent_type: String,
    pub cache_result: CacheResult,
    #[serde(default)]
    pub evictions: BTreeMap<String, Vec<String>>,
}

impl OnDemandResult {
    pub fn has_effect(&self) -> bool {
        !self.cache_result.is_empty() || self.evictions.values().any(|ids| !ids.is_empty())
    }
}

/// Identity of a staged request, as reported by pending-request listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDetails {
    pub name: String,
    pub account: String,
    pub location: String,
}

/// A staged on-demand entry as reported to operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOnDemandRequest {
    pub id: String,
    pub details: PendingDetails,
    pub cache_time: i64,
    pub processed_count: i64,
    pub processed_time: i64,
}

/// Typed view over a staging entry stored under [`ON_DEMAND_TYPE`].
#[derive(Debug, Clone, PartialEq)]
pub struct StagedEntry {
    pub id: String,
    pub cache_time: i64,
    pub processed_count: i64,
    pub processed_time: i64,
    pub last_modified: Option<i64>,
    pub cache_results: BTreeMap<String, Vec<CacheData>>,
}

impl StagedEntry {
    /// A fresh, unconsumed entry published at `cache_time`.
    pub fn new(
        id: impl Into<String>,
        cache_time: i64,
        last_modified: Option<i64>,
        cache_results: BTreeMap<String, Vec<CacheData>>,
    ) -> Self {
        Self {
            id: id.into(),
            cache_time,
            processed_count: 0,
            processed_time: -1,
            last_modified,
            cache_results,
        }
    }

    pub fn is_consumed(&self) -> bool {
        self.processed_count > 0
    }

    /// Mark consumed at `now`.
    pub fn consume(&mut self, now: i64) {
        self.processed_count = 1;
        self.processed_time = now;
    }

    /// Decode from a stored entry. Entries missing `cacheTime` are rejected.
    pub fn from_cache_data(data: &CacheData) -> DomainResult<Self> {
        let cache_time = data.i64_attribute(attributes::CACHE_TIME).ok_or_else(|| {
            DomainError::SerializationError(format!("staging entry {} has no cacheTime", data.id))
        })?;
        let cache_results = match data.attributes.get(attributes::CACHE_RESULTS) {
            Some(Value::String(raw)) => serde_json::from_str(raw)?,
            Some(other @ Value::Object(_)) => serde_json::from_value(other.clone())?,
            _ => BTreeMap::new(),
        };

        Ok(Self {
            id: data.id.clone(),
            cache_time,
            processed_count: data.i64_attribute(attributes::PROCESSED_COUNT).unwrap_or(0),
            processed_time: data.i64_attribute(attributes::PROCESSED_TIME).unwrap_or(-1),
            last_modified: data.i64_attribute(attributes::LAST_MODIFIED),
            cache_results,
        })
    }

    /// Encode for storage; `cacheResults` is kept as a JSON string.
    pub fn to_cache_data(&self) -> DomainResult<CacheData> {
        let mut attrs = Attributes::new();
        attrs.insert(attributes::CACHE_TIME.to_string(), Value::from(self.cache_time));
        attrs.insert(
            attributes::PROCESSED_COUNT.to_string(),
            Value::from(self.processed_count),
        );
        attrs.insert(
            attributes::PROCESSED_TIME.to_string(),
            Value::from(self.processed_time),
        );
        if let Some(last_modified) = self.last_modified {
            attrs.insert(attributes::LAST_MODIFIED.to_string(), Value::from(last_modified));
        }
        attrs.insert(
            attributes::CACHE_RESULTS.to_string(),
            Value::String(serde_json::to_string(&self.cache_results)?),
        );
        Ok(CacheData::new(self.id.clone(), attrs, Relationships::new()))
    }
}
