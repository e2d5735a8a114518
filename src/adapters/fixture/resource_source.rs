//! Resource source backed by a fixture file, standing in for a cloud API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Resource, ResourceLookup, Scope};
use crate::domain::ports::ResourceSource;

/// Fixture file contents: resources per account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureSet {
    #[serde(default)]
    pub accounts: BTreeMap<String, Vec<Resource>>,
}

impl FixtureSet {
    /// Load a `.json`, `.yaml` or `.yml` fixture file.
    pub fn load(path: impl AsRef<Path>) -> DomainResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DomainError::ValidationFailed(format!("cannot read fixtures {}: {e}", path.display()))
        })?;
        Self::parse(&raw, path.extension().and_then(|e| e.to_str()) == Some("json"))
    }

    pub fn parse(raw: &str, json: bool) -> DomainResult<Self> {
        if json {
            Ok(serde_json::from_str(raw)?)
        } else {
            serde_yaml::from_str(raw).map_err(|e| DomainError::SerializationError(e.to_string()))
        }
    }

    /// One source per account in the set.
    pub fn into_sources(self) -> BTreeMap<String, Arc<FixtureResourceSource>> {
        self.accounts
            .into_iter()
            .map(|(account, resources)| {
                let source = Arc::new(FixtureResourceSource::new(account.clone(), resources));
                (account, source)
            })
            .collect()
    }
}

/// Mutable in-memory view of one account's resources.
#[derive(Debug, Default)]
pub struct FixtureResourceSource {
    account: String,
    resources: RwLock<Vec<Resource>>,
    failing: AtomicBool,
}

impl FixtureResourceSource {
    pub fn new(account: impl Into<String>, resources: Vec<Resource>) -> Self {
        Self {
            account: account.into(),
            resources: RwLock::new(resources),
            failing: AtomicBool::new(false),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Insert or replace a resource by `(kind, location, name)`.
    pub fn upsert(&self, resource: Resource) {
        let mut resources = self.write_resources();
        resources.retain(|r| !same_identity(r, &resource.kind, &resource.location, &resource.name));
        resources.push(resource);
    }

    pub fn remove(&self, kind: &str, location: &str, name: &str) {
        self.write_resources()
            .retain(|r| !same_identity(r, kind, location, name));
    }

    // Every update leaves the list consistent, so poisoning is recovered from.
    fn read_resources(&self) -> RwLockReadGuard<'_, Vec<Resource>> {
        self.resources.read().unwrap_or_else(|poisoned| {
            warn!(account = %self.account, "fixture resources lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    fn write_resources(&self) -> RwLockWriteGuard<'_, Vec<Resource>> {
        self.resources.write().unwrap_or_else(|poisoned| {
            warn!(account = %self.account, "fixture resources lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    /// Make every subsequent call fail as an unreachable backend would.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn is_failing(&self) -> bool {
        self.failing.load(Ordering::SeqCst)
    }
}

fn same_identity(resource: &Resource, kind: &str, location: &str, name: &str) -> bool {
    resource.kind == kind && resource.location == location && resource.name == name
}

#[async_trait]
impl ResourceSource for FixtureResourceSource {
    async fn list(&self, scope: &Scope, kinds: &[String]) -> DomainResult<Vec<Resource>> {
        if self.is_failing() {
            return Err(DomainError::ExternalCallFailed {
                agent_type: self.account.clone(),
                reason: "fixture source marked as failing".to_string(),
            });
        }
        if scope.account != self.account {
            return Ok(Vec::new());
        }
        Ok(self
            .read_resources()
            .iter()
            .filter(|r| scope.contains_location(&r.location) && kinds.contains(&r.kind))
            .cloned()
            .collect())
    }

    async fn get(&self, account: &str, kind: &str, location: &str, name: &str) -> ResourceLookup {
        if self.is_failing() {
            return ResourceLookup::TransientError("fixture source marked as failing".to_string());
        }
        if account != self.account {
            return ResourceLookup::NotFound;
        }
        self.read_resources()
            .iter()
            .find(|r| same_identity(r, kind, location, name))
            .cloned()
            .map_or(ResourceLookup::NotFound, ResourceLookup::Found)
    }
}
