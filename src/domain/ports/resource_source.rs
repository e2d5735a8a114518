use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Resource, ResourceLookup, Scope};

/// System of record describing cloud resources for one account.
#[async_trait]
pub trait ResourceSource: Send + Sync {
    /// Full current state of `kinds` within `scope`. Failure aborts the caller.
    async fn list(&self, scope: &Scope, kinds: &[String]) -> DomainResult<Vec<Resource>>;

    /// A single resource by exact identity
    async fn get(&self, account: &str, kind: &str, location: &str, name: &str) -> ResourceLookup;
}
