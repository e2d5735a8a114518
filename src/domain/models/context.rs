//! Request context passed explicitly across concurrency boundaries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Caller identity for one request or scheduled execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub user: Option<String>,
    /// Accounts the caller may read. `None` means unrestricted.
    pub allowed_accounts: Option<BTreeSet<String>>,
    pub request_id: Uuid,
}

impl RequestContext {
    pub fn new(user: Option<String>, allowed_accounts: Option<BTreeSet<String>>) -> Self {
        Self {
            user,
            allowed_accounts,
            request_id: Uuid::new_v4(),
        }
    }

    /// Unrestricted context used by scheduled agent executions.
    pub fn system() -> Self {
        Self::new(Some("system".to_string()), None)
    }

    pub fn for_user(user: impl Into<String>, accounts: impl IntoIterator<Item = String>) -> Self {
        Self::new(Some(user.into()), Some(accounts.into_iter().collect()))
    }

    pub fn can_read_account(&self, account: &str) -> bool {
        self.allowed_accounts
            .as_ref()
            .is_none_or(|accounts| accounts.contains(account))
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::system()
    }
}
