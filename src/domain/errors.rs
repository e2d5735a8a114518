//! Domain errors for the caching subsystem.

use thiserror::Error;

/// Domain-level errors that can occur while caching, scheduling or searching.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Cache store error: {0}")]
    StoreError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("External system call failed for {agent_type}: {reason}")]
    ExternalCallFailed { agent_type: String, reason: String },

    #[error("Agent {agent_type} timed out after {timeout_ms}ms")]
    AgentTimeout { agent_type: String, timeout_ms: u64 },

    #[error("Lock operation failed for {agent_type}: {reason}")]
    LockFailed { agent_type: String, reason: String },

    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    #[error("Invalid glob pattern: {0}")]
    InvalidGlob(String),

    #[error("Permission lookup failed: {0}")]
    PermissionLookupFailed(String),

    #[error("Hydration failed for {key}: {reason}")]
    HydrationFailed { key: String, reason: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl From<regex::Error> for DomainError {
    fn from(err: regex::Error) -> Self {
        DomainError::InvalidGlob(err.to_string())
    }
}
