//! Common test utilities for integration tests
//!
//! Provides shared fixtures, helpers, and test utilities used across
//! multiple integration test files.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cats::adapters::fixture::FixtureResourceSource;
use cats::domain::models::{AgentDataType, Resource, Scope, ShardAssignment};
use cats::services::{ResourceAgentConfig, ResourceCachingAgent};
use tempfile::TempDir;

/// Create a temporary test database
///
/// Returns the path to a SQLite database file in a temporary directory.
pub fn temp_db_path() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("cats.db");
    (dir, db_path)
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Kubernetes-flavoured data types used across the agent scenarios.
pub fn kubernetes_types() -> Vec<AgentDataType> {
    vec![
        AgentDataType::authoritative("deployment"),
        AgentDataType::authoritative("namespace"),
        AgentDataType::authoritative("pod"),
        AgentDataType::authoritative("replicaSet"),
        AgentDataType::authoritative("storageClass"),
        AgentDataType::informative("event"),
    ]
}

/// Agent for account `acct`, namespace `ns1`, on shard `index` of `count`.
pub fn kubernetes_agent(source: Arc<FixtureResourceSource>, index: u32, count: u32) -> ResourceCachingAgent {
    ResourceCachingAgent::new(
        ResourceAgentConfig {
            provider: "kubernetes".to_string(),
            scope: Scope::new("acct", vec!["ns1".to_string()]),
            shard: ShardAssignment::new(index, count).expect("valid shard"),
            data_types: kubernetes_types(),
            on_demand_max_age: Duration::from_secs(600),
        },
        source,
    )
}

/// Fixture source with one deployment and one storage class in `ns1`.
pub fn deployment_source() -> Arc<FixtureResourceSource> {
    Arc::new(FixtureResourceSource::new(
        "acct",
        vec![
            Resource::new("deployment", "ns1", "my-deployment").with_attribute("replicas", 3),
            Resource::new("storageClass", "ns1", "standard"),
        ],
    ))
}
