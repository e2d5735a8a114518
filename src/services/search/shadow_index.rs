//! In-memory id snapshot for high-cardinality types.
//!
//! A single background task rebuilds the snapshot on a fixed interval and
//! swaps it in whole; queries read whichever snapshot is published.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{interval, Instant};
use tracing::{debug, warn};

use crate::domain::errors::DomainResult;
use crate::domain::ports::CacheStore;

/// Lowercased searchable part of each id paired with the stored id, per type.
type Snapshot = BTreeMap<String, Vec<(String, String)>>;

/// The part of a key a query is matched against: everything after
/// `provider:type:`. Keys without that prefix are never search hits.
fn searchable_suffix(id: &str) -> Option<String> {
    let mut parts = id.splitn(3, ':');
    parts.next()?;
    parts.next()?;
    parts.next().map(str::to_lowercase)
}

/// Refresh bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct ShadowIndexStatus {
    pub running: bool,
    pub refreshes: u64,
    pub failures: u64,
    pub last_refresh: Option<Instant>,
    pub indexed_ids: usize,
}

/// Handle to the refresh task.
pub struct ShadowIndexHandle {
    stop_flag: Arc<AtomicBool>,
    status: Arc<RwLock<ShadowIndexStatus>>,
}

impl ShadowIndexHandle {
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
    }

    pub async fn status(&self) -> ShadowIndexStatus {
        self.status.read().await.clone()
    }
}

pub struct ShadowIndex {
    types: BTreeSet<String>,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    status: Arc<RwLock<ShadowIndexStatus>>,
}

impl ShadowIndex {
    pub fn new(types: impl IntoIterator<Item = String>) -> Self {
        Self {
            types: types.into_iter().collect(),
            snapshot: RwLock::new(None),
            status: Arc::new(RwLock::new(ShadowIndexStatus::default())),
        }
    }

    pub fn indexes(&self, type_name: &str) -> bool {
        self.types.contains(type_name)
    }

    /// Rebuild every indexed type from the store and publish the result.
    pub async fn refresh(&self, store: &dyn CacheStore) -> DomainResult<usize> {
        let mut next = Snapshot::new();
        for type_name in &self.types {
            let ids = store.get_identifiers(type_name).await?;
            next.insert(
                type_name.clone(),
                ids.into_iter()
                    .filter_map(|id| searchable_suffix(&id).map(|suffix| (suffix, id)))
                    .collect(),
            );
        }
        let indexed = next.values().map(Vec::len).sum();
        *self.snapshot.write().await = Some(Arc::new(next));

        let mut status = self.status.write().await;
        status.refreshes += 1;
        status.last_refresh = Some(Instant::now());
        status.indexed_ids = indexed;
        Ok(indexed)
    }

    /// Ids of `type_name` whose part after `provider:type:` contains
    /// `normalized_query`.
    ///
    /// `None` when the type is not indexed or no snapshot is published yet.
    pub async fn lookup(&self, type_name: &str, normalized_query: &str) -> Option<Vec<String>> {
        let snapshot = self.snapshot.read().await.clone()?;
        let ids = snapshot.get(type_name)?;
        Some(
            ids.iter()
                .filter(|(lower, _)| lower.contains(normalized_query))
                .map(|(_, id)| id.clone())
                .collect(),
        )
    }

    /// Spawn the periodic refresh task. The first refresh happens immediately.
    pub fn spawn_refresh(self: Arc<Self>, store: Arc<dyn CacheStore>, period: Duration) -> ShadowIndexHandle {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let handle = ShadowIndexHandle {
            stop_flag: Arc::clone(&stop_flag),
            status: Arc::clone(&self.status),
        };

        tokio::spawn(async move {
            self.status.write().await.running = true;
            let mut timer = interval(period);
            loop {
                timer.tick().await;
                if stop_flag.load(Ordering::Acquire) {
                    break;
                }
                match self.refresh(store.as_ref()).await {
                    Ok(indexed) => debug!(indexed, "shadow index refreshed"),
                    Err(e) => {
                        warn!(error = %e, "shadow index refresh failed, keeping previous snapshot");
                        self.status.write().await.failures += 1;
                    }
                }
            }
            self.status.write().await.running = false;
        });

        handle
    }
}
