//! Snapshot store shared between the synchronizer and request handlers.
//!
//! The current snapshot lives behind an `Arc` that is replaced as a whole on
//! every publish. Readers clone the `Arc` and drop the lock immediately, so a
//! reader never observes a half-built mapping and never holds up a publish.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::Project;

/// One complete, internally consistent view of the catalog.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Incremented on every publish; 0 is the empty startup snapshot.
    pub revision: u64,
    /// When this snapshot was published.
    pub last_updated: Option<DateTime<Utc>>,
    /// Logical group name → projects, in upstream listing order.
    pub groups: BTreeMap<String, Vec<Project>>,
}

impl Snapshot {
    pub fn projects(&self, group: &str) -> Option<&[Project]> {
        self.groups.get(group).map(Vec::as_slice)
    }
}

/// Holder of the current [`Snapshot`].
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotStore {
    /// Create a store holding the empty startup snapshot.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot::default())),
        }
    }

    /// Handle to the current snapshot.
    pub async fn current(&self) -> Arc<Snapshot> {
        self.current.read().await.clone()
    }

    /// Replace the current snapshot with `groups`, stamping it with the
    /// publish time and the next revision.
    pub async fn publish(&self, groups: BTreeMap<String, Vec<Project>>) -> Arc<Snapshot> {
        let mut current = self.current.write().await;
        let snapshot = Arc::new(Snapshot {
            revision: current.revision + 1,
            last_updated: Some(Utc::now()),
            groups,
        });
        *current = snapshot.clone();
        snapshot
    }

    pub async fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.current.read().await.last_updated
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
