//! Catalog synchronizer: rebuilds the group → projects snapshot on a timer.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{GroupIdMap, SnapshotStore};
use crate::gitlab::RemoteCatalog;

/// What a call to [`CatalogSynchronizer::refresh`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new snapshot was published.
    Published {
        revision: u64,
        /// Groups listed successfully in this cycle
        refreshed: usize,
        /// Groups whose listing failed and whose previous entry was kept
        retained: usize,
        /// Groups whose listing failed with no previous entry to keep
        missing: usize,
    },
    /// Another refresh was already running.
    Skipped,
    /// Every group failed; the previous snapshot stays current.
    Abandoned { failed: usize },
}

pub struct CatalogSynchronizer {
    remote: Arc<dyn RemoteCatalog>,
    store: Arc<SnapshotStore>,
    group_ids: GroupIdMap,
    refresh_lock: Mutex<()>,
}

impl CatalogSynchronizer {
    pub fn new(
        remote: Arc<dyn RemoteCatalog>,
        store: Arc<SnapshotStore>,
        group_ids: GroupIdMap,
    ) -> Self {
        Self {
            remote,
            store,
            group_ids,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Run one refresh cycle.
    ///
    /// A group whose listing fails keeps its entry from the previous snapshot.
    /// Partial listings are discarded.
    pub async fn refresh(&self) -> RefreshOutcome {
        let Ok(_guard) = self.refresh_lock.try_lock() else {
            debug!("refresh already in progress, skipping");
            return RefreshOutcome::Skipped;
        };

        let previous = self.store.current().await;
        let mut groups = BTreeMap::new();
        let (mut refreshed, mut retained, mut missing) = (0, 0, 0);

        for (name, &group_id) in &self.group_ids {
            debug!(group = %name, group_id, "listing projects");

            match self.remote.list_group_projects(group_id).await {
                Ok(projects) => {
                    debug!(group = %name, count = projects.len(), "projects listed");
                    groups.insert(name.clone(), projects);
                    refreshed += 1;
                }
                Err(partial) => {
                    warn!(
                        group = %name,
                        group_id,
                        fetched = partial.items.len(),
                        error = %partial.error,
                        "project listing failed, keeping previous entry"
                    );
                    match previous.groups.get(name) {
                        Some(projects) => {
                            groups.insert(name.clone(), projects.clone());
                            retained += 1;
                        }
                        None => missing += 1,
                    }
                }
            }
        }

        let failed = retained + missing;
        if failed > 0 && failed == self.group_ids.len() {
            warn!(failed, "every group failed, keeping previous snapshot");
            return RefreshOutcome::Abandoned { failed };
        }

        let snapshot = self.store.publish(groups).await;
        info!(
            revision = snapshot.revision,
            refreshed, retained, missing, "catalog snapshot published"
        );

        RefreshOutcome::Published {
            revision: snapshot.revision,
            refreshed,
            retained,
            missing,
        }
    }

    /// Refresh every `period` until `shutdown` changes or its sender is dropped.
    ///
    /// The first refresh happens one period from now; the startup refresh is
    /// expected to have been run by the caller.
    pub async fn run(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("periodic refresh");
                    self.refresh().await;
                }
                _ = shutdown.changed() => {
                    info!("catalog synchronizer stopping");
                    break;
                }
            }
        }
    }

    /// Spawn [`run`](Self::run) onto the runtime.
    pub fn spawn(self: &Arc<Self>, period: Duration, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(this.run(period, shutdown))
    }
}
