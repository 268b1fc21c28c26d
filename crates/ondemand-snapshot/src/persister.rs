//! Periodic snapshot writer for the activation store.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use ondemand_state::{ActivationRecord, ExpiringStore};

use crate::error::SnapshotResult;
use crate::store::SnapshotStore;

pub const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(5);

/// Moves activation state between the expiring store and a snapshot file.
pub struct SnapshotPersister {
    snapshots: SnapshotStore,
    store: ExpiringStore<ActivationRecord>,
    interval: Duration,
}

impl SnapshotPersister {
    pub fn new(
        snapshots: SnapshotStore,
        store: ExpiringStore<ActivationRecord>,
        interval: Duration,
    ) -> Self {
        Self {
            snapshots,
            store,
            interval,
        }
    }

    /// Load the snapshot into the store. Returns the number of entries.
    ///
    /// Entries already past their deadline are evicted by the next sweep.
    pub fn restore(&self) -> SnapshotResult<usize> {
        let entries = self.snapshots.load()?;
        let restored = self.store.restore(entries);
        info!(restored, "activation snapshot restored");
        Ok(restored)
    }

    /// Write the store's current contents. Returns the number of entries.
    pub fn persist(&self) -> SnapshotResult<usize> {
        let entries = self.store.entries();
        self.snapshots.save(&entries)?;
        Ok(entries.len())
    }

    /// Persist every interval until shutdown, then once more.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "snapshot persister started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    if let Err(e) = self.persist() {
                        error!(error = %e, "activation snapshot failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("snapshot persister shutting down");
                    if let Err(e) = self.persist() {
                        error!(error = %e, "final activation snapshot failed");
                    }
                    break;
                }
            }
        }
    }
}
