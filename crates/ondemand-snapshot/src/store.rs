//! SnapshotStore: redb-backed snapshot file.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ondemand_state::{ActivationRecord, SnapshotEntry};

use crate::error::{SnapshotError, SnapshotResult};
use crate::tables::ACTIVATIONS;

macro_rules! map_err {
    ($variant:ident) => {
        |e| SnapshotError::$variant(e.to_string())
    };
}

/// One persisted activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub record: ActivationRecord,
    pub remaining_ms: u64,
}

/// Thread-safe snapshot file.
#[derive(Clone)]
pub struct SnapshotStore {
    db: Arc<Database>,
}

impl SnapshotStore {
    /// Open (or create) a snapshot file at `path`.
    pub fn open(path: &Path) -> SnapshotResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "snapshot store opened");
        Ok(store)
    }

    /// Ephemeral in-memory store.
    pub fn open_in_memory() -> SnapshotResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        Ok(store)
    }

    fn ensure_tables(&self) -> SnapshotResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(ACTIVATIONS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Replace the stored snapshot with `entries`.
    pub fn save(&self, entries: &[SnapshotEntry<ActivationRecord>]) -> SnapshotResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.delete_table(ACTIVATIONS).map_err(map_err!(Table))?;
        {
            let mut table = txn.open_table(ACTIVATIONS).map_err(map_err!(Table))?;
            for entry in entries {
                let row = SnapshotRow {
                    record: entry.value.clone(),
                    remaining_ms: u64::try_from(entry.remaining.as_millis()).unwrap_or(u64::MAX),
                };
                let value = serde_json::to_vec(&row).map_err(map_err!(Serialize))?;
                table
                    .insert(entry.key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(count = entries.len(), "snapshot saved");
        Ok(())
    }

    /// Read the stored snapshot. Rows that fail to decode are skipped.
    pub fn load(&self) -> SnapshotResult<Vec<SnapshotEntry<ActivationRecord>>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ACTIVATIONS).map_err(map_err!(Table))?;
        let mut entries = Vec::new();
        for row in table.iter().map_err(map_err!(Read))? {
            let (key, value) = row.map_err(map_err!(Read))?;
            let key = key.value().to_string();
            match serde_json::from_slice::<SnapshotRow>(value.value()) {
                Ok(row) => entries.push(SnapshotEntry {
                    key,
                    value: row.record,
                    remaining: Duration::from_millis(row.remaining_ms),
                }),
                Err(e) => warn!(%key, error = %e, "skipping corrupt snapshot row"),
            }
        }
        Ok(entries)
    }
}
