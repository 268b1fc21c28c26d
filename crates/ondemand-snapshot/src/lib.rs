//! Durable snapshots of the activation store.
//!
//! Backed by [redb](https://docs.rs/redb). The expiring store itself does
//! no I/O; [`SnapshotPersister`] restores it at startup and writes it back
//! periodically, so pending idle windows survive a restart.
//!
//! Each row stores the record and its remaining TTL in milliseconds. A
//! save replaces the whole table in one write transaction.

pub mod error;
pub mod persister;
pub mod store;
pub mod tables;

pub use error::{SnapshotError, SnapshotResult};
pub use persister::{DEFAULT_SNAPSHOT_INTERVAL, SnapshotPersister};
pub use store::SnapshotStore;
