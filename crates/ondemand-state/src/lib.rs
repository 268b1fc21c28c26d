//! Activation records and the expiring state store.
//!
//! Tracks, per workload name, the last decided activation state together
//! with an idle deadline. Deadlines are enforced by a periodic sweep that
//! hands each expired entry to an injected [`EvictionHandler`].
//!
//! # Architecture
//!
//! ```text
//! ExpiringStore<V>
//!   ├── get() / put()      ← request path, short critical section
//!   ├── lock_key()         ← per-name async lock (activation vs eviction)
//!   ├── sweep()            → EvictionHandler::on_evict(name, value)
//!   ├── run()              → periodic sweep loop
//!   └── entries()/restore() ← snapshot collaborator, no I/O here
//! ```
//!
//! The store is `Clone` + `Send` + `Sync` (backed by `Arc`) and can be
//! shared across async tasks.

pub mod store;
pub mod types;

pub use store::{EvictionHandler, ExpiringStore, KeyGuard, SnapshotEntry};
pub use types::*;
