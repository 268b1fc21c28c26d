//! Observability for the on-demand gateway.
//!
//! The activation handler and idle reaper report through
//! [`ObservabilityHooks`]; nothing they do depends on the outcome.
//! [`MetricsRegistry`] is the in-memory implementation that backs the
//! `/metrics` scrape endpoint.
//!
//! # Architecture
//!
//! ```text
//! ObservabilityHooks
//!   ├── NoopHooks        ← tests, embedding without metrics
//!   └── MetricsRegistry  ← per-service gauges + error counter
//!         └── snapshot() → render_prometheus() → text/plain
//! ```

pub mod hooks;
pub mod prometheus;
pub mod registry;

pub use hooks::{NoopHooks, ObservabilityHooks};
pub use prometheus::{CONTENT_TYPE, render_prometheus};
pub use registry::{MetricsRegistry, MetricsSnapshot, ServiceSnapshot};
