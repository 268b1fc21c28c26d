//! In-memory metrics registry.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::debug;

use ondemand_state::ActivationState;

use crate::hooks::ObservabilityHooks;
use crate::prometheus::render_prometheus;

/// Per-service gauges.
#[derive(Debug, Clone, Default, PartialEq)]
struct ServiceMetrics {
    status: Option<ActivationState>,
    last_started_secs: Option<u64>,
    timeout_secs: Option<f64>,
    scale_down_error: bool,
}

impl ServiceMetrics {
    fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.last_started_secs.is_none()
            && self.timeout_secs.is_none()
            && !self.scale_down_error
    }
}

/// Point-in-time view of one service's gauges.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSnapshot {
    pub name: String,
    pub status: Option<ActivationState>,
    /// Unix seconds of the last timeout set.
    pub last_started_secs: Option<u64>,
    pub timeout_secs: Option<f64>,
    pub scale_down_error: bool,
}

/// Point-in-time view of the whole registry, services sorted by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub services: Vec<ServiceSnapshot>,
    pub scale_down_errors: u64,
}

/// Collects activation metrics for the `/metrics` endpoint.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// service name → gauges. Ordered for stable exposition.
    services: RwLock<BTreeMap<String, ServiceMetrics>>,
    scale_down_errors: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, name: &str, f: impl FnOnce(&mut ServiceMetrics)) {
        let mut services = self
            .services
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let metrics = services.entry(name.to_string()).or_default();
        f(metrics);
        if metrics.is_empty() {
            services.remove(name);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let services = self
            .services
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        MetricsSnapshot {
            services: services
                .iter()
                .map(|(name, m)| ServiceSnapshot {
                    name: name.clone(),
                    status: m.status,
                    last_started_secs: m.last_started_secs,
                    timeout_secs: m.timeout_secs,
                    scale_down_error: m.scale_down_error,
                })
                .collect(),
            scale_down_errors: self.scale_down_errors.load(Ordering::Relaxed),
        }
    }

    /// Render the current state in Prometheus text format.
    pub fn render(&self) -> String {
        render_prometheus(&self.snapshot())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl ObservabilityHooks for MetricsRegistry {
    fn on_state_change(&self, name: &str, state: ActivationState) {
        self.update(name, |m| m.status = Some(state));
    }

    fn on_timeout_set(&self, name: &str, timeout: Duration) {
        let now = unix_now();
        self.update(name, |m| {
            m.last_started_secs = Some(now);
            m.timeout_secs = Some(timeout.as_secs_f64());
        });
    }

    fn on_scale_down(&self, name: &str) {
        self.update(name, |m| {
            m.status = None;
            m.last_started_secs = None;
            m.timeout_secs = None;
        });
        debug!(%name, "service metrics cleared");
    }

    fn on_scale_down_error(&self, name: &str) {
        self.scale_down_errors.fetch_add(1, Ordering::Relaxed);
        self.update(name, |m| m.scale_down_error = true);
    }
}
