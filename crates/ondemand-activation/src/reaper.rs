//! Idle reaper: the eviction path of the control loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use ondemand_metrics::ObservabilityHooks;
use ondemand_scaler::ScaleBackend;
use ondemand_state::{ActivationRecord, EvictionHandler};

use crate::activator::DEFAULT_BACKEND_TIMEOUT;
use crate::error::{BackendOp, bounded};

/// Scales down workloads whose idle timeout elapsed.
///
/// A failed scale down is reported and not retried. The next activation
/// of that name re-checks readiness with the backend.
pub struct IdleReaper {
    backend: Arc<dyn ScaleBackend>,
    hooks: Arc<dyn ObservabilityHooks>,
    backend_timeout: Duration,
}

impl IdleReaper {
    pub fn new(backend: Arc<dyn ScaleBackend>, hooks: Arc<dyn ObservabilityHooks>) -> Self {
        Self {
            backend,
            hooks,
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
        }
    }

    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }
}

#[async_trait]
impl EvictionHandler<ActivationRecord> for IdleReaper {
    async fn on_evict(&self, name: String, record: ActivationRecord) {
        let result = bounded(
            BackendOp::ScaleDown,
            &name,
            self.backend_timeout,
            self.backend.scale_down(&name),
        )
        .await;

        match result {
            Ok(()) => {
                info!(%name, last_state = %record.state, "idle workload scaled down");
                self.hooks.on_scale_down(&name);
            }
            Err(e) => {
                warn!(%name, error = %e, "scale down failed");
                self.hooks.on_scale_down_error(&name);
            }
        }
    }
}
