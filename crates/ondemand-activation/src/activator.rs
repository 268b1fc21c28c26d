//! Activation handler: the request path of the control loop.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use ondemand_metrics::ObservabilityHooks;
use ondemand_scaler::ScaleBackend;
use ondemand_state::{ActivationRecord, ActivationState, ExpiringStore};

use crate::error::{ActivationError, ActivationResult, BackendOp, bounded};
use crate::request::ActivationRequest;

/// Default deadline for a single backend call.
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Decides and records the activation state of workloads on request.
#[derive(Clone)]
pub struct Activator {
    store: ExpiringStore<ActivationRecord>,
    backend: Arc<dyn ScaleBackend>,
    hooks: Arc<dyn ObservabilityHooks>,
    backend_timeout: Duration,
}

impl Activator {
    pub fn new(
        store: ExpiringStore<ActivationRecord>,
        backend: Arc<dyn ScaleBackend>,
        hooks: Arc<dyn ObservabilityHooks>,
    ) -> Self {
        Self {
            store,
            backend,
            hooks,
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
        }
    }

    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    pub fn store(&self) -> &ExpiringStore<ActivationRecord> {
        &self.store
    }

    /// Parse raw query values and activate.
    pub async fn handle(
        &self,
        name: Option<&str>,
        timeout: Option<&str>,
    ) -> ActivationResult<ActivationState> {
        let request = ActivationRequest::parse(name, timeout)?;
        self.activate(&request).await
    }

    /// Make sure `request.name` is running or starting, and push its idle
    /// deadline to `request.timeout` from now.
    ///
    /// The sequence runs on its own task. Dropping the returned future
    /// does not cancel it, so a scale up that reached the backend is
    /// always followed by a record that will expire.
    pub async fn activate(&self, request: &ActivationRequest) -> ActivationResult<ActivationState> {
        let activator = self.clone();
        let owned = request.clone();
        tokio::spawn(async move { activator.activate_locked(&owned).await })
            .await
            .map_err(|source| ActivationError::Interrupted {
                name: request.name.clone(),
                source,
            })?
    }

    /// The key lock is held across the whole read-decide-store sequence,
    /// so requests for one name are linearized with each other and with
    /// its eviction. On backend failure nothing is stored.
    async fn activate_locked(&self, request: &ActivationRequest) -> ActivationResult<ActivationState> {
        let name = request.name.as_str();
        let _guard = self.store.lock_key(name).await;

        let state = match self.store.get(name) {
            Some(record) if record.state == ActivationState::Started => {
                debug!(%name, "cached as started, renewing");
                ActivationState::Started
            }
            cached => self.decide(name, cached.map(|r| r.state)).await?,
        };

        self.store
            .put(name, ActivationRecord::new(name, state), request.timeout);
        self.hooks.on_timeout_set(name, request.timeout);
        self.hooks.on_state_change(name, state);
        Ok(state)
    }

    /// Ask the backend, and start the workload if it is not up.
    async fn decide(
        &self,
        name: &str,
        cached: Option<ActivationState>,
    ) -> ActivationResult<ActivationState> {
        let up = bounded(
            BackendOp::IsUp,
            name,
            self.backend_timeout,
            self.backend.is_up(name),
        )
        .await?;
        if up {
            debug!(%name, ?cached, "workload is up");
            return Ok(ActivationState::Started);
        }

        bounded(
            BackendOp::ScaleUp,
            name,
            self.backend_timeout,
            self.backend.scale_up(name),
        )
        .await?;
        info!(%name, backend = self.backend.kind(), "workload scale up requested");
        Ok(ActivationState::Starting)
    }
}
