//! The scale backend capability.

use async_trait::async_trait;

use crate::error::ScalerResult;

/// Starts, stops and probes named workloads on one platform.
///
/// Implementations are shared across all requests and must be safe for
/// concurrent use. Calls for the same name may arrive concurrently;
/// scaling to the current state must be a no-op.
#[async_trait]
pub trait ScaleBackend: Send + Sync {
    /// Bring the workload up.
    async fn scale_up(&self, name: &str) -> ScalerResult<()>;

    /// Take the workload down.
    async fn scale_down(&self, name: &str) -> ScalerResult<()>;

    /// Whether the workload is running and ready to serve.
    async fn is_up(&self, name: &str) -> ScalerResult<bool>;

    /// Backend name (for logging).
    fn kind(&self) -> &'static str;
}
