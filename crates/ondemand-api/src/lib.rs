//! HTTP API for the on-demand gateway.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/?name=<name>&timeout=<duration>` | Activate a workload and renew its idle timeout |
//! | GET | `/metrics` | Prometheus exposition |
//!
//! Activation answers `201 started` or `202 starting` as `text/plain`.
//! Every failure, including malformed parameters, is a `500` whose body is
//! the error message.

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;

use ondemand_activation::Activator;
use ondemand_metrics::MetricsRegistry;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub activator: Arc<Activator>,
    pub metrics: Arc<MetricsRegistry>,
}

/// Build the complete router.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(handlers::activate))
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(state)
}
