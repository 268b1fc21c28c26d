//! Scale backends for the on-demand gateway.
//!
//! A [`ScaleBackend`] starts, stops and probes a single named workload.
//! Implementations resolve the name to the platform's deployable unit:
//!
//! | Backend | Name | Up | Down |
//! |---|---|---|---|
//! | [`DockerSwarmScaler`] | service name | replicas = 1 | replicas = 0 |
//! | [`DockerClassicScaler`] | container name | container start | container stop |
//! | `KubernetesScaler` | `<kind>_<namespace>_<name>_<replicas>` | scale to replicas | scale to 0 |
//! | [`MockScaler`] | any | in-memory | in-memory |
//!
//! Every operation is idempotent: scaling to the state a workload is
//! already in succeeds without side effects.

pub mod backend;
pub mod docker;
pub mod error;
#[cfg(feature = "kubernetes")]
pub mod kubernetes;
pub mod mock;

pub use backend::ScaleBackend;
pub use docker::{DockerClassicScaler, DockerClient, DockerSwarmScaler};
pub use error::{ScalerError, ScalerResult};
#[cfg(feature = "kubernetes")]
pub use kubernetes::{KubernetesScaler, WorkloadKind, WorkloadRef};
pub use mock::{MockScaler, ScaleCall};
