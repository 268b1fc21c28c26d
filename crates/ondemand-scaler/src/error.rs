//! Scale backend error types.

use thiserror::Error;

/// Result type alias for scale backend operations.
pub type ScalerResult<T> = Result<T, ScalerError>;

/// Errors returned by scale backends. Each carries the workload name.
#[derive(Debug, Error)]
pub enum ScalerError {
    #[error("workload not found: {0}")]
    NotFound(String),

    #[error("invalid workload name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("{name}: unsupported workload: {reason}")]
    Unsupported { name: String, reason: String },

    #[error("{name}: backend returned {status}: {message}")]
    Api {
        name: String,
        status: u16,
        message: String,
    },

    #[error("{name}: transport error: {message}")]
    Transport { name: String, message: String },

    #[error("{name}: unexpected response: {message}")]
    Decode { name: String, message: String },

    #[error("backend configuration error: {0}")]
    Config(String),

    #[cfg(feature = "kubernetes")]
    #[error("{name}: kubernetes api error: {source}")]
    Kubernetes {
        name: String,
        #[source]
        source: kube::Error,
    },
}
