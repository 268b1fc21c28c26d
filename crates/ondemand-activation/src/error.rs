use std::fmt;
use std::time::Duration;

use thiserror::Error;

use ondemand_scaler::ScalerError;

use crate::duration::ParseDurationError;

pub type ActivationResult<T> = Result<T, ActivationError>;

/// A scale backend operation, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendOp {
    IsUp,
    ScaleUp,
    ScaleDown,
}

impl fmt::Display for BackendOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::IsUp => "readiness check",
            Self::ScaleUp => "scale up",
            Self::ScaleDown => "scale down",
        })
    }
}

#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("{0} is required")]
    MissingParam(&'static str),

    #[error("name must not be empty")]
    EmptyName,

    #[error("invalid timeout {value:?}: {source}")]
    InvalidTimeout {
        value: String,
        #[source]
        source: ParseDurationError,
    },

    #[error("readiness check of {name} failed: {source}")]
    IsUp {
        name: String,
        #[source]
        source: ScalerError,
    },

    #[error("scale up of {name} failed: {source}")]
    ScaleUp {
        name: String,
        #[source]
        source: ScalerError,
    },

    #[error("scale down of {name} failed: {source}")]
    ScaleDown {
        name: String,
        #[source]
        source: ScalerError,
    },

    #[error("{operation} of {name} timed out after {after:?}")]
    Timeout {
        name: String,
        operation: BackendOp,
        after: Duration,
    },

    #[error("activation of {name} was interrupted: {source}")]
    Interrupted {
        name: String,
        #[source]
        source: tokio::task::JoinError,
    },
}

impl ActivationError {
    pub(crate) fn backend(operation: BackendOp, name: &str, source: ScalerError) -> Self {
        let name = name.to_string();
        match operation {
            BackendOp::IsUp => Self::IsUp { name, source },
            BackendOp::ScaleUp => Self::ScaleUp { name, source },
            BackendOp::ScaleDown => Self::ScaleDown { name, source },
        }
    }

    /// True for malformed requests, false for backend failures.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingParam(_) | Self::EmptyName | Self::InvalidTimeout { .. }
        )
    }
}

/// Run one backend call under `deadline`, wrapping failures with the
/// workload name.
pub(crate) async fn bounded<T>(
    operation: BackendOp,
    name: &str,
    deadline: Duration,
    call: impl Future<Output = Result<T, ScalerError>>,
) -> ActivationResult<T> {
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result.map_err(|source| ActivationError::backend(operation, name, source)),
        Err(_) => Err(ActivationError::Timeout {
            name: name.to_string(),
            operation,
            after: deadline,
        }),
    }
}
