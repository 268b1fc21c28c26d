//! Activation request parsing.

use std::time::Duration;

use crate::duration::parse_duration;
use crate::error::{ActivationError, ActivationResult};

/// A validated activation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationRequest {
    pub name: String,
    /// Idle timeout after which the workload is scaled down.
    pub timeout: Duration,
}

impl ActivationRequest {
    pub fn new(name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            timeout,
        }
    }

    /// Validate raw `name` and `timeout` query values.
    pub fn parse(name: Option<&str>, timeout: Option<&str>) -> ActivationResult<Self> {
        let name = name.ok_or(ActivationError::MissingParam("name"))?;
        if name.is_empty() {
            return Err(ActivationError::EmptyName);
        }
        let raw = timeout.ok_or(ActivationError::MissingParam("timeout"))?;
        let timeout = parse_duration(raw).map_err(|source| ActivationError::InvalidTimeout {
            value: raw.to_string(),
            source,
        })?;
        Ok(Self::new(name, timeout))
    }
}
