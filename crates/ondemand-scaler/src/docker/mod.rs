//! Docker Engine API backends.
//!
//! Both backends talk HTTP/1.1 to the daemon through [`DockerClient`],
//! over the local Unix socket or a `tcp://` endpoint.

pub mod classic;
pub mod client;
pub mod swarm;

pub use classic::DockerClassicScaler;
pub use client::DockerClient;
pub use swarm::DockerSwarmScaler;

use crate::error::{ScalerError, ScalerResult};

/// Reject names that cannot be a container or service name. Keeps the
/// name safe to splice into request paths.
pub(crate) fn validate_name(name: &str) -> ScalerResult<()> {
    let invalid = |reason: &str| ScalerError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("empty"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(invalid("allowed characters are [A-Za-z0-9_.-]"));
    }
    Ok(())
}
