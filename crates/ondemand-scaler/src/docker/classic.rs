//! Docker backend for standalone containers, started and stopped by name.

use async_trait::async_trait;
use http::StatusCode;
use serde::Deserialize;
use tracing::info;

use crate::backend::ScaleBackend;
use crate::docker::client::{DockerClient, DockerResponse};
use crate::docker::validate_name;
use crate::error::ScalerResult;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerInspect {
    state: ContainerState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerState {
    #[serde(default)]
    running: bool,
    #[serde(default)]
    health: Option<ContainerHealth>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerHealth {
    status: String,
}

impl ContainerState {
    /// Running, and healthy if the container defines a healthcheck.
    fn is_ready(&self) -> bool {
        match &self.health {
            Some(health) => self.running && health.status == "healthy",
            None => self.running,
        }
    }
}

/// Starts and stops plain Docker containers.
pub struct DockerClassicScaler {
    client: DockerClient,
}

impl DockerClassicScaler {
    pub fn new(client: DockerClient) -> Self {
        Self { client }
    }

    /// Start/stop share the same status handling: 304 means the container
    /// is already in the requested state.
    fn check(name: &str, resp: DockerResponse) -> ScalerResult<bool> {
        let status = resp.status;
        match status {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_MODIFIED => Ok(false),
            _ => Err(resp.into_error(name)),
        }
    }
}

#[async_trait]
impl ScaleBackend for DockerClassicScaler {
    async fn scale_up(&self, name: &str) -> ScalerResult<()> {
        validate_name(name)?;
        let resp = self
            .client
            .post(name, &format!("/containers/{name}/start"), None)
            .await?;
        if Self::check(name, resp)? {
            info!(%name, "container started");
        }
        Ok(())
    }

    async fn scale_down(&self, name: &str) -> ScalerResult<()> {
        validate_name(name)?;
        let resp = self
            .client
            .post(name, &format!("/containers/{name}/stop"), None)
            .await?;
        if Self::check(name, resp)? {
            info!(%name, "container stopped");
        }
        Ok(())
    }

    async fn is_up(&self, name: &str) -> ScalerResult<bool> {
        validate_name(name)?;
        let resp = self
            .client
            .get(name, &format!("/containers/{name}/json"))
            .await?;
        if !resp.status.is_success() {
            return Err(resp.into_error(name));
        }
        let inspect: ContainerInspect = resp.json(name)?;
        Ok(inspect.state.is_ready())
    }

    fn kind(&self) -> &'static str {
        "docker"
    }
}
