//! Docker Swarm backend. Scales replicated services between 0 and 1.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::backend::ScaleBackend;
use crate::docker::client::DockerClient;
use crate::docker::validate_name;
use crate::error::{ScalerError, ScalerResult};

/// Replica count a swarm service is scaled up to.
const UP_REPLICAS: u64 = 1;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SwarmService {
    #[serde(rename = "ID")]
    id: String,
    version: ServiceVersion,
    spec: Value,
    #[serde(default)]
    service_status: Option<ServiceStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceVersion {
    index: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceStatus {
    #[serde(default)]
    running_tasks: u64,
    #[serde(default)]
    desired_tasks: u64,
}

impl SwarmService {
    fn name(&self) -> Option<&str> {
        self.spec.get("Name").and_then(Value::as_str)
    }

    /// Configured replicas, `None` for global-mode services.
    fn replicas(&self) -> Option<u64> {
        let replicated = self.spec.pointer("/Mode/Replicated")?;
        // The daemon omits `Replicas` when it is zero.
        Some(replicated.get("Replicas").and_then(Value::as_u64).unwrap_or(0))
    }
}

/// Scales Docker Swarm services by name.
pub struct DockerSwarmScaler {
    client: DockerClient,
}

impl DockerSwarmScaler {
    pub fn new(client: DockerClient) -> Self {
        Self { client }
    }

    /// Look up a service by exact name. The daemon's name filter matches
    /// prefixes, so the result is narrowed here.
    async fn find_service(&self, name: &str) -> ScalerResult<SwarmService> {
        validate_name(name)?;

        let filters = json!({ "name": [name] }).to_string();
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("filters", &filters)
            .append_pair("status", "true")
            .finish();

        let resp = self.client.get(name, &format!("/services?{query}")).await?;
        if !resp.status.is_success() {
            return Err(resp.into_error(name));
        }

        let services: Vec<SwarmService> = resp.json(name)?;
        services
            .into_iter()
            .find(|s| s.name() == Some(name))
            .ok_or_else(|| ScalerError::NotFound(name.to_string()))
    }

    async fn scale_to(&self, name: &str, replicas: u64) -> ScalerResult<()> {
        let mut service = self.find_service(name).await?;

        let current = service.replicas().ok_or_else(|| ScalerError::Unsupported {
            name: name.to_string(),
            reason: "global mode services cannot be scaled".to_string(),
        })?;
        if current == replicas {
            info!(%name, replicas, "service already scaled");
            return Ok(());
        }

        let replicated = service
            .spec
            .pointer_mut("/Mode/Replicated")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| ScalerError::Decode {
                name: name.to_string(),
                message: "service spec has no Mode.Replicated".to_string(),
            })?;
        replicated.insert("Replicas".to_string(), json!(replicas));

        let path = format!(
            "/services/{}/update?version={}",
            service.id, service.version.index
        );
        let resp = self.client.post(name, &path, Some(&service.spec)).await?;
        if !resp.status.is_success() {
            return Err(resp.into_error(name));
        }

        info!(%name, from = current, to = replicas, "service scaled");
        Ok(())
    }
}

#[async_trait]
impl ScaleBackend for DockerSwarmScaler {
    async fn scale_up(&self, name: &str) -> ScalerResult<()> {
        self.scale_to(name, UP_REPLICAS).await
    }

    async fn scale_down(&self, name: &str) -> ScalerResult<()> {
        self.scale_to(name, 0).await
    }

    async fn is_up(&self, name: &str) -> ScalerResult<bool> {
        let service = self.find_service(name).await?;
        let replicas = service.replicas().unwrap_or(0);
        let ready = service
            .service_status
            .as_ref()
            .is_some_and(|s| s.desired_tasks > 0 && s.running_tasks >= s.desired_tasks);
        Ok(replicas > 0 && ready)
    }

    fn kind(&self) -> &'static str {
        "swarm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(spec: Value, status: Option<(u64, u64)>) -> SwarmService {
        SwarmService {
            id: "abc".to_string(),
            version: ServiceVersion { index: 7 },
            spec,
            service_status: status.map(|(running_tasks, desired_tasks)| ServiceStatus {
                running_tasks,
                desired_tasks,
            }),
        }
    }

    #[test]
    fn replicas_reads_replicated_mode() {
        let svc = service(
            json!({ "Name": "web", "Mode": { "Replicated": { "Replicas": 3 } } }),
            None,
        );
        assert_eq!(svc.name(), Some("web"));
        assert_eq!(svc.replicas(), Some(3));
    }

    #[test]
    fn omitted_replicas_mean_zero() {
        let svc = service(json!({ "Name": "web", "Mode": { "Replicated": {} } }), None);
        assert_eq!(svc.replicas(), Some(0));
    }

    #[test]
    fn global_mode_has_no_replicas() {
        let svc = service(json!({ "Name": "agent", "Mode": { "Global": {} } }), None);
        assert_eq!(svc.replicas(), None);
    }

    #[test]
    fn decodes_engine_payload() {
        let body = r#"[{
            "ID": "9mnpnzenvg8p8tdbtq4wvbkcz",
            "Version": { "Index": 19 },
            "Spec": { "Name": "web", "Mode": { "Replicated": { "Replicas": 1 } } },
            "ServiceStatus": { "RunningTasks": 1, "DesiredTasks": 1 }
        }]"#;
        let services: Vec<SwarmService> = serde_json::from_str(body).unwrap();
        assert_eq!(services[0].id, "9mnpnzenvg8p8tdbtq4wvbkcz");
        assert_eq!(services[0].version.index, 19);
        let status = services[0].service_status.as_ref().unwrap();
        assert_eq!((status.running_tasks, status.desired_tasks), (1, 1));
    }
}
