//! Kubernetes backend. Scales Deployments and StatefulSets through the
//! `/scale` subresource.
//!
//! Workload names encode the target: `<kind>_<namespace>_<name>_<replicas>`,
//! e.g. `deployment_default_whoami_1`. Kubernetes object names cannot
//! contain `_`, so the split is unambiguous.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use kube::api::{Api, Patch, PatchParams};
use serde_json::json;
use tracing::info;

use crate::backend::ScaleBackend;
use crate::error::{ScalerError, ScalerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deployment => write!(f, "deployment"),
            Self::StatefulSet => write!(f, "statefulset"),
        }
    }
}

/// A parsed Kubernetes workload name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadRef {
    pub kind: WorkloadKind,
    pub namespace: String,
    pub name: String,
    /// Replicas to run when scaled up.
    pub replicas: i32,
}

impl FromStr for WorkloadRef {
    type Err = ScalerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ScalerError::InvalidName {
            name: s.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = s.split('_').collect();
        let [kind, namespace, name, replicas] = parts.as_slice() else {
            return Err(invalid("expected <kind>_<namespace>_<name>_<replicas>"));
        };

        let kind = match *kind {
            "deployment" => WorkloadKind::Deployment,
            "statefulset" => WorkloadKind::StatefulSet,
            _ => return Err(invalid("kind must be deployment or statefulset")),
        };
        if namespace.is_empty() || name.is_empty() {
            return Err(invalid("namespace and name must not be empty"));
        }
        let replicas = replicas
            .parse::<i32>()
            .ok()
            .filter(|r| *r > 0)
            .ok_or_else(|| invalid("replicas must be a positive integer"))?;

        Ok(Self {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            replicas,
        })
    }
}

/// Scales Kubernetes workloads.
pub struct KubernetesScaler {
    client: kube::Client,
}

impl KubernetesScaler {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    /// Build a client from the in-cluster service account, or the local
    /// kubeconfig when running outside a cluster.
    pub async fn try_default() -> ScalerResult<Self> {
        let client = kube::Client::try_default()
            .await
            .map_err(|e| ScalerError::Config(format!("kubernetes client: {e}")))?;
        Ok(Self::new(client))
    }

    async fn scale_to(&self, name: &str, replicas: i32) -> ScalerResult<()> {
        let workload: WorkloadRef = name.parse()?;
        let patch = Patch::Merge(json!({ "spec": { "replicas": replicas } }));
        let params = PatchParams::default();

        let result = match workload.kind {
            WorkloadKind::Deployment => {
                let api: Api<Deployment> = Api::namespaced(self.client.clone(), &workload.namespace);
                api.patch_scale(&workload.name, &params, &patch).await
            }
            WorkloadKind::StatefulSet => {
                let api: Api<StatefulSet> =
                    Api::namespaced(self.client.clone(), &workload.namespace);
                api.patch_scale(&workload.name, &params, &patch).await
            }
        };
        result.map_err(|e| kube_error(name, e))?;

        info!(
            %name,
            kind = %workload.kind,
            namespace = %workload.namespace,
            replicas,
            "workload scaled"
        );
        Ok(())
    }
}

fn kube_error(name: &str, e: kube::Error) -> ScalerError {
    match e {
        kube::Error::Api(resp) if resp.code == 404 => ScalerError::NotFound(name.to_string()),
        source => ScalerError::Kubernetes {
            name: name.to_string(),
            source,
        },
    }
}

#[async_trait]
impl ScaleBackend for KubernetesScaler {
    async fn scale_up(&self, name: &str) -> ScalerResult<()> {
        let workload: WorkloadRef = name.parse()?;
        self.scale_to(name, workload.replicas).await
    }

    async fn scale_down(&self, name: &str) -> ScalerResult<()> {
        self.scale_to(name, 0).await
    }

    async fn is_up(&self, name: &str) -> ScalerResult<bool> {
        let workload: WorkloadRef = name.parse()?;
        let ready = match workload.kind {
            WorkloadKind::Deployment => {
                let api: Api<Deployment> = Api::namespaced(self.client.clone(), &workload.namespace);
                api.get(&workload.name)
                    .await
                    .map_err(|e| kube_error(name, e))?
                    .status
                    .and_then(|s| s.ready_replicas)
            }
            WorkloadKind::StatefulSet => {
                let api: Api<StatefulSet> =
                    Api::namespaced(self.client.clone(), &workload.namespace);
                api.get(&workload.name)
                    .await
                    .map_err(|e| kube_error(name, e))?
                    .status
                    .and_then(|s| s.ready_replicas)
            }
        };
        Ok(ready.unwrap_or(0) >= workload.replicas)
    }

    fn kind(&self) -> &'static str {
        "kubernetes"
    }
}
