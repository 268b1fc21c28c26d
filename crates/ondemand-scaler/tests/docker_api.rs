//! Docker backends against a fake Engine API served over TCP.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use serde_json::{Value, json};

use ondemand_scaler::{
    DockerClassicScaler, DockerClient, DockerSwarmScaler, ScaleBackend, ScalerError,
};

#[derive(Default)]
struct FakeEngine {
    services: Vec<Value>,
    /// container name → running
    containers: HashMap<String, bool>,
    updates: Vec<(String, String, Value)>,
}

type Shared = Arc<Mutex<FakeEngine>>;

async fn list_services(
    State(engine): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let filters: Value = serde_json::from_str(query.get("filters").unwrap()).unwrap();
    let prefix = filters["name"][0].as_str().unwrap().to_string();
    let engine = engine.lock().unwrap();
    let matching: Vec<Value> = engine
        .services
        .iter()
        .filter(|s| s["Spec"]["Name"].as_str().unwrap().starts_with(&prefix))
        .cloned()
        .collect();
    Json(matching)
}

async fn update_service(
    State(engine): State<Shared>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(spec): Json<Value>,
) -> impl IntoResponse {
    let mut engine = engine.lock().unwrap();
    let version = query.get("version").cloned().unwrap_or_default();
    engine.updates.push((id.clone(), version, spec.clone()));
    if let Some(svc) = engine.services.iter_mut().find(|s| s["ID"] == id) {
        svc["Spec"] = spec;
    }
    Json(json!({ "Warnings": [] }))
}

async fn start_container(State(engine): State<Shared>, Path(name): Path<String>) -> StatusCode {
    set_running(&engine, &name, true)
}

async fn stop_container(State(engine): State<Shared>, Path(name): Path<String>) -> StatusCode {
    set_running(&engine, &name, false)
}

fn set_running(engine: &Shared, name: &str, running: bool) -> StatusCode {
    let mut engine = engine.lock().unwrap();
    match engine.containers.get_mut(name) {
        None => StatusCode::NOT_FOUND,
        Some(state) if *state == running => StatusCode::NOT_MODIFIED,
        Some(state) => {
            *state = running;
            StatusCode::NO_CONTENT
        }
    }
}

async fn inspect_container(
    State(engine): State<Shared>,
    Path(name): Path<String>,
) -> axum::response::Response {
    let engine = engine.lock().unwrap();
    match engine.containers.get(&name) {
        Some(running) => Json(json!({ "State": { "Running": running } })).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": format!("No such container: {name}") })),
        )
            .into_response(),
    }
}

async fn spawn_engine(engine: FakeEngine) -> (SocketAddr, Shared) {
    let shared: Shared = Arc::new(Mutex::new(engine));
    let router = Router::new()
        .route("/v1.41/services", get(list_services))
        .route("/v1.41/services/{id}/update", post(update_service))
        .route("/v1.41/containers/{name}/start", post(start_container))
        .route("/v1.41/containers/{name}/stop", post(stop_container))
        .route("/v1.41/containers/{name}/json", get(inspect_container))
        .with_state(shared.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, shared)
}

fn swarm_service(id: &str, name: &str, replicas: u64, running: u64) -> Value {
    json!({
        "ID": id,
        "Version": { "Index": 42 },
        "Spec": { "Name": name, "Mode": { "Replicated": { "Replicas": replicas } } },
        "ServiceStatus": { "RunningTasks": running, "DesiredTasks": replicas }
    })
}

fn client(addr: SocketAddr) -> DockerClient {
    DockerClient::new(&format!("tcp://{addr}")).unwrap()
}

// ── Swarm ──────────────────────────────────────────────────────

#[tokio::test]
async fn swarm_scale_up_sets_one_replica() {
    let (addr, engine) = spawn_engine(FakeEngine {
        services: vec![
            swarm_service("id-web", "web", 0, 0),
            swarm_service("id-webapp", "webapp", 0, 0),
        ],
        ..Default::default()
    })
    .await;
    let scaler = DockerSwarmScaler::new(client(addr));

    scaler.scale_up("web").await.unwrap();

    let engine = engine.lock().unwrap();
    assert_eq!(engine.updates.len(), 1);
    let (id, version, spec) = &engine.updates[0];
    assert_eq!(id, "id-web");
    assert_eq!(version, "42");
    assert_eq!(spec["Mode"]["Replicated"]["Replicas"], 1);
}

#[tokio::test]
async fn swarm_scale_is_noop_when_already_scaled() {
    let (addr, engine) = spawn_engine(FakeEngine {
        services: vec![swarm_service("id-web", "web", 0, 0)],
        ..Default::default()
    })
    .await;
    let scaler = DockerSwarmScaler::new(client(addr));

    scaler.scale_down("web").await.unwrap();
    assert!(engine.lock().unwrap().updates.is_empty());
}

#[tokio::test]
async fn swarm_is_up_requires_running_tasks() {
    let (addr, _) = spawn_engine(FakeEngine {
        services: vec![
            swarm_service("1", "ready", 1, 1),
            swarm_service("2", "pending", 1, 0),
            swarm_service("3", "stopped", 0, 0),
        ],
        ..Default::default()
    })
    .await;
    let scaler = DockerSwarmScaler::new(client(addr));

    assert!(scaler.is_up("ready").await.unwrap());
    assert!(!scaler.is_up("pending").await.unwrap());
    assert!(!scaler.is_up("stopped").await.unwrap());
}

#[tokio::test]
async fn swarm_unknown_service_is_not_found() {
    let (addr, _) = spawn_engine(FakeEngine {
        services: vec![swarm_service("1", "webapp", 1, 1)],
        ..Default::default()
    })
    .await;
    let scaler = DockerSwarmScaler::new(client(addr));

    // "web" prefix-matches "webapp" at the daemon but is not the same service.
    let err = scaler.scale_up("web").await.unwrap_err();
    assert!(matches!(err, ScalerError::NotFound(name) if name == "web"));
}

#[tokio::test]
async fn swarm_rejects_global_services() {
    let (addr, _) = spawn_engine(FakeEngine {
        services: vec![json!({
            "ID": "g",
            "Version": { "Index": 1 },
            "Spec": { "Name": "agent", "Mode": { "Global": {} } }
        })],
        ..Default::default()
    })
    .await;
    let scaler = DockerSwarmScaler::new(client(addr));

    let err = scaler.scale_up("agent").await.unwrap_err();
    assert!(matches!(err, ScalerError::Unsupported { .. }));
}

// ── Classic ────────────────────────────────────────────────────

#[tokio::test]
async fn classic_start_stop_roundtrip() {
    let (addr, engine) = spawn_engine(FakeEngine {
        containers: HashMap::from([("whoami".to_string(), false)]),
        ..Default::default()
    })
    .await;
    let scaler = DockerClassicScaler::new(client(addr));

    assert!(!scaler.is_up("whoami").await.unwrap());
    scaler.scale_up("whoami").await.unwrap();
    assert!(scaler.is_up("whoami").await.unwrap());

    // Already running: 304 is success.
    scaler.scale_up("whoami").await.unwrap();

    scaler.scale_down("whoami").await.unwrap();
    assert_eq!(engine.lock().unwrap().containers["whoami"], false);
    scaler.scale_down("whoami").await.unwrap();
}

#[tokio::test]
async fn classic_unknown_container_is_not_found() {
    let (addr, _) = spawn_engine(FakeEngine::default()).await;
    let scaler = DockerClassicScaler::new(client(addr));

    assert!(matches!(
        scaler.scale_up("ghost").await,
        Err(ScalerError::NotFound(_))
    ));
    assert!(matches!(
        scaler.is_up("ghost").await,
        Err(ScalerError::NotFound(_))
    ));
}

#[tokio::test]
async fn unreachable_daemon_is_transport_error() {
    // Bind then drop to get a port nobody listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let scaler = DockerClassicScaler::new(client(addr));
    let err = scaler.is_up("web").await.unwrap_err();
    assert!(matches!(err, ScalerError::Transport { name, .. } if name == "web"));
}
