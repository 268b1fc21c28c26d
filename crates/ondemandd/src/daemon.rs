//! Wiring and lifecycle of the running daemon.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use ondemand_activation::{Activator, IdleReaper};
use ondemand_api::{ApiState, build_router};
use ondemand_metrics::MetricsRegistry;
use ondemand_scaler::{
    DockerClassicScaler, DockerClient, DockerSwarmScaler, MockScaler, ScaleBackend,
};
use ondemand_snapshot::{SnapshotPersister, SnapshotStore};
use ondemand_state::{ActivationRecord, ExpiringStore};

use crate::config::{Config, Provider};

async fn build_backend(config: &Config) -> anyhow::Result<Arc<dyn ScaleBackend>> {
    let backend: Arc<dyn ScaleBackend> = match config.provider {
        Provider::Swarm => Arc::new(DockerSwarmScaler::new(DockerClient::new(
            &config.docker_host,
        )?)),
        Provider::Docker => Arc::new(DockerClassicScaler::new(DockerClient::new(
            &config.docker_host,
        )?)),
        Provider::Kubernetes => kubernetes_backend().await?,
        Provider::Mock => Arc::new(MockScaler::instant()),
    };
    Ok(backend)
}

#[cfg(feature = "kubernetes")]
async fn kubernetes_backend() -> anyhow::Result<Arc<dyn ScaleBackend>> {
    let scaler = ondemand_scaler::KubernetesScaler::try_default().await?;
    Ok(Arc::new(scaler))
}

#[cfg(not(feature = "kubernetes"))]
async fn kubernetes_backend() -> anyhow::Result<Arc<dyn ScaleBackend>> {
    anyhow::bail!("ondemandd was built without kubernetes support")
}

/// Resolves once Ctrl-C or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Serve until `signal` fires and in-flight requests drain, then stop the
/// background loops. Renewals landing during the drain reach the final
/// snapshot.
async fn serve(
    listener: TcpListener,
    router: Router,
    signal: impl Future<Output = ()> + Send + 'static,
    shutdown_tx: watch::Sender<bool>,
) -> std::io::Result<()> {
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(signal)
        .await;
    let _ = shutdown_tx.send(true);
    served
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    info!(provider = ?config.provider, port = config.port, "on-demand gateway starting");

    // ── Initialize subsystems ──────────────────────────────────

    let backend = build_backend(&config)
        .await
        .context("creating scale backend")?;
    info!(backend = backend.kind(), "scale backend ready");

    let metrics = Arc::new(MetricsRegistry::new());

    let reaper = IdleReaper::new(backend.clone(), metrics.clone())
        .with_backend_timeout(config.backend_timeout);
    let store: ExpiringStore<ActivationRecord> =
        ExpiringStore::new(config.sweep_interval, Arc::new(reaper));

    let activator = Activator::new(store.clone(), backend, metrics.clone())
        .with_backend_timeout(config.backend_timeout);

    let persister = match &config.storage_path {
        Some(path) => {
            let snapshots = SnapshotStore::open(path)
                .with_context(|| format!("opening snapshot file {}", path.display()))?;
            let persister =
                SnapshotPersister::new(snapshots, store.clone(), config.snapshot_interval);
            if let Err(e) = persister.restore() {
                error!(error = %e, "activation snapshot restore failed");
            }
            Some(persister)
        }
        None => None,
    };

    // ── Background tasks ───────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper_handle = {
        let store = store.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { store.run(shutdown).await })
    };

    let persister_handle = persister.map(|persister| {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { persister.run(shutdown).await })
    });

    // ── API server ─────────────────────────────────────────────

    let router = build_router(ApiState {
        activator: Arc::new(activator),
        metrics,
    });
    let addr = config.listen_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");

    serve(
        listener,
        router,
        async {
            shutdown_signal().await;
            info!("shutdown signal received");
        },
        shutdown_tx,
    )
    .await?;

    let _ = sweeper_handle.await;
    if let Some(handle) = persister_handle {
        let _ = handle.await;
    }

    info!("on-demand gateway stopped");
    Ok(())
}
