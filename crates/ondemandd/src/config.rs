//! Daemon configuration: command-line flags over an optional TOML file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use serde::Deserialize;

use ondemand_activation::parse_duration;
use ondemand_scaler::docker::client::DEFAULT_DOCKER_HOST;

pub const DEFAULT_PORT: u16 = 10000;
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(20);

/// Which scale backend to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Docker Swarm services.
    #[default]
    Swarm,
    /// Plain Docker containers.
    Docker,
    /// Kubernetes Deployments and StatefulSets.
    Kubernetes,
    /// In-memory backend for local testing.
    Mock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Debug, Default)]
#[command(
    name = "ondemandd",
    version,
    about = "Starts workloads on demand and scales them down when idle"
)]
pub struct Cli {
    /// TOML config file. Flags take precedence over its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Scale backend [default: swarm].
    #[arg(long, value_enum)]
    pub provider: Option<Provider>,

    /// Docker endpoint, unix:///path or tcp://host:port
    /// [default: unix:///var/run/docker.sock].
    #[arg(long)]
    pub docker_host: Option<String>,

    /// Port to listen on [default: 10000].
    #[arg(long)]
    pub port: Option<u16>,

    /// Snapshot file. Activation state is not persisted when unset.
    #[arg(long)]
    pub storage_path: Option<PathBuf>,

    /// How often idle workloads are looked for [default: 20s].
    #[arg(long)]
    pub sweep_interval: Option<String>,

    /// How often the snapshot is written [default: 5s].
    #[arg(long)]
    pub snapshot_interval: Option<String>,

    /// Deadline for each scale backend call [default: 30s].
    #[arg(long)]
    pub backend_timeout: Option<String>,

    /// Log output format [default: text].
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,
}

/// Values read from the config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub provider: Option<Provider>,
    pub docker_host: Option<String>,
    pub port: Option<u16>,
    pub storage_path: Option<PathBuf>,
    pub sweep_interval: Option<String>,
    pub snapshot_interval: Option<String>,
    pub backend_timeout: Option<String>,
    pub log_format: Option<LogFormat>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config file {}", path.display()))
    }
}

/// Fully resolved daemon settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub provider: Provider,
    pub docker_host: String,
    pub port: u16,
    pub storage_path: Option<PathBuf>,
    pub sweep_interval: Duration,
    pub snapshot_interval: Duration,
    pub backend_timeout: Duration,
    pub log_format: LogFormat,
}

fn duration_setting(
    key: &str,
    flag: Option<&str>,
    file: Option<&str>,
    default: Duration,
) -> anyhow::Result<Duration> {
    match flag.or(file) {
        Some(raw) => parse_duration(raw).with_context(|| format!("invalid {key} {raw:?}")),
        None => Ok(default),
    }
}

impl Config {
    /// Read the config file named by `--config`, if any, and resolve.
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(cli, file)
    }

    pub fn resolve(cli: &Cli, file: FileConfig) -> anyhow::Result<Self> {
        Ok(Self {
            provider: cli.provider.or(file.provider).unwrap_or_default(),
            docker_host: cli
                .docker_host
                .clone()
                .or(file.docker_host)
                .unwrap_or_else(|| DEFAULT_DOCKER_HOST.to_string()),
            port: cli.port.or(file.port).unwrap_or(DEFAULT_PORT),
            storage_path: cli.storage_path.clone().or(file.storage_path),
            sweep_interval: duration_setting(
                "sweep-interval",
                cli.sweep_interval.as_deref(),
                file.sweep_interval.as_deref(),
                DEFAULT_SWEEP_INTERVAL,
            )?,
            snapshot_interval: duration_setting(
                "snapshot-interval",
                cli.snapshot_interval.as_deref(),
                file.snapshot_interval.as_deref(),
                ondemand_snapshot::DEFAULT_SNAPSHOT_INTERVAL,
            )?,
            backend_timeout: duration_setting(
                "backend-timeout",
                cli.backend_timeout.as_deref(),
                file.backend_timeout.as_deref(),
                ondemand_activation::DEFAULT_BACKEND_TIMEOUT,
            )?,
            log_format: cli.log_format.or(file.log_format).unwrap_or_default(),
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}
