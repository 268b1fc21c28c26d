//! ondemandd: the on-demand gateway daemon.
//!
//! Assembles the gateway from its parts:
//! - Scale backend (Docker Swarm, Docker, Kubernetes or mock)
//! - Expiring activation store + idle reaper
//! - Activation handler
//! - Optional redb snapshot persister
//! - HTTP API (`/` and `/metrics`)
//!
//! # Usage
//!
//! ```text
//! ondemandd --provider swarm --port 10000 --storage-path /data/ondemand.redb
//! ```

mod config;
mod daemon;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::{Cli, Config, LogFormat};

const DEFAULT_LOG_FILTER: &str = "info,ondemand=debug";

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli)?;
    init_tracing(config.log_format);

    daemon::run(config).await
}
