//! # Oculex Server
//!
//! Session server coordinating a supervised clinical testing session.
//!
//! ## Overview
//!
//! - **Real-time relay**: doctor and patient clients join role groups over
//!   a websocket and exchange instructions, presence, and telemetry
//! - **Result ingest**: finished tests and clinician notes are appended to
//!   the category-partitioned result workbook
//! - **Patient history**: stored rows for a patient, grouped by test
//!
//! ## Architecture
//!
//! The server is built on Axum and uses:
//! - a JSON workbook on local disk for persistent results
//! - per-connection channels for fire-and-forget event fan-out
//! - environment-first configuration with `.env` support

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use oculex_core::ResultStore;
use oculex_server::{
    AppState,
    infra::config::{Config, ConfigLoad, ConfigLoader},
    relay::RelayHub,
    routes,
};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "oculex-server")]
#[command(about = "Session server for supervised clinical testing")]
struct Cli {
    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,

    /// Workbook document path (overrides config)
    #[arg(long, env = "WORKBOOK_PATH")]
    workbook: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_server(cli).await
}

fn load_runtime_config(args: &Cli) -> anyhow::Result<Arc<Config>> {
    let ConfigLoad { mut config, warnings } = ConfigLoader::new()
        .load()
        .context("failed to load configuration")?;
    apply_cli_overrides(&mut config, args);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }

    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }

    info!(
        workbook = %config.store.workbook_path.display(),
        gateway = %config.gateway.url,
        "configuration in effect"
    );

    Ok(Arc::new(config))
}

fn apply_cli_overrides(config: &mut Config, args: &Cli) {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host.clone() {
        config.server.host = host;
    }
    if let Some(workbook) = args.workbook.clone() {
        config.store.workbook_path = workbook;
    }
}

fn wire_app_resources(config: Arc<Config>) -> AppState {
    let store = Arc::new(ResultStore::open(&config.store.workbook_path));
    if !store.is_durable() {
        warn!(
            "result store is running memory-only - submitted records will not survive a restart"
        );
    }

    let relay = Arc::new(RelayHub::new());

    AppState::new(config, store, relay)
}

async fn run_server(args: Cli) -> anyhow::Result<()> {
    let config = load_runtime_config(&args)?;
    let state = wire_app_resources(Arc::clone(&config));
    let app = routes::create_app(state);

    info!(
        "Starting Oculex session server on {}:{}",
        config.server.host, config.server.port
    );

    let listener = tokio::net::TcpListener::bind((
        config.server.host.as_str(),
        config.server.port,
    ))
    .await
    .with_context(|| {
        format!(
            "failed to bind {}:{}",
            config.server.host, config.server.port
        )
    })?;
    axum::serve(listener, app).await?;

    Ok(())
}
