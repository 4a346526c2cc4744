//! ReconHive Controller Daemon
//!
//! Serves the worker RPC API, queues tasks and raises the resync flag when
//! the shared sync directory changes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rh_controller::fleet::{run_sync_watcher, watch_sync_dir};
use rh_controller::server::load_acceptor;
use rh_controller::{build_method_table, ControllerState, ControllerStore, MemoryStore, RpcServer};
use rh_core::auth::generate_token;
use rh_core::config::{self, ControllerConfig};
use rh_core::{ScanConfig, TaskDescriptor, TaskType};

#[derive(Parser)]
#[command(name = "rh-controller")]
#[command(about = "ReconHive controller daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// JSON task files to queue at startup
    #[arg(long = "seed")]
    seed: Vec<PathBuf>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// A root task as written in a seed file
#[derive(Deserialize)]
struct SeedTask {
    task_type: TaskType,
    config: serde_json::Value,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("ReconHive controller starting...");

    let mut config = load_controller_config(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if config.auth_key.is_empty() {
        config.auth_key = generate_token();
        tracing::warn!("No auth_key configured, generated one for this run: {}", config.auth_key);
    }

    let store = Arc::new(MemoryStore::new());
    for path in &args.seed {
        let task = load_seed(path)?;
        let task_id = store.enqueue_task(task).await?;
        tracing::info!("Queued seed task {} from {:?}", task_id, path);
    }

    let state = Arc::new(ControllerState::with_store(config.clone(), store));
    let table = build_method_table(Arc::clone(&state)).context("Failed to register RPC methods")?;

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    // Keep the watcher alive for the lifetime of the server
    let _watcher = match &config.sync_dir {
        Some(dir) => {
            let (tx, rx) = mpsc::channel(64);
            let watcher = watch_sync_dir(dir, tx)
                .with_context(|| format!("Failed to watch sync dir {:?}", dir))?;
            tokio::spawn(run_sync_watcher(
                Arc::clone(state.registry()),
                rx,
                cancel.clone(),
            ));
            Some(watcher)
        }
        None => None,
    };

    let mut server = RpcServer::new(table, config.auth_key.clone(), cancel.clone());
    if config.tls.enabled {
        let acceptor = load_acceptor(&config.tls).context("Failed to load TLS certificate")?;
        server = server.with_tls(acceptor);
    }

    server.run(&config.bind_address).await?;

    tracing::info!("Controller shutdown complete");
    Ok(())
}

fn load_controller_config(path: Option<&Path>) -> Result<ControllerConfig> {
    if let Some(path) = path {
        return config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path));
    }

    let default_path = config::default_config_path("controller.toml");
    if default_path.exists() {
        Ok(config::load_config(&default_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
            ControllerConfig::default()
        }))
    } else {
        tracing::info!("Using default configuration");
        Ok(ControllerConfig::default())
    }
}

fn load_seed(path: &Path) -> Result<TaskDescriptor> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let seed: SeedTask =
        serde_json::from_str(&content).with_context(|| format!("Invalid seed task {:?}", path))?;
    let config = ScanConfig::decode(seed.task_type, &seed.config)
        .with_context(|| format!("Invalid {} config in {:?}", seed.task_type, path))?;
    Ok(TaskDescriptor::root(&config)?)
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel.cancel();
    });
}
