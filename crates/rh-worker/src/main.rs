//! ReconHive Worker Daemon
//!
//! Pulls scan tasks from the controller, runs them and reports back. Also
//! sends heartbeats and resyncs its local files when the controller asks.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU32;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rh_core::config::{self, WorkerConfig};
use rh_core::WorkerId;
use rh_worker::logging::{forward_runtime_logs, RuntimeLogLayer};
use rh_worker::sync::{CommandResync, KeepAlive, NoopResync, Resync};
use rh_worker::task::{run_intake, IntakeContext};
use rh_worker::{
    ControllerApi, Dispatcher, EngineSet, FileSettings, RpcClient, ScanOrchestrator, TaskRunner,
};

#[derive(Parser)]
#[command(name = "rh-worker")]
#[command(about = "ReconHive worker - runs scan tasks handed out by the controller")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Controller address (overrides config)
    #[arg(long)]
    controller: Option<String>,

    /// Shared auth key (overrides config)
    #[arg(long, env = "RECONHIVE_AUTH_KEY", hide_env_values = true)]
    auth_key: Option<String>,

    /// Worker name (defaults to hostname)
    #[arg(long)]
    name: Option<String>,

    /// Scan settings file (overrides config)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_worker_config(args.config.as_deref())?;
    if let Some(controller) = args.controller {
        config.controller_address = controller;
    }
    if let Some(auth_key) = args.auth_key {
        config.auth_key = auth_key;
    }
    if let Some(name) = args.name {
        config.worker_name = Some(name);
    }
    if let Some(settings) = args.settings {
        config.settings_path = settings;
    }

    let hostname = config.hostname();
    let worker_id = WorkerId::from_host(&config.worker_name(), std::process::id());

    let log_level = if args.foreground { "debug" } else { &args.log_level };
    let (runtime_layer, runtime_logs) = RuntimeLogLayer::new(worker_id.to_string());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(runtime_layer)
        .init();

    tracing::info!("ReconHive worker {} starting...", worker_id);
    if config.auth_key.is_empty() {
        anyhow::bail!("No auth_key configured; set it in the config file or RECONHIVE_AUTH_KEY");
    }

    let client = RpcClient::from_config(&config).context("Failed to set up RPC client")?;
    tracing::info!("Controller at {}", client.address());
    let api: Arc<dyn ControllerApi> = Arc::new(client);

    let engines = Arc::new(EngineSet::builtin(&config).context("Failed to set up engines")?);
    let settings = Arc::new(FileSettings::new(config.settings_path.clone()));
    let orchestrator = ScanOrchestrator::new(Arc::clone(&api), engines, settings);
    let runner = TaskRunner::new(
        Arc::clone(&api),
        orchestrator,
        Dispatcher::new(Arc::clone(&api)),
    );

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let running = Arc::new(AtomicU32::new(0));
    let gate = Arc::new(RwLock::new(()));

    let resync: Arc<dyn Resync> = match &config.sync_command {
        Some(command) => Arc::new(CommandResync::new(command.clone())),
        None => Arc::new(NoopResync),
    };
    let keepalive = KeepAlive {
        api: Arc::clone(&api),
        worker_id: worker_id.clone(),
        hostname,
        interval: config.keepalive_interval,
        running: Arc::clone(&running),
        gate: Arc::clone(&gate),
        resync,
    };
    let keepalive_task = tokio::spawn(keepalive.run(cancel.clone()));
    let log_task = tokio::spawn(forward_runtime_logs(
        Arc::clone(&api),
        runtime_logs,
        cancel.clone(),
    ));

    run_intake(
        IntakeContext {
            api,
            runner,
            worker_id,
            poll_interval: config.poll_interval,
            backoff: config.backoff.clone(),
            max_parallel_tasks: config.max_parallel_tasks,
            running,
            gate,
        },
        cancel.clone(),
    )
    .await;

    cancel.cancel();
    let _ = keepalive_task.await;
    let _ = log_task.await;

    tracing::info!("Worker shutdown complete");
    Ok(())
}

fn load_worker_config(path: Option<&Path>) -> Result<WorkerConfig> {
    if let Some(path) = path {
        return config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path));
    }

    let default_path = config::default_config_path("worker.toml");
    if default_path.exists() {
        Ok(config::load_config(&default_path).unwrap_or_else(|e| {
            eprintln!("Failed to load config from {:?}: {}", default_path, e);
            WorkerConfig::default()
        }))
    } else {
        Ok(WorkerConfig::default())
    }
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
                tracing::info!("Received Ctrl+C, finishing running tasks...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, finishing running tasks...");
            }
        }

        cancel.cancel();
    });
}
