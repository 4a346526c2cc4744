//! Keep-alive and resync handling
//!
//! The controller raises a worker's resync flag when the shared
//! configuration/PoC files change. The worker learns about it from the
//! keep-alive reply, waits for its running tasks to drain, runs its resync
//! hook and clears the flag with `MarkSynced`. The clear carries the sync
//! generation from the reply, so a change raised mid-resync is not lost.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use rh_core::api::KeepAliveArgs;
use rh_core::WorkerId;

use crate::rpc::ControllerApi;

/// Tasks hold the read side while they run, a resync takes the write side
pub type SyncGate = Arc<RwLock<()>>;

/// Brings local configuration and PoC files up to date
#[async_trait]
pub trait Resync: Send + Sync {
    async fn resync(&self) -> Result<()>;
}

/// Runs a shell command
pub struct CommandResync {
    command: String,
}

impl CommandResync {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl Resync for CommandResync {
    async fn resync(&self) -> Result<()> {
        let status = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .kill_on_drop(true)
            .status()
            .await
            .with_context(|| format!("Failed to run sync command {:?}", self.command))?;
        if !status.success() {
            anyhow::bail!("Sync command exited with {}", status);
        }
        Ok(())
    }
}

/// Nothing to sync, the flag is just acknowledged
pub struct NoopResync;

#[async_trait]
impl Resync for NoopResync {
    async fn resync(&self) -> Result<()> {
        Ok(())
    }
}

/// State shared by the keep-alive loop
pub struct KeepAlive {
    pub api: Arc<dyn ControllerApi>,
    pub worker_id: WorkerId,
    pub hostname: String,
    pub interval: Duration,
    pub running: Arc<AtomicU32>,
    pub gate: SyncGate,
    pub resync: Arc<dyn Resync>,
}

impl KeepAlive {
    /// Send one heartbeat and resync if asked to
    ///
    /// Returns whether a resync ran.
    pub async fn beat(&self) -> Result<bool> {
        let reply = self
            .api
            .keep_alive(KeepAliveArgs {
                worker_id: self.worker_id.clone(),
                hostname: self.hostname.clone(),
                running_tasks: self.running.load(Ordering::SeqCst),
            })
            .await
            .context("Keep-alive failed")?;
        if !reply.manual_sync {
            return Ok(false);
        }

        tracing::info!(worker_id = %self.worker_id, "Resync requested, waiting for running tasks");
        let _exclusive = self.gate.write().await;
        self.resync.resync().await?;
        let cleared = self
            .api
            .mark_synced(&self.worker_id, reply.sync_generation)
            .await
            .context("MarkSynced failed")?;
        if cleared {
            tracing::info!(worker_id = %self.worker_id, "Resync complete");
        } else {
            tracing::info!(
                worker_id = %self.worker_id,
                generation = reply.sync_generation,
                "Files changed during resync, flag left set"
            );
        }
        Ok(true)
    }

    /// Heartbeat every `interval` until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.beat().await {
                        tracing::warn!(worker_id = %self.worker_id, "{:#}", e);
                    }
                }
            }
        }
        tracing::debug!("Keep-alive loop stopped");
    }
}
