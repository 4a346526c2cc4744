//! Worker status registry
//!
//! Tracks every worker that has sent a heartbeat and whether it must resync
//! shared files before its next task. All mutations go through one lock.
//!
//! Each file change bumps a per-worker generation. `MarkSynced` only clears
//! the flag for the generation the worker last saw.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::Mutex;

use rh_core::api::{KeepAliveArgs, KeepAliveReply};
use rh_core::time::current_time_millis;
use rh_core::WorkerId;

/// Status of one worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStatus {
    pub worker_id: WorkerId,
    pub hostname: String,
    /// Worker must resync before its next task
    pub manual_sync: bool,
    pub sync_generation: u64,
    pub running_tasks: u32,
    pub first_seen: u64,
    pub last_seen: u64,
}

/// Fleet-wide worker registry
///
/// Entries are created on first heartbeat and never removed.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: Mutex<HashMap<WorkerId, WorkerStatus>>,
}

impl WorkerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a heartbeat, returning the worker's resync state
    pub async fn heartbeat(&self, args: &KeepAliveArgs) -> KeepAliveReply {
        let now = current_time_millis();
        let mut workers = self.workers.lock().await;
        let status = workers
            .entry(args.worker_id.clone())
            .or_insert_with(|| {
                tracing::info!(worker = %args.worker_id, hostname = %args.hostname, "New worker registered");
                WorkerStatus {
                    worker_id: args.worker_id.clone(),
                    hostname: args.hostname.clone(),
                    manual_sync: false,
                    sync_generation: 0,
                    running_tasks: 0,
                    first_seen: now,
                    last_seen: now,
                }
            });
        status.hostname = args.hostname.clone();
        status.running_tasks = args.running_tasks;
        status.last_seen = now;
        KeepAliveReply {
            manual_sync: status.manual_sync,
            sync_generation: status.sync_generation,
        }
    }

    /// Flag every known worker for resync, returning how many were flagged
    pub async fn mark_all_for_sync(&self) -> usize {
        let mut workers = self.workers.lock().await;
        for status in workers.values_mut() {
            status.manual_sync = true;
            status.sync_generation += 1;
        }
        workers.len()
    }

    /// Clear one worker's resync flag if `generation` is still current
    ///
    /// Returns false for an unknown worker or when a newer change arrived
    /// after the worker read its flag; the flag then stays set.
    pub async fn mark_synced(&self, worker_id: &WorkerId, generation: u64) -> bool {
        let mut workers = self.workers.lock().await;
        match workers.get_mut(worker_id) {
            Some(status) if status.sync_generation == generation => {
                status.manual_sync = false;
                true
            }
            _ => false,
        }
    }

    /// Status of one worker
    pub async fn get(&self, worker_id: &WorkerId) -> Option<WorkerStatus> {
        self.workers.lock().await.get(worker_id).cloned()
    }

    /// All workers, ordered by id
    pub async fn list(&self) -> Vec<WorkerStatus> {
        let mut list: Vec<_> = self.workers.lock().await.values().cloned().collect();
        list.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        list
    }

    /// Number of known workers
    pub async fn len(&self) -> usize {
        self.workers.lock().await.len()
    }

    /// Whether no worker has registered yet
    pub async fn is_empty(&self) -> bool {
        self.workers.lock().await.is_empty()
    }
}
