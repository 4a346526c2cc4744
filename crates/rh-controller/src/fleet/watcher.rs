//! File-change watcher that raises the fleet resync flag

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::WorkerRegistry;

/// Flag every worker for resync on each change notification
///
/// Runs until the change stream closes or `cancel` fires.
pub async fn run_sync_watcher(
    registry: Arc<WorkerRegistry>,
    mut changes: mpsc::Receiver<PathBuf>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Sync watcher shutting down");
                break;
            }
            change = changes.recv() => {
                let Some(path) = change else {
                    tracing::debug!("Change stream closed");
                    break;
                };
                let flagged = registry.mark_all_for_sync().await;
                tracing::info!(path = %path.display(), workers = flagged, "Sync file changed, workers flagged for resync");
            }
        }
    }
}

/// Watch a directory and forward changed paths into `tx`
///
/// Keep the returned watcher alive for as long as notifications are wanted.
/// Notifications are dropped while the channel is full; the flag is
/// level-triggered so nothing is lost.
pub fn watch_sync_dir(
    path: &Path,
    tx: mpsc::Sender<PathBuf>,
) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
        match event {
            Ok(event) if is_sync_change(&event) => {
                for path in event.paths {
                    let _ = tx.try_send(path);
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("File watcher error: {}", e),
        }
    })?;
    watcher.watch(path, RecursiveMode::Recursive)?;
    tracing::info!("Watching {:?} for sync changes", path);
    Ok(watcher)
}

fn is_sync_change(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rh_core::api::KeepAliveArgs;
    use rh_core::WorkerId;

    #[tokio::test]
    async fn test_change_flags_all_workers() {
        let registry = Arc::new(WorkerRegistry::new());
        for id in ["w1", "w2"] {
            registry
                .heartbeat(&KeepAliveArgs {
                    worker_id: WorkerId::new(id),
                    hostname: id.to_string(),
                    running_tasks: 0,
                })
                .await;
        }

        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_sync_watcher(Arc::clone(&registry), rx, cancel.clone()));

        tx.send(PathBuf::from("/sync/poc/new.yaml")).await.unwrap();
        drop(tx);
        task.await.unwrap();

        let statuses = registry.list().await;
        assert!(statuses.iter().all(|s| s.manual_sync));
    }

    #[tokio::test]
    async fn test_watcher_stops_on_cancel() {
        let registry = Arc::new(WorkerRegistry::new());
        let (_tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_sync_watcher(registry, rx, cancel.clone()));
        cancel.cancel();
        task.await.unwrap();
    }
}
