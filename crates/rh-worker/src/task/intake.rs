//! Task intake loop

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use rh_core::config::BackoffConfig;
use rh_core::WorkerId;

use super::TaskRunner;
use crate::reconnect::ExponentialBackoff;
use crate::rpc::ControllerApi;
use crate::sync::SyncGate;

/// Everything the intake loop needs
#[derive(Clone)]
pub struct IntakeContext {
    pub api: Arc<dyn ControllerApi>,
    pub runner: TaskRunner,
    pub worker_id: WorkerId,
    pub poll_interval: Duration,
    pub backoff: BackoffConfig,
    pub max_parallel_tasks: usize,
    /// Tasks currently running, read by the keep-alive loop
    pub running: Arc<AtomicU32>,
    pub gate: SyncGate,
}

/// Fetch and run tasks until cancelled
///
/// Waits for running tasks to finish before returning.
pub async fn run_intake(ctx: IntakeContext, cancel: CancellationToken) {
    let slots = ctx.max_parallel_tasks.max(1);
    let sem = Arc::new(Semaphore::new(slots));
    let mut backoff = ExponentialBackoff::from_config(&ctx.backoff);

    tracing::info!(worker_id = %ctx.worker_id, "Task intake started ({} slots)", slots);

    loop {
        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = Arc::clone(&sem).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        // A resync in progress holds the write side
        let guard = tokio::select! {
            _ = cancel.cancelled() => break,
            guard = Arc::clone(&ctx.gate).read_owned() => guard,
        };

        let fetched = tokio::select! {
            _ = cancel.cancelled() => break,
            fetched = ctx.api.fetch_task(&ctx.worker_id) => fetched,
        };

        let wait = match fetched {
            Ok(Some(task)) => {
                backoff.reset();
                let runner = ctx.runner.clone();
                let worker_id = ctx.worker_id.clone();
                let running = Arc::clone(&ctx.running);
                tokio::spawn(async move {
                    let _permit = permit;
                    let _guard = guard;
                    running.fetch_add(1, Ordering::SeqCst);
                    match runner.execute_and_finish(&task, &worker_id).await {
                        Ok(report) if report.is_success() => {
                            tracing::info!(task_id = %task.task_id, "Task done: {}", report.result)
                        }
                        Ok(report) => {
                            tracing::warn!(task_id = %task.task_id, "Task failed: {}", report.result)
                        }
                        Err(e) => {
                            tracing::error!(task_id = %task.task_id, "Failed to report task: {}", e)
                        }
                    }
                    running.fetch_sub(1, Ordering::SeqCst);
                });
                None
            }
            Ok(None) => {
                drop(guard);
                drop(permit);
                backoff.reset();
                Some(ctx.poll_interval)
            }
            Err(e) => {
                drop(guard);
                drop(permit);
                let delay = backoff.next_delay();
                tracing::warn!("Fetching tasks failed: {}, retrying in {:?}", e, delay);
                Some(delay)
            }
        };

        if let Some(wait) = wait {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    // Every slot back means every task finished
    let _ = sem.acquire_many(slots as u32).await;
    tracing::info!(worker_id = %ctx.worker_id, "Task intake stopped");
}
