//! Bounded sub-scan fan-out
//!
//! Each sub-scan runs on its own task so a failure or panic only loses that
//! sub-scan's contribution. The phase waits for every sub-scan before it
//! returns.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use rh_core::ScanPhase;

/// How a fan-out went
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutStats {
    pub spawned: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub panicked: usize,
}

/// Run `sub_scan` over `items` with at most `limit` in flight
pub async fn run_bounded<T, F, Fut>(
    phase: ScanPhase,
    limit: usize,
    items: Vec<T>,
    sub_scan: F,
) -> FanoutStats
where
    T: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let sem = Arc::new(Semaphore::new(limit.max(1)));
    let mut set = JoinSet::new();
    let mut stats = FanoutStats::default();

    for item in items {
        let permit = match sem.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let fut = sub_scan(item);
        set.spawn(async move {
            let _permit = permit;
            fut.await
        });
        stats.spawned += 1;
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(())) => stats.succeeded += 1,
            Ok(Err(e)) => {
                stats.failed += 1;
                tracing::warn!(%phase, "Sub-scan failed: {:#}", e);
            }
            Err(e) if e.is_panic() => {
                stats.panicked += 1;
                tracing::error!(%phase, "Sub-scan panicked: {}", panic_message(e.into_panic()));
            }
            Err(e) => {
                stats.failed += 1;
                tracing::warn!(%phase, "Sub-scan cancelled: {}", e);
            }
        }
    }

    tracing::debug!(%phase, ?stats, "Fan-out joined");
    stats
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn test_limit_respected() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let stats = run_bounded(ScanPhase::Portscan, 3, (0..12).collect(), |_: i32| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert_eq!(stats.spawned, 12);
        assert_eq!(stats.succeeded, 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_panic_and_error_isolated() {
        let merged = Arc::new(Mutex::new(Vec::new()));

        let stats = run_bounded(ScanPhase::Pocscan, 2, (0..6).collect(), |i: i32| {
            let merged = Arc::clone(&merged);
            async move {
                if i == 2 {
                    panic!("engine crashed on target {}", i);
                }
                if i == 4 {
                    anyhow::bail!("engine timed out");
                }
                merged.lock().unwrap().push(i);
                Ok(())
            }
        })
        .await;

        assert_eq!(stats.spawned, 6);
        assert_eq!(stats.succeeded, 4);
        assert_eq!(stats.panicked, 1);
        assert_eq!(stats.failed, 1);

        let mut merged = merged.lock().unwrap().clone();
        merged.sort();
        assert_eq!(merged, vec![0, 1, 3, 5]);
    }

    #[tokio::test]
    async fn test_zero_limit_still_runs() {
        let stats = run_bounded(ScanPhase::Domainscan, 0, vec![1, 2], |_: i32| async { Ok(()) }).await;
        assert_eq!(stats.succeeded, 2);
    }
}
