use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Bounded pool for concurrent background exchanges.
///
/// At most `max_concurrent` jobs run at once; additional submissions wait
/// for a slot. After [`WorkerPool::shutdown`], submissions are dropped
/// silently (logged, never queued).
pub struct WorkerPool {
    name: String,
    semaphore: Arc<Semaphore>,
    cancel_token: CancellationToken,
    shut_down: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, max_concurrent: usize) -> Self {
        Self {
            name: name.into(),
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            cancel_token: CancellationToken::new(),
            shut_down: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Submit a job. Returns `false` when the pool has been shut down and
    /// the job was dropped.
    pub fn submit<F>(&self, name: impl Into<String>, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let job_name = name.into();
        if self.shut_down.load(Ordering::Acquire) {
            debug!(
                "worker pool '{}' is shut down, dropping job '{}'",
                self.name, job_name
            );
            return false;
        }

        let semaphore = Arc::clone(&self.semaphore);
        let cancel = self.cancel_token.clone();
        let active = Arc::clone(&self.active);
        let pool_name = self.name.clone();

        tokio::spawn(async move {
            let permit = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("worker pool '{}' cancelled, dropping job '{}'", pool_name, job_name);
                    return;
                }
                permit = semaphore.acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => return,
                },
            };

            active.fetch_add(1, Ordering::SeqCst);
            // Contain panics to the job itself.
            let handle = tokio::spawn(job);
            if let Err(e) = handle.await {
                warn!("job '{}' on pool '{}' failed: {}", job_name, pool_name, e);
            }
            active.fetch_sub(1, Ordering::SeqCst);
            drop(permit);
        });

        true
    }

    /// Number of jobs currently executing.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop accepting jobs and cancel those still waiting for a slot.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        self.cancel_token.cancel();
        self.semaphore.close();
    }

    /// Wait until running jobs drain, up to `timeout`.
    pub async fn wait_idle(&self, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.active.load(Ordering::SeqCst) > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!("worker pool '{}' did not drain within {:?}", self.name, timeout);
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn respects_concurrency_limit() {
        let pool = WorkerPool::new("test", 2);
        let peak = Arc::new(AtomicUsize::new(0));
        let current = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let peak = Arc::clone(&peak);
            let current = Arc::clone(&current);
            pool.submit("job", async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                current.fetch_sub(1, Ordering::SeqCst);
            });
        }

        pool.wait_idle(Duration::from_secs(2)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn drops_jobs_after_shutdown() {
        let pool = WorkerPool::new("test", 2);
        pool.shutdown();

        let ran = Arc::new(AtomicBool::new(false));
        let ran_ = Arc::clone(&ran);
        let accepted = pool.submit("late", async move {
            ran_.store(true, Ordering::SeqCst);
        });

        assert!(!accepted);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!ran.load(Ordering::SeqCst));
    }
}
