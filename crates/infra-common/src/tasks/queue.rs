use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{Error, Result};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Single-threaded ordered work queue.
///
/// Jobs are executed strictly in submission order by one worker task.
pub struct SerialQueue {
    name: String,
    sender: mpsc::UnboundedSender<Job>,
    cancel_token: CancellationToken,
    shut_down: Arc<AtomicBool>,
}

impl SerialQueue {
    /// Create a queue and spawn its worker task.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let cancel_token = CancellationToken::new();

        let worker_name = name.clone();
        let worker_cancel = cancel_token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = worker_cancel.cancelled() => {
                        debug!("serial queue '{}' worker stopping", worker_name);
                        break;
                    }
                    job = receiver.recv() => {
                        match job {
                            Some(job) => {
                                // Run each job on its own task so a panic is
                                // contained to that job.
                                let handle = tokio::spawn(job);
                                if let Err(e) = handle.await {
                                    warn!("job on queue '{}' failed: {}", worker_name, e);
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
        });

        Self {
            name,
            sender,
            cancel_token,
            shut_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Submit a job for ordered execution.
    pub fn dispatch<F>(&self, job: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(Error::Shutdown);
        }
        self.sender
            .send(Box::pin(job))
            .map_err(|_| Error::Shutdown)
    }

    /// Queue name, for logging.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the worker. Jobs already submitted but not yet started are
    /// discarded.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        self.cancel_token.cancel();
    }
}
