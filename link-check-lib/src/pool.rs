//! Shared task queue and the worker pool that drains it.
//!
//! The queue is a bounded tokio channel whose single receiver is shared by all
//! workers. Closing it is the only cancellation primitive: workers notice it
//! between tasks, finish whatever is already queued and then exit. A probe
//! that has started always runs to completion (bounded by the probe timeout).

use crate::error::LinkCheckError;
use crate::probe::Prober;
use crate::types::{CheckResult, LinkStatus};
use futures::future::join_all;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One URL to probe, plus the batch-private channel its result goes to.
#[derive(Debug)]
pub struct Task {
    url: String,
    sink: mpsc::UnboundedSender<CheckResult>,
}

impl Task {
    pub fn new(url: String, sink: mpsc::UnboundedSender<CheckResult>) -> Self {
        Self { url, sink }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Deliver the result to the batch that created this task.
    fn complete(self, status: LinkStatus) {
        let result = CheckResult {
            url: self.url,
            status,
        };
        if self.sink.send(result).is_err() {
            debug!("batch gave up before its result arrived");
        }
    }
}

/// Sending side of the task queue.
///
/// Cloning is cheap; all clones observe the same [`close`](Self::close).
#[derive(Clone, Debug)]
pub struct TaskQueue {
    sender: Arc<RwLock<Option<mpsc::Sender<Task>>>>,
}

/// Receiving side of the task queue, shared by every worker.
#[derive(Clone, Debug)]
pub struct TaskReceiver {
    inner: Arc<Mutex<mpsc::Receiver<Task>>>,
}

impl TaskQueue {
    /// Create a queue holding at most `capacity` pending tasks.
    pub fn new(capacity: usize) -> (TaskQueue, TaskReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            TaskQueue {
                sender: Arc::new(RwLock::new(Some(tx))),
            },
            TaskReceiver {
                inner: Arc::new(Mutex::new(rx)),
            },
        )
    }

    /// Take a sending handle for one batch.
    ///
    /// The queue stays open for as long as any handle lives, so a batch that
    /// got a handle can enqueue all of its tasks even if [`close`](Self::close)
    /// is called meanwhile.
    ///
    /// # Errors
    ///
    /// Returns `PoolClosed` once the queue has been closed.
    pub fn sender(&self) -> Result<mpsc::Sender<Task>, LinkCheckError> {
        self.sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(LinkCheckError::PoolClosed)
    }

    /// Stop admitting new batches. Returns `false` if already closed.
    ///
    /// Workers keep draining until every outstanding handle has been dropped
    /// and the queue is empty.
    pub fn close(&self) -> bool {
        self.sender
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl TaskReceiver {
    /// Wait for the next task; `None` once the queue is closed and empty.
    pub async fn recv(&self) -> Option<Task> {
        self.inner.lock().await.recv().await
    }
}

/// Fixed set of long-lived workers.
#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one) on the current tokio runtime.
    pub fn start<P: Prober>(
        size: usize,
        receiver: TaskReceiver,
        prober: Arc<P>,
        probe_timeout: Duration,
    ) -> Self {
        let handles = (1..=size.max(1))
            .map(|worker| {
                let receiver = receiver.clone();
                let prober = Arc::clone(&prober);
                tokio::spawn(run_worker(worker, receiver, prober, probe_timeout))
            })
            .collect();

        Self { handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait until every worker has exited.
    ///
    /// Workers only exit after the queue is closed and drained.
    pub async fn join(self) {
        for result in join_all(self.handles).await {
            if let Err(e) = result {
                warn!(error = %e, "worker terminated abnormally");
            }
        }
    }
}

async fn run_worker<P: Prober>(
    worker: usize,
    receiver: TaskReceiver,
    prober: Arc<P>,
    probe_timeout: Duration,
) {
    debug!(worker, "worker started");
    let mut served = 0u64;

    while let Some(task) = receiver.recv().await {
        let status = probe_with_timeout(prober.as_ref(), task.url(), probe_timeout).await;
        debug!(worker, url = task.url(), %status, "probe finished");
        task.complete(status);
        served += 1;
    }

    debug!(worker, served, "task queue closed, worker exiting");
}

/// Run one probe, treating an overrun of `timeout` as unreachable.
pub async fn probe_with_timeout<P: Prober>(prober: &P, url: &str, timeout: Duration) -> LinkStatus {
    match tokio::time::timeout(timeout, prober.check(url)).await {
        Ok(reachable) => LinkStatus::from_reachable(reachable),
        Err(_) => {
            debug!(url, ?timeout, "probe timed out");
            LinkStatus::Unavailable
        }
    }
}
