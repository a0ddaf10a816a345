//! Per-batch fan-out / fan-in over the shared task queue.
//!
//! Each batch gets its own unbounded result channel, so concurrent batches
//! can share the task queue without ever seeing each other's results.
//! Results carry their URL and are matched by content, not arrival order.
//!
//! Admission is all-or-nothing: the batch takes one queue handle up front.
//! If the queue is already closed nothing is enqueued and the batch fails
//! with `PoolClosed`; otherwise the handle keeps the queue open until every
//! task of the batch is in. If the workers vanish mid-batch the whole batch
//! is abandoned with `PoolClosed` and late results are discarded.

use crate::error::LinkCheckError;
use crate::pool::{Task, TaskQueue};
use crate::types::BatchEntries;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Sends batches through a [`TaskQueue`] and collects their results.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    queue: TaskQueue,
}

impl Dispatcher {
    pub fn new(queue: TaskQueue) -> Self {
        Self { queue }
    }

    /// Probe every URL in `urls` and return the status of each distinct URL.
    ///
    /// Exactly `urls.len()` tasks are enqueued and exactly that many results
    /// are awaited; duplicate URLs collapse into one entry.
    ///
    /// # Errors
    ///
    /// Returns `PoolClosed` if the queue was closed before the batch was
    /// admitted, or if the workers stopped before every result arrived.
    pub async fn dispatch(&self, urls: &[String]) -> Result<BatchEntries, LinkCheckError> {
        let sender = self.queue.sender()?;
        let (sink, mut results) = mpsc::unbounded_channel();

        for url in urls {
            if sender.send(Task::new(url.clone(), sink.clone())).await.is_err() {
                warn!(batch_size = urls.len(), "task queue went away mid-batch, abandoning batch");
                return Err(LinkCheckError::PoolClosed);
            }
        }
        // Our copies must go, or `recv` below could wait on ourselves.
        drop(sender);
        drop(sink);
        debug!(batch_size = urls.len(), "batch enqueued");

        let mut entries = BatchEntries::new();
        let mut received = 0;
        while received < urls.len() {
            match results.recv().await {
                Some(result) => {
                    entries.insert(result.url, result.status);
                    received += 1;
                }
                None => break,
            }
        }

        if received < urls.len() {
            warn!(
                expected = urls.len(),
                received, "workers stopped before the batch completed, abandoning batch"
            );
            return Err(LinkCheckError::PoolClosed);
        }

        Ok(entries)
    }
}
