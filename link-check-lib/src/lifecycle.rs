//! Startup and graceful shutdown of the worker pool.
//!
//! ```text
//! Running ──shutdown()──▶ Draining ──grace period, close queue,──▶ Stopped
//!                                    join workers, final save
//! ```
//!
//! While `Draining`, batches are still admitted until the grace period ends.
//! After the queue closes, new batches fail with `PoolClosed`; tasks already
//! queued are still probed before the workers exit.

use crate::dispatch::Dispatcher;
use crate::pool::{TaskQueue, WorkerPool};
use crate::probe::Prober;
use crate::store::Store;
use crate::types::PoolConfig;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Phase of the pool's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::Draining => write!(f, "draining"),
            LifecycleState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Owns the worker pool and drives it from `Running` to `Stopped`.
pub struct Lifecycle {
    shared: Arc<Shared>,
}

struct Shared {
    state: watch::Sender<LifecycleState>,
    queue: TaskQueue,
    pool: Mutex<Option<WorkerPool>>,
    store: Arc<Store>,
    grace_period: Duration,
}

impl Lifecycle {
    /// Create the task queue, start the workers and enter `Running`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<P: Prober>(config: &PoolConfig, store: Arc<Store>, prober: Arc<P>) -> Self {
        let (queue, receiver) = TaskQueue::new(config.queue_capacity);
        let pool = WorkerPool::start(config.workers, receiver, prober, config.probe_timeout);
        info!(
            workers = pool.size(),
            queue_capacity = config.queue_capacity,
            probe_timeout = ?config.probe_timeout,
            "worker pool started"
        );

        let (state, _) = watch::channel(LifecycleState::Running);
        Self {
            shared: Arc::new(Shared {
                state,
                queue,
                pool: Mutex::new(Some(pool)),
                store,
                grace_period: config.grace_period,
            }),
        }
    }

    /// A dispatcher feeding this lifecycle's task queue.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.shared.queue.clone())
    }

    pub fn state(&self) -> LifecycleState {
        *self.shared.state.borrow()
    }

    /// Resolve once the lifecycle has reached `Stopped`.
    pub async fn wait_stopped(&self) {
        let mut rx = self.shared.state.subscribe();
        // The sender lives in `shared`, so the channel cannot close under us.
        let _ = rx.wait_for(|state| *state == LifecycleState::Stopped).await;
    }

    /// Run the shutdown sequence and wait for it to finish.
    ///
    /// Idempotent: only the first call starts the sequence; later calls just
    /// wait for it. The sequence runs on its own task, so dropping this
    /// future does not stop it. The final save failing is logged, not
    /// returned.
    pub async fn shutdown(&self) {
        let first = self.shared.state.send_if_modified(|state| {
            if *state == LifecycleState::Running {
                *state = LifecycleState::Draining;
                true
            } else {
                false
            }
        });

        if first {
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move { shared.drain().await });
        } else {
            debug!("shutdown already in progress");
        }

        self.wait_stopped().await;
    }
}

impl Shared {
    async fn drain(&self) {
        info!(
            grace_period = ?self.grace_period,
            "shutdown requested, still accepting new batches during grace period"
        );
        tokio::time::sleep(self.grace_period).await;

        info!("closing task queue, draining workers");
        self.queue.close();
        if let Some(pool) = self.pool.lock().await.take() {
            pool.join().await;
        }

        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || store.save_to_disk()).await {
            Ok(Ok(())) => info!(path = %self.store.path().display(), "final state saved"),
            Ok(Err(e)) => warn!(error = %e, "storage save error"),
            Err(e) => warn!(error = %e, "final save task failed"),
        }

        self.state.send_replace(LifecycleState::Stopped);
        info!("shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinkCheckError;
    use crate::types::LinkStatus;
    use tempfile::TempDir;

    struct UpProber;

    impl Prober for UpProber {
        async fn check(&self, _url: &str) -> bool {
            true
        }
    }

    fn config(dir: &TempDir, grace: Duration) -> PoolConfig {
        PoolConfig::default()
            .with_workers(2)
            .with_grace_period(grace)
            .with_state_path(dir.path().join("storage.json"))
    }

    #[tokio::test]
    async fn test_shutdown_transitions_and_saves() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, Duration::from_millis(10));
        let store = Arc::new(Store::open(&config.state_path));
        let lifecycle = Lifecycle::start(&config, Arc::clone(&store), Arc::new(UpProber));
        assert_eq!(lifecycle.state(), LifecycleState::Running);

        let id = store.generate_id();
        store.add_record(id, [("a.example".to_string(), LinkStatus::Available)].into());

        lifecycle.shutdown().await;
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
        assert!(config.state_path.exists());

        let reopened = Store::open(&config.state_path);
        assert_eq!(reopened.last_id(), 1);
    }

    #[tokio::test]
    async fn test_draining_observed_during_grace_period() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, Duration::from_millis(200));
        let store = Arc::new(Store::open(&config.state_path));
        let lifecycle = Arc::new(Lifecycle::start(&config, store, Arc::new(UpProber)));

        let driver = {
            let lifecycle = Arc::clone(&lifecycle);
            tokio::spawn(async move { lifecycle.shutdown().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(lifecycle.state(), LifecycleState::Draining);

        // Still admitting during the grace period.
        let entries = lifecycle
            .dispatcher()
            .dispatch(&["ok.example".to_string()])
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);

        driver.await.unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);

        let late = lifecycle.dispatcher().dispatch(&["ok.example".to_string()]).await;
        assert!(matches!(late, Err(LinkCheckError::PoolClosed)));
    }

    #[tokio::test]
    async fn test_second_shutdown_waits_for_first() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, Duration::from_millis(100));
        let store = Arc::new(Store::open(&config.state_path));
        let lifecycle = Arc::new(Lifecycle::start(&config, store, Arc::new(UpProber)));

        let first = {
            let lifecycle = Arc::clone(&lifecycle);
            tokio::spawn(async move { lifecycle.shutdown().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        lifecycle.shutdown().await;
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
        first.await.unwrap();

        // A call after completion returns immediately.
        tokio::time::timeout(Duration::from_millis(100), lifecycle.shutdown())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_save_failure_does_not_block_stop() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        let config = PoolConfig::default()
            .with_workers(1)
            .with_grace_period(Duration::ZERO)
            .with_state_path(blocker.join("storage.json"));
        let store = Arc::new(Store::open(&config.state_path));
        let lifecycle = Lifecycle::start(&config, store, Arc::new(UpProber));

        lifecycle.shutdown().await;
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_abandoned_shutdown_call_still_completes() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, Duration::from_millis(100));
        let store = Arc::new(Store::open(&config.state_path));
        let lifecycle = Lifecycle::start(&config, store, Arc::new(UpProber));

        // Give up on the call halfway through the grace period.
        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), lifecycle.shutdown()).await;
        assert!(abandoned.is_err());
        assert_eq!(lifecycle.state(), LifecycleState::Draining);

        tokio::time::timeout(Duration::from_secs(2), lifecycle.wait_stopped())
            .await
            .expect("shutdown must finish without its caller");
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
        assert!(config.state_path.exists());

        tokio::time::timeout(Duration::from_millis(100), lifecycle.shutdown())
            .await
            .unwrap();
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LifecycleState::Draining.to_string(), "draining");
        assert_eq!(
            serde_json::to_string(&LifecycleState::Stopped).unwrap(),
            "\"stopped\""
        );
    }
}
