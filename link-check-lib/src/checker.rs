//! Main link checker implementation.
//!
//! This module provides the `LinkChecker` struct that ties the worker pool,
//! the store and the lifecycle together and implements the full handling of
//! one batch: dispatch, number, record, persist.

use crate::dispatch::Dispatcher;
use crate::error::LinkCheckError;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::probe::Prober;
use crate::store::Store;
use crate::types::{BatchEntries, BatchId, BatchOutcome, PoolConfig};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Entry point for checking batches of links.
///
/// `LinkChecker` is cheap to clone; clones share the same pool and store.
///
/// # Example
///
/// ```rust,no_run
/// use link_check_lib::{LinkChecker, PoolConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let checker = LinkChecker::start_http(PoolConfig::default())?;
///     let outcome = checker
///         .check_batch(&["example.com".to_string(), "example.org".to_string()])
///         .await?;
///     println!("batch {}: {:?}", outcome.batch_id, outcome.links);
///
///     checker.shutdown().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct LinkChecker {
    config: PoolConfig,
    store: Arc<Store>,
    dispatcher: Dispatcher,
    lifecycle: Arc<Lifecycle>,
}

impl LinkChecker {
    /// Open the store at `config.state_path` and start the worker pool.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<P: Prober>(config: PoolConfig, prober: P) -> Self {
        let store = Arc::new(Store::open(&config.state_path));
        Self::with_store(config, store, prober)
    }

    /// Start the worker pool on top of an already opened store.
    pub fn with_store<P: Prober>(config: PoolConfig, store: Arc<Store>, prober: P) -> Self {
        let lifecycle = Arc::new(Lifecycle::start(&config, Arc::clone(&store), Arc::new(prober)));
        let dispatcher = lifecycle.dispatcher();

        Self {
            config,
            store,
            dispatcher,
            lifecycle,
        }
    }

    /// Start with the HTTP prober, using `config.probe_timeout` for requests.
    #[cfg(feature = "http-probe")]
    pub fn start_http(config: PoolConfig) -> Result<Self, LinkCheckError> {
        let prober = crate::probe::HttpProber::with_timeout(config.probe_timeout)?;
        Ok(Self::start(config, prober))
    }

    /// Check a batch of links and record the outcome under a new batch ID.
    ///
    /// Links are recorded exactly as given; one that cannot be probed comes
    /// back `not available`. The ID is only drawn once every result is in, so
    /// a failed batch never consumes one. A failed snapshot write is logged
    /// and does not fail the batch; the record stays in memory and goes out
    /// with the next save.
    ///
    /// # Errors
    ///
    /// Returns `PoolClosed` if shutdown has already closed the task queue.
    pub async fn check_batch(&self, links: &[String]) -> Result<BatchOutcome, LinkCheckError> {
        let entries = self.dispatcher.dispatch(links).await?;

        let batch_id = self.store.generate_id();
        self.store.add_record(batch_id, entries.clone());
        self.persist().await;

        info!(batch_id, links = entries.len(), "batch recorded");
        Ok(BatchOutcome {
            batch_id,
            links: entries,
        })
    }

    /// Look up stored batches. Unknown IDs are omitted.
    pub fn get_batches(&self, ids: &[BatchId]) -> BTreeMap<BatchId, BatchEntries> {
        self.store.get_records(ids)
    }

    async fn persist(&self) {
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || store.save_to_disk()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "failed to write storage to JSON file"),
            Err(e) => warn!(error = %e, "storage save task failed"),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Drain the pool and persist the store. See [`Lifecycle::shutdown`].
    pub async fn shutdown(&self) {
        self.lifecycle.shutdown().await;
    }

    /// Resolve once shutdown has completed.
    pub async fn wait_stopped(&self) {
        self.lifecycle.wait_stopped().await;
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LinkStatus;
    use std::time::Duration;
    use tempfile::TempDir;

    struct OkProber;

    impl Prober for OkProber {
        async fn check(&self, url: &str) -> bool {
            url.starts_with("ok")
        }
    }

    fn checker(dir: &TempDir) -> LinkChecker {
        let config = PoolConfig::default()
            .with_workers(2)
            .with_grace_period(Duration::from_millis(10))
            .with_state_path(dir.path().join("storage.json"));
        LinkChecker::start(config, OkProber)
    }

    #[tokio::test]
    async fn test_check_batch_records_and_persists() {
        let dir = TempDir::new().unwrap();
        let checker = checker(&dir);

        let outcome = checker
            .check_batch(&["ok.example".to_string(), "down.example".to_string()])
            .await
            .unwrap();
        assert_eq!(outcome.batch_id, 1);
        assert_eq!(outcome.links["ok.example"], LinkStatus::Available);
        assert_eq!(outcome.links["down.example"], LinkStatus::Unavailable);

        let on_disk = Store::open(dir.path().join("storage.json"));
        assert_eq!(on_disk.get_record(1).unwrap().entries, outcome.links);

        checker.shutdown().await;
    }

    #[tokio::test]
    async fn test_links_are_recorded_as_submitted() {
        let dir = TempDir::new().unwrap();
        let checker = checker(&dir);

        let links = vec![
            " ok.example".to_string(),
            "down.example ".to_string(),
            "bad link".to_string(),
            String::new(),
        ];
        let outcome = checker.check_batch(&links).await.unwrap();

        let keys: Vec<&str> = outcome.links.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["", " ok.example", "bad link", "down.example "]);
        assert!(outcome
            .links
            .values()
            .all(|status| *status == LinkStatus::Unavailable));
        assert_eq!(outcome.batch_id, 1);

        checker.shutdown().await;
    }

    #[tokio::test]
    async fn test_large_batch_is_accepted() {
        let dir = TempDir::new().unwrap();
        let checker = checker(&dir);

        let links: Vec<String> = (0..1500).map(|i| format!("ok-{}", i)).collect();
        let outcome = checker.check_batch(&links).await.unwrap();
        assert_eq!(outcome.links.len(), 1500);
        assert!(outcome.links.values().all(|s| s.is_available()));

        checker.shutdown().await;
    }

    #[tokio::test]
    async fn test_rejected_after_shutdown_consumes_no_id() {
        let dir = TempDir::new().unwrap();
        let checker = checker(&dir);
        checker.shutdown().await;

        let err = checker
            .check_batch(&["ok.example".to_string()])
            .await
            .unwrap_err();
        assert!(err.is_shutdown());
        assert_eq!(checker.store().last_id(), 0);
    }

    #[tokio::test]
    async fn test_get_batches() {
        let dir = TempDir::new().unwrap();
        let checker = checker(&dir);
        checker.check_batch(&["ok.a".to_string()]).await.unwrap();
        checker.check_batch(&["down.b".to_string()]).await.unwrap();

        let found = checker.get_batches(&[2, 9]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[&2]["down.b"], LinkStatus::Unavailable);

        checker.shutdown().await;
    }
}
