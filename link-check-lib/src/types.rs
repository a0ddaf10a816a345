//! Core data types for link checking.
//!
//! This module defines the values that flow through the worker pool and the
//! store, plus the tunables of the pool itself.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Identifier of a stored batch. Issued by [`Store::generate_id`](crate::Store::generate_id),
/// starting at 1.
pub type BatchId = u64;

/// Reachability of a single link.
///
/// Serialized as `"available"` / `"not available"`, which is also the format
/// of the snapshot file and the HTTP responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkStatus {
    /// The link answered with a status code below 400
    #[serde(rename = "available")]
    Available,

    /// The probe failed, timed out, or got a status code of 400 or above
    #[serde(rename = "not available")]
    Unavailable,
}

impl LinkStatus {
    /// Map a probe outcome onto a status.
    pub fn from_reachable(reachable: bool) -> Self {
        if reachable {
            Self::Available
        } else {
            Self::Unavailable
        }
    }

    pub fn is_available(self) -> bool {
        self == Self::Available
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkStatus::Available => write!(f, "available"),
            LinkStatus::Unavailable => write!(f, "not available"),
        }
    }
}

/// Outcome of one probe, produced by exactly one worker for one task.
///
/// The URL travels with the status so that a batch can match results by
/// content rather than by arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub url: String,
    pub status: LinkStatus,
}

/// URL → status mapping for one batch.
pub type BatchEntries = BTreeMap<String, LinkStatus>;

/// A completed batch as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub id: BatchId,
    pub entries: BatchEntries,
}

/// What a caller gets back after a batch was checked and recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Batch identifier, serialized under the historical `links_num` key
    #[serde(rename = "links_num")]
    pub batch_id: BatchId,

    /// Status of every distinct link in the batch
    pub links: BatchEntries,
}

/// Configuration of the worker pool and its store.
///
/// This struct allows tuning how many probes run at once, how long a probe may
/// take and how long shutdown keeps accepting work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of long-lived workers
    /// Default: 10, Range: 1-100
    pub workers: usize,

    /// Capacity of the shared task queue
    /// Default: 100
    pub queue_capacity: usize,

    /// Upper bound for a single probe
    /// Default: 2 seconds
    #[serde(skip)]
    pub probe_timeout: Duration,

    /// How long shutdown keeps accepting batches before closing the queue
    /// Default: 3 seconds
    #[serde(skip)]
    pub grace_period: Duration,

    /// Location of the JSON snapshot
    /// Default: `storage.json`
    pub state_path: PathBuf,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            queue_capacity: 100,
            probe_timeout: Duration::from_secs(2),
            grace_period: Duration::from_secs(3),
            state_path: PathBuf::from("storage.json"),
        }
    }
}

impl PoolConfig {
    /// Set the number of workers.
    ///
    /// Clamped to 1-100 so a pool always has someone to serve the queue.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.clamp(1, 100);
        self
    }

    /// Set the task queue capacity (at least 1).
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_state_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.state_path = path.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&LinkStatus::Available).unwrap(),
            "\"available\""
        );
        assert_eq!(
            serde_json::to_string(&LinkStatus::Unavailable).unwrap(),
            "\"not available\""
        );
        let parsed: LinkStatus = serde_json::from_str("\"not available\"").unwrap();
        assert_eq!(parsed, LinkStatus::Unavailable);
    }

    #[test]
    fn test_status_from_reachable() {
        assert_eq!(LinkStatus::from_reachable(true), LinkStatus::Available);
        assert_eq!(LinkStatus::from_reachable(false), LinkStatus::Unavailable);
        assert!(LinkStatus::Available.is_available());
    }

    #[test]
    fn test_outcome_uses_links_num_key() {
        let mut links = BatchEntries::new();
        links.insert("ok.example".to_string(), LinkStatus::Available);
        let outcome = BatchOutcome { batch_id: 7, links };

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["links_num"], 7);
        assert_eq!(json["links"]["ok.example"], "available");
    }

    #[test]
    fn test_config_builders_clamp() {
        let config = PoolConfig::default()
            .with_workers(0)
            .with_queue_capacity(0);
        assert_eq!(config.workers, 1);
        assert_eq!(config.queue_capacity, 1);

        let config = PoolConfig::default().with_workers(500);
        assert_eq!(config.workers, 100);
    }

    #[test]
    fn test_config_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.workers, 10);
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.probe_timeout, Duration::from_secs(2));
        assert_eq!(config.grace_period, Duration::from_secs(3));
        assert_eq!(config.state_path, PathBuf::from("storage.json"));
    }
}
