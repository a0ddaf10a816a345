//! # Link Check Library
//!
//! Concurrent reachability checking for batches of URLs, with numbered batch
//! records persisted to a JSON snapshot.
//!
//! A fixed pool of workers drains one shared task queue. Every batch is
//! fanned out onto that queue and fanned back in through its own result
//! channel, then stored under a monotonically increasing batch ID.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use link_check_lib::{LinkChecker, PoolConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let checker = LinkChecker::start_http(PoolConfig::default())?;
//!     let outcome = checker.check_batch(&["example.com".to_string()]).await?;
//!
//!     println!("batch {}: {:?}", outcome.batch_id, outcome.links);
//!     checker.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Bounded concurrency**: a fixed number of workers, whatever the load
//! - **Batch isolation**: concurrent batches never see each other's results
//! - **Graceful shutdown**: grace period, drain, then a final snapshot save
//! - **Crash-safe snapshots**: written to a temp file and renamed into place

// Re-export main public API types and functions
// This makes them available as link_check_lib::TypeName
pub use checker::LinkChecker;
pub use config::{
    load_env_config, load_env_config_from, parse_duration_string, ConfigManager, EnvConfig,
    FileConfig,
};
pub use dispatch::Dispatcher;
pub use error::LinkCheckError;
pub use lifecycle::{Lifecycle, LifecycleState};
pub use pool::{probe_with_timeout, Task, TaskQueue, TaskReceiver, WorkerPool};
#[cfg(feature = "http-probe")]
pub use probe::HttpProber;
pub use probe::Prober;
pub use store::{Store, StoreState};
pub use types::{
    BatchEntries, BatchId, BatchOutcome, BatchRecord, CheckResult, LinkStatus, PoolConfig,
};
pub use utils::normalize_url;

// Public modules
pub mod config;

// Internal modules - these are not part of the public API
mod checker;
mod dispatch;
mod error;
mod lifecycle;
mod pool;
mod probe;
mod store;
mod types;
mod utils;

// Type alias for convenience
pub type Result<T> = std::result::Result<T, LinkCheckError>;

// Library version and metadata
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");

/// Get library information for debugging or display purposes.
pub fn info() -> LibraryInfo {
    LibraryInfo {
        version: VERSION,
        author: AUTHOR,
        features: get_enabled_features(),
    }
}

/// Information about the library build and features
#[derive(Debug, Clone)]
pub struct LibraryInfo {
    pub version: &'static str,
    pub author: &'static str,
    pub features: Vec<&'static str>,
}

/// Get list of enabled features at compile time
#[allow(clippy::vec_init_then_push)]
fn get_enabled_features() -> Vec<&'static str> {
    let mut features = Vec::new();

    #[cfg(feature = "http-probe")]
    features.push("http-probe");

    features
}
