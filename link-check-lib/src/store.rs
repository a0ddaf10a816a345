//! Persistent batch store.
//!
//! The store keeps every completed batch in memory behind a single mutex and
//! mirrors the whole state to a JSON snapshot on demand:
//!
//! ```json
//! {
//!   "last_link_num": 2,
//!   "data": {
//!     "1": { "example.com": "available" },
//!     "2": { "down.example": "not available" }
//!   }
//! }
//! ```
//!
//! Batch IDs come from one monotonic counter (`last_link_num`) and are never
//! reused. Disk I/O only happens in [`Store::load_from_disk`] and
//! [`Store::save_to_disk`]; all other operations are in-memory.

use crate::error::LinkCheckError;
use crate::types::{BatchEntries, BatchId, BatchRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Full in-memory state of a [`Store`].
///
/// Invariant: `last_id >= max(records.keys())`, or `0` when there are no
/// records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreState {
    pub last_id: BatchId,
    pub records: BTreeMap<BatchId, BatchEntries>,
}

/// On-disk layout, borrowed for writing.
#[derive(Serialize)]
struct SnapshotOut<'a> {
    last_link_num: BatchId,
    data: &'a BTreeMap<BatchId, BatchEntries>,
}

/// On-disk layout, owned for reading. A missing or `null` `data` is an empty
/// store, matching files written by older versions.
#[derive(Deserialize)]
struct SnapshotIn {
    #[serde(default)]
    last_link_num: BatchId,
    #[serde(default)]
    data: Option<BTreeMap<BatchId, BatchEntries>>,
}

/// Thread-safe batch store with a JSON snapshot.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    state: Mutex<StoreState>,
    /// Serializes snapshot writers so files land in snapshot order.
    save_lock: Mutex<()>,
}

impl Store {
    /// Open the store backed by `path` and load its snapshot.
    ///
    /// Never fails: a missing file yields an empty store, and an unreadable or
    /// corrupt one is logged and replaced by an empty store (the bad file is
    /// left on disk until the next save overwrites it).
    pub fn open<P: Into<PathBuf>>(path: P) -> Self {
        let store = Self {
            path: path.into(),
            state: Mutex::new(StoreState::default()),
            save_lock: Mutex::new(()),
        };

        match store.load_from_disk() {
            Ok(()) => {
                let state = store.state();
                info!(
                    path = %store.path.display(),
                    batches = state.records.len(),
                    last_id = state.last_id,
                    "state loaded"
                );
            }
            Err(e) => {
                warn!(error = %e, "storage file error, starting with empty storage");
            }
        }

        store
    }

    /// Location of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Increment the batch counter and return the new value.
    pub fn generate_id(&self) -> BatchId {
        let mut state = self.state();
        state.last_id += 1;
        state.last_id
    }

    /// Insert or replace the entries of batch `id`.
    ///
    /// IDs not obtained from [`generate_id`](Self::generate_id) still keep the
    /// counter invariant: the counter is raised to `id` if needed.
    pub fn add_record(&self, id: BatchId, entries: BatchEntries) {
        let mut state = self.state();
        if id > state.last_id {
            state.last_id = id;
        }
        state.records.insert(id, entries);
    }

    /// Return the batches among `ids` that exist. Unknown IDs are skipped.
    pub fn get_records(&self, ids: &[BatchId]) -> BTreeMap<BatchId, BatchEntries> {
        let state = self.state();
        ids.iter()
            .filter_map(|id| state.records.get(id).map(|entries| (*id, entries.clone())))
            .collect()
    }

    /// Look up a single batch.
    pub fn get_record(&self, id: BatchId) -> Option<BatchRecord> {
        self.state().records.get(&id).map(|entries| BatchRecord {
            id,
            entries: entries.clone(),
        })
    }

    pub fn last_id(&self) -> BatchId {
        self.state().last_id
    }

    pub fn len(&self) -> usize {
        self.state().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().records.is_empty()
    }

    /// Consistent copy of the whole state.
    pub fn snapshot(&self) -> StoreState {
        self.state().clone()
    }

    /// Replace the in-memory state with the snapshot file.
    ///
    /// # Errors
    ///
    /// - `CorruptState` if the file exists but is not a valid snapshot; the
    ///   in-memory state is left untouched.
    /// - `PersistenceFailure` if the file exists but cannot be read.
    ///
    /// A missing file resets the store to empty and is not an error.
    pub fn load_from_disk(&self) -> Result<(), LinkCheckError> {
        let _saving = self.save_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no state file, starting empty");
                *self.state() = StoreState::default();
                return Ok(());
            }
            Err(e) => {
                return Err(LinkCheckError::persistence(
                    self.path.to_string_lossy(),
                    format!("read failed: {}", e),
                ));
            }
        };

        let parsed: SnapshotIn = serde_json::from_slice(&bytes).map_err(|e| {
            LinkCheckError::corrupt_state(self.path.to_string_lossy(), e.to_string())
        })?;

        let records = parsed.data.unwrap_or_default();
        let max_id = records.keys().next_back().copied().unwrap_or(0);
        let mut last_id = parsed.last_link_num;
        if last_id < max_id {
            warn!(
                last_link_num = last_id,
                max_id, "state file counter behind its records, advancing counter"
            );
            last_id = max_id;
        }

        *self.state() = StoreState { last_id, records };
        Ok(())
    }

    /// Write the whole state to the snapshot file.
    ///
    /// The state is copied under the lock and written outside it, through a
    /// temporary file that is renamed over the snapshot, so a crash mid-write
    /// never truncates the previous snapshot.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceFailure` if the directory, the temporary file or
    /// the rename cannot be written.
    pub fn save_to_disk(&self) -> Result<(), LinkCheckError> {
        let _saving = self.save_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = self.snapshot();

        let encoded = serde_json::to_vec_pretty(&SnapshotOut {
            last_link_num: snapshot.last_id,
            data: &snapshot.records,
        })
        .map_err(|e| self.write_error("serialize", e))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.write_error("create directory", e))?;
            }
        }

        let tmp = temp_path(&self.path);
        fs::write(&tmp, &encoded).map_err(|e| self.write_error("write", e))?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(self.write_error("rename", e));
        }

        debug!(
            path = %self.path.display(),
            batches = snapshot.records.len(),
            "state saved"
        );
        Ok(())
    }

    fn write_error(&self, step: &str, err: impl std::fmt::Display) -> LinkCheckError {
        LinkCheckError::persistence(
            self.path.to_string_lossy(),
            format!("{} failed: {}", step, err),
        )
    }
}

/// Sibling temp file, e.g. `storage.json` → `storage.json.tmp`.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "state".into());
    name.push(".tmp");
    path.with_file_name(name)
}
