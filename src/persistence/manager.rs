//! SAVE / LOAD / FLUSH orchestration.
//!
//! Snapshot file access is serialized by `file_lock`. The engine gate is only
//! taken while holding it, never the other way around.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::persistence::snapshot::{
    read_snapshot, sync_snapshot, write_snapshot, SnapshotData, SnapshotError,
};
use crate::storage::StorageEngine;

/// Owns the snapshot path and moves data between it and the engine.
#[derive(Debug)]
pub struct PersistenceManager {
    storage: Arc<StorageEngine>,
    path: PathBuf,
    file_lock: Mutex<()>,
    save_count: AtomicU64,
    load_count: AtomicU64,
}

/// Persistence counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct PersistenceStats {
    /// Successful SAVEs
    pub saves: u64,
    /// Successful LOADs
    pub loads: u64,
}

impl PersistenceManager {
    pub fn new(storage: Arc<StorageEngine>, path: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            path: path.into(),
            file_lock: Mutex::new(()),
            save_count: AtomicU64::new(0),
            load_count: AtomicU64::new(0),
        }
    }

    /// The snapshot file this manager reads and writes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes every live entry to the snapshot file, replacing it atomically.
    ///
    /// # Returns
    ///
    /// The number of entries written.
    pub fn save(&self) -> Result<usize, SnapshotError> {
        let _file = self.file_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let data = SnapshotData::capture(self.storage.snapshot_live());
        let count = data.entries.len();
        write_snapshot(&self.path, &data)?;

        self.save_count.fetch_add(1, Ordering::Relaxed);
        info!(path = %self.path.display(), entries = count, "Snapshot saved");
        Ok(count)
    }

    /// Merges the snapshot file into the store.
    ///
    /// Keys in the snapshot overwrite resident ones; other keys are untouched.
    /// If the file is missing or malformed the store is not modified.
    ///
    /// # Returns
    ///
    /// The number of entries restored.
    pub fn load(&self) -> Result<usize, SnapshotError> {
        let _file = self.file_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let data = read_snapshot(&self.path)?;
        let stored = data.entries.len();
        let restored = self.storage.merge(data.into_entries());

        self.load_count.fetch_add(1, Ordering::Relaxed);
        info!(
            path = %self.path.display(),
            restored,
            skipped_expired = stored - restored,
            "Snapshot loaded"
        );
        Ok(restored)
    }

    /// Syncs the current snapshot to disk, then empties the store.
    ///
    /// The snapshot itself is never rewritten, so a later LOAD still restores
    /// the last SAVE. On a sync failure the store is left as it was.
    pub fn flush(&self) -> Result<(), SnapshotError> {
        let _file = self.file_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let synced = sync_snapshot(&self.path)?;
        self.storage.clear();

        debug!(path = %self.path.display(), synced, "Store flushed");
        Ok(())
    }

    pub fn stats(&self) -> PersistenceStats {
        PersistenceStats {
            saves: self.save_count.load(Ordering::Relaxed),
            loads: self.load_count.load(Ordering::Relaxed),
        }
    }
}
