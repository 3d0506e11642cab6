//! Snapshot Persistence Module
//!
//! - `snapshot`: on-disk format, atomic write, read, durability sync
//! - `manager`: `PersistenceManager`, which runs SAVE / LOAD / FLUSH against a
//!   shared [`StorageEngine`](crate::storage::StorageEngine)
//!
//! ```text
//!   SAVE:  file_lock ─> engine.snapshot_live() ─> write .tmp ─> fsync ─> rename
//!   LOAD:  file_lock ─> read + validate ─> engine.merge()
//!   FLUSH: file_lock ─> fsync existing snapshot ─> engine.clear()
//! ```

pub mod manager;
pub mod snapshot;

pub use manager::{PersistenceManager, PersistenceStats};
pub use snapshot::{SnapshotData, SnapshotEntry, SnapshotError, SNAPSHOT_VERSION};
