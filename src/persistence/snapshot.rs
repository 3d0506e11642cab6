//! Snapshot file format and atomic file operations.
//!
//! A snapshot is one JSON document:
//!
//! ```json
//! { "version": 1, "saved_at_ms": 1700000000000,
//!   "entries": [ { "key": "k", "value": "v", "expires_at_ms": 1700000005000 } ] }
//! ```
//!
//! Deadlines are absolute Unix epoch milliseconds so a snapshot keeps its
//! meaning across restarts. Writes go to a `.tmp` sibling, are fsynced, and are
//! then renamed over the target, so a reader sees either the old file or the
//! new one, never a partial write.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::Entry;

/// The only snapshot layout this build reads and writes.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Errors that can occur during snapshot operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot file '{}' does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> SnapshotError {
    let path = path.to_path_buf();
    move |source| SnapshotError::Io { path, source }
}

/// One persisted key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub key: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<u64>,
}

/// A full snapshot document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotData {
    pub version: u32,
    pub saved_at_ms: u64,
    pub entries: Vec<SnapshotEntry>,
}

/// A matched pair of clock readings used to translate between monotonic
/// deadlines and wall-clock timestamps.
#[derive(Debug, Clone, Copy)]
struct Clocks {
    instant: Instant,
    epoch_ms: u64,
}

impl Clocks {
    fn now() -> Self {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis();
        let epoch_ms = u64::try_from(epoch_ms).unwrap_or(u64::MAX);
        Self {
            instant: Instant::now(),
            epoch_ms,
        }
    }

    fn to_epoch_ms(self, deadline: Instant) -> u64 {
        let left = deadline.saturating_duration_since(self.instant);
        let left_ms = u64::try_from(left.as_millis()).unwrap_or(u64::MAX);
        self.epoch_ms.saturating_add(left_ms)
    }

    /// Maps a wall-clock deadline back onto the monotonic clock.
    ///
    /// Returns `None` when the deadline has already passed, and `Some(None)`
    /// when it lies beyond what the monotonic clock can represent.
    fn to_instant(self, epoch_ms: u64) -> Option<Option<Instant>> {
        if epoch_ms <= self.epoch_ms {
            return None;
        }
        Some(
            self.instant
                .checked_add(Duration::from_millis(epoch_ms - self.epoch_ms)),
        )
    }
}

impl SnapshotData {
    /// Builds a snapshot document from live engine entries.
    pub fn capture(entries: Vec<(String, Entry)>) -> Self {
        let clocks = Clocks::now();
        let entries = entries
            .into_iter()
            .map(|(key, entry)| SnapshotEntry {
                key,
                value: entry.value,
                expires_at_ms: entry.expires_at.map(|at| clocks.to_epoch_ms(at)),
            })
            .collect();

        Self {
            version: SNAPSHOT_VERSION,
            saved_at_ms: clocks.epoch_ms,
            entries,
        }
    }

    /// Converts the document back into engine entries, dropping any whose
    /// deadline passed while they sat on disk.
    pub fn into_entries(self) -> Vec<(String, Entry)> {
        let clocks = Clocks::now();
        self.entries
            .into_iter()
            .filter_map(|record| {
                let expires_at = match record.expires_at_ms {
                    Some(ms) => clocks.to_instant(ms)?,
                    None => None,
                };
                Some((record.key, Entry::with_deadline(record.value, expires_at)))
            })
            .collect()
    }
}

/// Path of the temporary file a save writes before renaming.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Writes a snapshot atomically (write to .tmp, fsync, rename).
///
/// Creates the parent directory if it does not exist. On failure the previous
/// snapshot, if any, is left in place and the temporary file is removed.
pub fn write_snapshot(path: &Path, data: &SnapshotData) -> Result<(), SnapshotError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }

    let tmp = temp_path(path);
    let result = write_temp(&tmp, data)
        .and_then(|()| fs::rename(&tmp, path).map_err(io_error(path)));

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_temp(tmp: &Path, data: &SnapshotData) -> Result<(), SnapshotError> {
    let file = File::create(tmp).map_err(io_error(tmp))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, data)?;
    writer.flush().map_err(io_error(tmp))?;

    let file = writer
        .into_inner()
        .map_err(|e| io_error(tmp)(e.into_error()))?;
    file.sync_all().map_err(io_error(tmp))
}

/// Reads and validates a snapshot.
pub fn read_snapshot(path: &Path) -> Result<SnapshotData, SnapshotError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => SnapshotError::NotFound(path.to_path_buf()),
        _ => io_error(path)(e),
    })?;

    let data: SnapshotData = serde_json::from_reader(BufReader::new(file))?;
    if data.version != SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(data.version));
    }

    Ok(data)
}

/// Forces an existing snapshot file to stable storage.
///
/// Returns `Ok(false)` when there is no snapshot yet.
pub fn sync_snapshot(path: &Path) -> Result<bool, SnapshotError> {
    // Some platforms refuse to flush a handle opened read-only.
    match OpenOptions::new().write(true).open(path) {
        Ok(file) => {
            file.sync_all().map_err(io_error(path))?;
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_error(path)(e)),
    }
}
