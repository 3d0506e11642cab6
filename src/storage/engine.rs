//! Thread-Safe Storage Engine with Expiry Support
//!
//! This module implements the core storage engine for linekv.
//! It provides a thread-safe, concurrent map of string keys to string values
//! with optional TTL (Time-To-Live) per key.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Per-key operations only lock the shard their key hashes to.
//! 2. **Store-Wide Gate**: A single `RwLock<()>` sits in front of all shards. Per-key
//!    operations hold it shared; whole-store operations (clear, snapshot export,
//!    snapshot import) hold it exclusively, so they observe and produce a single
//!    point-in-time state.
//! 3. **Lazy Expiry**: Keys are checked for expiry on access, plus a background sweep.
//! 4. **Monotonic Deadlines**: Expiry deadlines are `Instant`s, compared against
//!    `Instant::now()` at the moment of each operation.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │        gate: RwLock<()>  (shared: per-key ops,              │
//! │                           exclusive: clear/export/import)   │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lock order is always gate, then shard. Nothing takes the gate while holding a shard.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Number of shards for the storage engine.
/// More shards = less lock contention, but more memory overhead.
const NUM_SHARDS: usize = 64;

/// Represents a stored value with optional expiry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The actual value stored
    pub value: String,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates a new entry without expiry.
    pub fn new(value: String) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Creates a new entry with TTL.
    ///
    /// A zero TTL produces an entry that is already expired. TTLs are capped
    /// at [`MAX_TTL`].
    pub fn with_ttl(value: String, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: deadline_after(ttl),
        }
    }

    /// Creates an entry with an explicit deadline.
    pub fn with_deadline(value: String, expires_at: Option<Instant>) -> Self {
        Self { value, expires_at }
    }

    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Checks if this entry is expired as of `now`.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }

    /// Returns the remaining lifetime, or None if no expiry.
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|exp| exp.saturating_duration_since(Instant::now()))
    }
}

/// Longest TTL a key can carry (10^15 seconds). Larger requests are capped,
/// which keeps every deadline representable both as an `Instant` and as
/// epoch milliseconds in a snapshot.
pub const MAX_TTL: Duration = Duration::from_secs(1_000_000_000_000_000);

/// The deadline `ttl` from now, or `None` if the clock cannot represent it.
fn deadline_after(ttl: Duration) -> Option<Instant> {
    Instant::now().checked_add(ttl.min(MAX_TTL))
}

/// A single shard containing a portion of the key-value pairs.
#[derive(Debug)]
struct Shard {
    data: RwLock<HashMap<String, Entry>>,
}

impl Shard {
    fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }
}

// A panicking writer never leaves a map half-updated (every mutation is a single
// insert/remove/retain call), so a poisoned lock still guards consistent data.
fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// The main storage engine for linekv.
///
/// Stores all key-value pairs and handles concurrent access from every client
/// connection. Designed to be wrapped in an `Arc` and shared across tasks.
///
/// # Example
///
/// ```
/// use linekv::storage::StorageEngine;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.set("name".to_string(), "Ariz".to_string());
/// assert_eq!(engine.get("name"), Some("Ariz".to_string()));
///
/// engine.set_with_ttl("session".to_string(), "abc123".to_string(), Duration::from_secs(60));
/// assert!(engine.exists("session"));
/// ```
pub struct StorageEngine {
    /// Sharded storage for reduced lock contention
    shards: Vec<Shard>,

    /// Store-wide gate; held exclusively by whole-store operations
    gate: RwLock<()>,

    /// Statistics: number of resident keys (approximate, includes not-yet-evicted expired keys)
    key_count: AtomicU64,

    /// Statistics: total GET operations
    get_count: AtomicU64,

    /// Statistics: total SET operations
    set_count: AtomicU64,

    /// Statistics: total DEL operations
    del_count: AtomicU64,

    /// Statistics: number of expired keys evicted
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("key_count", &self.key_count.load(Ordering::Relaxed))
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates a new storage engine with default settings.
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS).map(|_| Shard::new()).collect();

        Self {
            shards,
            gate: RwLock::new(()),
            key_count: AtomicU64::new(0),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    /// Determines which shard a key belongs to.
    #[inline]
    fn shard_index(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % NUM_SHARDS
    }

    /// Gets the shard for a given key.
    #[inline]
    fn get_shard(&self, key: &str) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Records the eviction of `count` expired entries.
    #[inline]
    fn record_evicted(&self, count: u64) {
        self.key_count.fetch_sub(count, Ordering::Relaxed);
        self.expired_count.fetch_add(count, Ordering::Relaxed);
    }

    fn insert(&self, key: String, entry: Entry) -> bool {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let _gate = read_lock(&self.gate);
        let mut data = write_lock(&self.get_shard(&key).data);

        let is_new = data.insert(key, entry).is_none();
        if is_new {
            self.key_count.fetch_add(1, Ordering::Relaxed);
        }

        is_new
    }

    /// Sets a key-value pair without expiry.
    ///
    /// If the key already exists, its value is overwritten and any previous
    /// expiry is discarded.
    ///
    /// # Returns
    ///
    /// Returns `true` if a new key was created, `false` if an existing key was updated.
    pub fn set(&self, key: String, value: String) -> bool {
        self.insert(key, Entry::new(value))
    }

    /// Sets a key-value pair with a TTL (Time-To-Live).
    ///
    /// The key will automatically expire after the specified duration. A zero
    /// duration makes the key expired immediately.
    ///
    /// # Returns
    ///
    /// Returns `true` if a new key was created, `false` if an existing key was updated.
    pub fn set_with_ttl(&self, key: String, value: String, ttl: Duration) -> bool {
        self.insert(key, Entry::with_ttl(value, ttl))
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    /// This implements "lazy expiry" - expired keys are detected and removed on access.
    pub fn get(&self, key: &str) -> Option<String> {
        self.get_count.fetch_add(1, Ordering::Relaxed);
        self.get_entry(key).map(|entry| entry.value)
    }

    /// Gets the full entry for a key (including its deadline).
    ///
    /// Evicts the entry if it turns out to be expired.
    pub fn get_entry(&self, key: &str) -> Option<Entry> {
        let _gate = read_lock(&self.gate);
        let shard = self.get_shard(key);

        // Fast path under the shard read lock
        {
            let data = read_lock(&shard.data);
            match data.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Key exists but is expired - need write lock to remove it
        let mut data = write_lock(&shard.data);
        if let Some(entry) = data.get(key) {
            if entry.is_expired() {
                data.remove(key);
                self.record_evicted(1);
                return None;
            }
            // Race: another connection replaced the key in between
            return Some(entry.clone());
        }

        None
    }

    /// Deletes a live key from the database.
    ///
    /// An expired key is evicted but reported as absent.
    ///
    /// # Returns
    ///
    /// Returns `true` if a live key was deleted, `false` otherwise.
    pub fn delete(&self, key: &str) -> bool {
        self.del_count.fetch_add(1, Ordering::Relaxed);

        let _gate = read_lock(&self.gate);
        let mut data = write_lock(&self.get_shard(key).data);

        match data.remove(key) {
            Some(entry) if entry.is_expired() => {
                self.record_evicted(1);
                false
            }
            Some(_) => {
                self.key_count.fetch_sub(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Checks if a key exists (and is not expired).
    pub fn exists(&self, key: &str) -> bool {
        let _gate = read_lock(&self.gate);
        let data = read_lock(&self.get_shard(key).data);

        data.get(key).map(|e| !e.is_expired()).unwrap_or(false)
    }

    /// Sets an expiry time on an existing key.
    ///
    /// # Returns
    ///
    /// Returns `true` if the expiry was set, `false` if the key doesn't exist.
    pub fn expire(&self, key: &str, ttl: Duration) -> bool {
        self.update_deadline(key, deadline_after(ttl))
    }

    /// Removes the expiry from a key (makes it persistent).
    ///
    /// # Returns
    ///
    /// Returns `true` if the key is live (and is now persistent), `false` if it
    /// doesn't exist.
    pub fn persist(&self, key: &str) -> bool {
        self.update_deadline(key, None)
    }

    fn update_deadline(&self, key: &str, expires_at: Option<Instant>) -> bool {
        let _gate = read_lock(&self.gate);
        let mut data = write_lock(&self.get_shard(key).data);

        match data.get_mut(key) {
            Some(entry) if entry.is_expired() => {
                data.remove(key);
                self.record_evicted(1);
                false
            }
            Some(entry) => {
                entry.expires_at = expires_at;
                true
            }
            None => false,
        }
    }

    /// Gets the remaining TTL for a key in seconds.
    ///
    /// # Returns
    ///
    /// - `Some(seconds)` if the key exists and has an expiry
    /// - `Some(-1)` if the key exists but has no expiry
    /// - `None` if the key doesn't exist
    pub fn ttl(&self, key: &str) -> Option<i64> {
        self.get_entry(key).map(|entry| {
            entry
                .remaining()
                .map(|left| i64::try_from(left.as_secs()).unwrap_or(i64::MAX))
                .unwrap_or(-1)
        })
    }

    /// Returns all live keys, sorted.
    ///
    /// Expired keys are skipped but not evicted; that is left to the sweeper or
    /// the next access.
    pub fn keys(&self) -> Vec<String> {
        let _gate = read_lock(&self.gate);
        let now = Instant::now();
        let mut result = Vec::new();

        for shard in &self.shards {
            let data = read_lock(&shard.data);
            result.extend(
                data.iter()
                    .filter(|(_, entry)| !entry.is_expired_at(now))
                    .map(|(key, _)| key.clone()),
            );
        }

        result.sort_unstable();
        result
    }

    /// Clears all data from the database.
    pub fn clear(&self) {
        let _gate = write_lock(&self.gate);
        for shard in &self.shards {
            write_lock(&shard.data).clear();
        }
        self.key_count.store(0, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of every live entry.
    ///
    /// Holds the gate exclusively, so no mutation can interleave with the copy.
    pub fn snapshot_live(&self) -> Vec<(String, Entry)> {
        let _gate = write_lock(&self.gate);
        let now = Instant::now();
        let mut result = Vec::new();

        for shard in &self.shards {
            let data = read_lock(&shard.data);
            result.extend(
                data.iter()
                    .filter(|(_, entry)| !entry.is_expired_at(now))
                    .map(|(key, entry)| (key.clone(), entry.clone())),
            );
        }

        result.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        result
    }

    /// Merges entries into the store as one exclusive step.
    ///
    /// Each given key overwrites the resident one; keys not mentioned are left alone.
    ///
    /// # Returns
    ///
    /// The number of entries written.
    pub fn merge(&self, entries: Vec<(String, Entry)>) -> usize {
        let _gate = write_lock(&self.gate);
        let mut written = 0;

        for (key, entry) in entries {
            let mut data = write_lock(&self.get_shard(&key).data);
            if data.insert(key, entry).is_none() {
                self.key_count.fetch_add(1, Ordering::Relaxed);
            }
            written += 1;
        }

        written
    }

    /// Returns the approximate number of resident keys.
    ///
    /// Expired keys that have not been evicted yet are still counted.
    pub fn len(&self) -> u64 {
        self.key_count.load(Ordering::Relaxed)
    }

    /// Returns true if the database is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counts the live keys exactly by scanning every shard.
    pub fn live_len(&self) -> usize {
        let _gate = read_lock(&self.gate);
        let now = Instant::now();

        self.shards
            .iter()
            .map(|shard| {
                read_lock(&shard.data)
                    .values()
                    .filter(|entry| !entry.is_expired_at(now))
                    .count()
            })
            .sum()
    }

    /// Returns database statistics.
    ///
    /// Memory is the byte length of every live key plus its value.
    pub fn stats(&self) -> StorageStats {
        let _gate = read_lock(&self.gate);
        let now = Instant::now();
        let (mut keys, mut memory_bytes) = (0u64, 0u64);

        for shard in &self.shards {
            for (key, entry) in read_lock(&shard.data).iter() {
                if !entry.is_expired_at(now) {
                    keys += 1;
                    memory_bytes += (key.len() + entry.value.len()) as u64;
                }
            }
        }

        StorageStats {
            keys,
            memory_bytes,
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }

    /// Cleans up expired keys from all shards.
    ///
    /// This is called by the background expiry sweeper. Each shard is swept under
    /// its own write lock, so it never races with a GET/SET/DEL on the same key.
    ///
    /// # Returns
    ///
    /// Returns the number of keys that were cleaned up.
    pub fn cleanup_expired(&self) -> u64 {
        let _gate = read_lock(&self.gate);
        let mut cleaned = 0u64;

        for shard in &self.shards {
            let mut data = write_lock(&shard.data);
            let now = Instant::now();
            let before = data.len();

            data.retain(|_, entry| !entry.is_expired_at(now));

            cleaned += (before - data.len()) as u64;
        }

        if cleaned > 0 {
            self.record_evicted(cleaned);
        }

        cleaned
    }
}

/// Database statistics.
#[derive(Debug, Clone, Copy)]
pub struct StorageStats {
    /// Number of live keys
    pub keys: u64,
    /// Bytes held by live keys and values
    pub memory_bytes: u64,
    /// Total GET operations
    pub get_ops: u64,
    /// Total SET operations
    pub set_ops: u64,
    /// Total DEL operations
    pub del_ops: u64,
    /// Total expired keys evicted
    pub expired: u64,
}
