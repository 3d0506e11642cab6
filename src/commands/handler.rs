//! Command Handler Module
//!
//! Executes parsed [`Command`]s against the storage engine and the persistence
//! manager and turns the outcome into a single [`Reply`].
//!
//! ## Supported Commands
//!
//! ### Key Commands
//! - `SET key value [ttl]` - Set a key, optionally expiring after `ttl` seconds
//! - `GET key` - Get a key's value
//! - `DEL key` - Delete a key
//! - `EXISTS key` - Check if a key is live
//! - `EXPIRE key seconds` - Set (or with `seconds <= 0`, remove) an expiry
//! - `TTL key` - Remaining seconds, `-1` if the key never expires
//! - `KEYS` - All live keys, sorted
//!
//! ### Persistence Commands
//! - `SAVE` - Write live keys to the snapshot file
//! - `LOAD` - Merge the snapshot file into memory
//! - `CLEAR` - Empty memory only
//! - `FLUSH` - Sync the snapshot to disk, then empty memory
//!
//! ### Server Commands
//! - `STATS`, `PING [message]`, `HELP`, `QUIT`
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │  execute()  │───>│  dispatch() │───>│  cmd_*()    │     │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘     │
//! │                                               │             │
//! │                         ┌─────────────────────┴───┐         │
//! │                         ▼                         ▼         │
//! │                  StorageEngine          PersistenceManager  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::connection::ConnectionStats;
use crate::persistence::{PersistenceManager, SnapshotError};
use crate::protocol::{Command, Reply};
use crate::storage::StorageEngine;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

const HELP_TEXT: &str = "Commands: SET key value [ttl] | GET key | DEL key | EXISTS key | \
EXPIRE key seconds | TTL key | KEYS | SAVE | LOAD | CLEAR | FLUSH | STATS | PING [message] | \
HELP | QUIT";

/// Executes commands against the shared store.
///
/// Cloning is cheap; every connection gets its own clone.
#[derive(Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,
    /// Snapshot SAVE / LOAD / FLUSH
    persistence: Arc<PersistenceManager>,
    /// Server-wide connection counters, reported by STATS
    stats: Arc<ConnectionStats>,
}

impl CommandHandler {
    pub fn new(
        storage: Arc<StorageEngine>,
        persistence: Arc<PersistenceManager>,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        Self {
            storage,
            persistence,
            stats,
        }
    }

    /// Executes a command and returns the reply.
    ///
    /// Every store operation runs to completion even if the returned future is
    /// dropped, so a client that disconnects mid-command never leaves a
    /// half-applied change.
    pub async fn execute(&self, command: Command) -> Reply {
        self.stats.command_processed();
        self.dispatch(command).await
    }

    /// Dispatches a command to its handler.
    async fn dispatch(&self, command: Command) -> Reply {
        match command {
            // Key commands
            Command::Set { key, value, ttl } => self.cmd_set(key, value, ttl),
            Command::Get { key } => self.cmd_get(&key),
            Command::Del { key } => self.cmd_del(&key),
            Command::Exists { key } => self.cmd_exists(&key),
            Command::Expire { key, seconds } => self.cmd_expire(&key, seconds),
            Command::Ttl { key } => self.cmd_ttl(&key),
            Command::Keys => self.cmd_keys(),

            // Persistence commands
            Command::Save => self.cmd_save().await,
            Command::Load => self.cmd_load().await,
            Command::Clear => self.cmd_clear(),
            Command::Flush => self.cmd_flush().await,

            // Server commands
            Command::Stats => self.cmd_stats(),
            Command::Ping { message } => match message {
                Some(message) => Reply::Value(message),
                None => Reply::Pong,
            },
            Command::Help => Reply::Info(HELP_TEXT.to_string()),
            Command::Quit => Reply::Bye,
        }
    }

    // ========================================================================
    // Key Commands
    // ========================================================================

    /// SET key value [ttl]
    ///
    /// A TTL of zero or less stores the key already expired.
    fn cmd_set(&self, key: String, value: String, ttl: Option<i64>) -> Reply {
        info!(command = "SET", key = %key, ttl = ?ttl, "audit");

        match ttl {
            Some(seconds) => {
                let ttl = Duration::from_secs(seconds.max(0) as u64);
                self.storage.set_with_ttl(key, value, ttl);
            }
            None => {
                self.storage.set(key, value);
            }
        }

        Reply::ok()
    }

    /// GET key
    fn cmd_get(&self, key: &str) -> Reply {
        debug!(command = "GET", key = %key);

        match self.storage.get(key) {
            Some(value) => Reply::Value(value),
            None => Reply::NotFound,
        }
    }

    /// DEL key
    fn cmd_del(&self, key: &str) -> Reply {
        info!(command = "DEL", key = %key, "audit");
        Reply::flag(self.storage.delete(key))
    }

    /// EXISTS key
    fn cmd_exists(&self, key: &str) -> Reply {
        debug!(command = "EXISTS", key = %key);
        Reply::flag(self.storage.exists(key))
    }

    /// EXPIRE key seconds
    fn cmd_expire(&self, key: &str, seconds: i64) -> Reply {
        info!(command = "EXPIRE", key = %key, seconds, "audit");

        let found = if seconds > 0 {
            self.storage.expire(key, Duration::from_secs(seconds as u64))
        } else {
            self.storage.persist(key)
        };

        if found {
            Reply::ok()
        } else {
            Reply::NotFound
        }
    }

    /// TTL key
    fn cmd_ttl(&self, key: &str) -> Reply {
        debug!(command = "TTL", key = %key);

        match self.storage.ttl(key) {
            Some(seconds) => Reply::integer(seconds),
            None => Reply::NotFound,
        }
    }

    /// KEYS
    fn cmd_keys(&self) -> Reply {
        debug!(command = "KEYS");
        Reply::Keys(self.storage.keys())
    }

    // ========================================================================
    // Persistence Commands
    // ========================================================================

    /// Runs a snapshot operation on the blocking pool and maps it to a reply.
    async fn run_snapshot_op<T, F>(&self, name: &'static str, op: F) -> Reply
    where
        F: FnOnce(&PersistenceManager) -> Result<T, SnapshotError> + Send + 'static,
        T: Send + 'static,
    {
        let persistence = Arc::clone(&self.persistence);

        match tokio::task::spawn_blocking(move || op(&persistence)).await {
            Ok(Ok(_)) => Reply::ok(),
            Ok(Err(e)) => {
                error!(command = name, error = %e, "Snapshot operation failed");
                Reply::error(e.to_string())
            }
            Err(e) => {
                error!(command = name, error = %e, "Snapshot task aborted");
                Reply::error(format!("{} aborted", name))
            }
        }
    }

    /// SAVE
    async fn cmd_save(&self) -> Reply {
        info!(command = "SAVE", "audit");
        self.run_snapshot_op("SAVE", PersistenceManager::save).await
    }

    /// LOAD
    async fn cmd_load(&self) -> Reply {
        info!(command = "LOAD", "audit");
        self.run_snapshot_op("LOAD", PersistenceManager::load).await
    }

    /// CLEAR
    fn cmd_clear(&self) -> Reply {
        info!(command = "CLEAR", "audit");
        self.storage.clear();
        Reply::ok()
    }

    /// FLUSH
    async fn cmd_flush(&self) -> Reply {
        info!(command = "FLUSH", "audit");
        self.run_snapshot_op("FLUSH", PersistenceManager::flush).await
    }

    // ========================================================================
    // Server Commands
    // ========================================================================

    /// STATS
    fn cmd_stats(&self) -> Reply {
        let storage = self.storage.stats();
        let persistence = self.persistence.stats();

        Reply::Info(format!(
            "keys={} memory_bytes={} expired={} gets={} sets={} dels={} commands={} connections={} \
             active_connections={} saves={} loads={} uptime_secs={}",
            storage.keys,
            storage.memory_bytes,
            storage.expired,
            storage.get_ops,
            storage.set_ops,
            storage.del_ops,
            self.stats.commands_processed.load(Ordering::Relaxed),
            self.stats.connections_accepted.load(Ordering::Relaxed),
            self.stats.active_connections.load(Ordering::Relaxed),
            persistence.saves,
            persistence.loads,
            self.stats.uptime().as_secs(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::parse_command;
    use tempfile::TempDir;

    fn create_handler() -> (TempDir, CommandHandler) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(StorageEngine::new());
        let persistence = Arc::new(PersistenceManager::new(
            Arc::clone(&storage),
            dir.path().join("dump.json"),
        ));
        let stats = Arc::new(ConnectionStats::new());
        (dir, CommandHandler::new(storage, persistence, stats))
    }

    async fn run(handler: &CommandHandler, line: &str) -> String {
        handler.execute(parse_command(line).unwrap()).await.to_string()
    }

    #[tokio::test]
    async fn test_ping() {
        let (_dir, handler) = create_handler();
        assert_eq!(run(&handler, "PING").await, "PONG");
        assert_eq!(run(&handler, "PING hello").await, "hello");
    }

    #[tokio::test]
    async fn test_set_get() {
        let (_dir, handler) = create_handler();

        assert_eq!(run(&handler, "SET test_key test_value").await, "OK");
        assert_eq!(run(&handler, "GET test_key").await, "test_value");

        assert_eq!(run(&handler, "SET test_key other").await, "OK");
        assert_eq!(run(&handler, "GET test_key").await, "other");
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let (_dir, handler) = create_handler();
        assert_eq!(run(&handler, "GET nonexistent").await, "Key not found");
    }

    #[tokio::test]
    async fn test_del() {
        let (_dir, handler) = create_handler();

        run(&handler, "SET key1 value1").await;
        assert_eq!(run(&handler, "DEL key1").await, "1");
        assert_eq!(run(&handler, "DEL key1").await, "0");
        assert_eq!(run(&handler, "GET key1").await, "Key not found");
    }

    #[tokio::test]
    async fn test_exists() {
        let (_dir, handler) = create_handler();

        run(&handler, "SET key1 value1").await;
        assert_eq!(run(&handler, "EXISTS key1").await, "1");
        assert_eq!(run(&handler, "EXISTS nonexistent").await, "0");
    }

    #[tokio::test]
    async fn test_keys_sorted_and_empty() {
        let (_dir, handler) = create_handler();

        assert_eq!(run(&handler, "KEYS").await, "(empty)");

        run(&handler, "SET b 2").await;
        run(&handler, "SET a 1").await;
        run(&handler, "SET c 3").await;
        assert_eq!(run(&handler, "KEYS").await, "a b c");
    }

    #[tokio::test]
    async fn test_set_nonpositive_ttl_is_immediately_expired() {
        let (_dir, handler) = create_handler();

        assert_eq!(run(&handler, "SET gone v 0").await, "OK");
        assert_eq!(run(&handler, "SET also_gone v -3").await, "OK");
        assert_eq!(run(&handler, "GET gone").await, "Key not found");
        assert_eq!(run(&handler, "EXISTS also_gone").await, "0");
        assert_eq!(run(&handler, "KEYS").await, "(empty)");
    }

    #[tokio::test]
    async fn test_set_without_ttl_clears_previous_ttl() {
        let (_dir, handler) = create_handler();

        run(&handler, "SET k v 100").await;
        assert_ne!(run(&handler, "TTL k").await, "-1");
        run(&handler, "SET k v").await;
        assert_eq!(run(&handler, "TTL k").await, "-1");
    }

    #[tokio::test]
    async fn test_expire_and_ttl() {
        let (_dir, handler) = create_handler();

        assert_eq!(run(&handler, "EXPIRE missing 10").await, "Key not found");
        assert_eq!(run(&handler, "TTL missing").await, "Key not found");

        run(&handler, "SET k v").await;
        assert_eq!(run(&handler, "TTL k").await, "-1");

        assert_eq!(run(&handler, "EXPIRE k 100").await, "OK");
        let ttl: i64 = run(&handler, "TTL k").await.parse().unwrap();
        assert!(ttl > 90 && ttl <= 100);

        assert_eq!(run(&handler, "EXPIRE k 0").await, "OK");
        assert_eq!(run(&handler, "TTL k").await, "-1");
        assert_eq!(run(&handler, "GET k").await, "v");
    }

    #[tokio::test]
    async fn test_huge_ttl_keeps_key_alive() {
        let (_dir, handler) = create_handler();

        assert_eq!(run(&handler, "SET k v 9223372036854775807").await, "OK");
        assert_eq!(run(&handler, "GET k").await, "v");

        run(&handler, "SET other v").await;
        assert_eq!(run(&handler, "EXPIRE other 9223372036854775807").await, "OK");
        assert_eq!(run(&handler, "GET other").await, "v");
        assert_eq!(run(&handler, "PING").await, "PONG");
    }

    #[tokio::test]
    async fn test_huge_ttl_survives_save_and_load() {
        let (_dir, handler) = create_handler();
        let cap = crate::storage::MAX_TTL.as_secs() as i64;

        run(&handler, "SET k v 100000000000000000").await;
        let before: i64 = run(&handler, "TTL k").await.parse().unwrap();
        assert!(before > cap - 5 && before <= cap);

        assert_eq!(run(&handler, "SAVE").await, "OK");
        assert_eq!(run(&handler, "CLEAR").await, "OK");
        assert_eq!(run(&handler, "LOAD").await, "OK");

        let after: i64 = run(&handler, "TTL k").await.parse().unwrap();
        assert!(after > before - 5 && after <= before);
    }

    #[tokio::test]
    async fn test_clear() {
        let (_dir, handler) = create_handler();

        run(&handler, "SET k1 v1").await;
        run(&handler, "SET k2 v2").await;
        assert_eq!(run(&handler, "CLEAR").await, "OK");
        assert_eq!(run(&handler, "KEYS").await, "(empty)");
    }

    #[tokio::test]
    async fn test_save_load_flush() {
        let (_dir, handler) = create_handler();

        run(&handler, "SET persist_key persist_value").await;
        assert_eq!(run(&handler, "SAVE").await, "OK");

        assert_eq!(run(&handler, "CLEAR").await, "OK");
        assert_eq!(run(&handler, "GET persist_key").await, "Key not found");

        assert_eq!(run(&handler, "LOAD").await, "OK");
        assert_eq!(run(&handler, "GET persist_key").await, "persist_value");

        assert_eq!(run(&handler, "FLUSH").await, "OK");
        assert_eq!(run(&handler, "GET persist_key").await, "Key not found");

        assert_eq!(run(&handler, "LOAD").await, "OK");
        assert_eq!(run(&handler, "GET persist_key").await, "persist_value");
    }

    #[tokio::test]
    async fn test_load_without_snapshot_is_error() {
        let (_dir, handler) = create_handler();

        run(&handler, "SET k v").await;
        let reply = run(&handler, "LOAD").await;
        assert!(reply.starts_with("ERROR: "), "got {}", reply);
        assert_eq!(run(&handler, "GET k").await, "v");
    }

    #[tokio::test]
    async fn test_stats() {
        let (_dir, handler) = create_handler();

        run(&handler, "SET a 1").await;
        run(&handler, "SET b 2").await;
        run(&handler, "GET a").await;
        run(&handler, "DEL b").await;
        run(&handler, "SAVE").await;

        let stats = run(&handler, "STATS").await;
        assert!(stats.starts_with("keys=1 "), "got {}", stats);
        assert!(stats.contains(" memory_bytes=2 "));
        assert!(stats.contains(" sets=2 "));
        assert!(stats.contains(" gets=1 "));
        assert!(stats.contains(" dels=1 "));
        assert!(stats.contains(" saves=1 "));
        assert!(stats.contains(" commands=6 "));
        assert!(stats.contains(" uptime_secs="));
        assert!(!stats.contains('\n'));
    }

    #[tokio::test]
    async fn test_help_and_quit() {
        let (_dir, handler) = create_handler();

        assert!(run(&handler, "HELP").await.contains("SET key value [ttl]"));
        assert_eq!(handler.execute(Command::Quit).await, Reply::Bye);
    }
}
