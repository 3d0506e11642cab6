//! # linekv - An In-Memory Key-Value Server
//!
//! linekv keeps string keys and values in memory, serves them over a plain
//! text, one-command-per-line TCP protocol, expires keys after a TTL and can
//! snapshot the live data set to disk on demand.
//!
//! ## Features
//!
//! - **Line Protocol**: `SET name Ariz` in, `OK` out; usable from `nc` or telnet
//! - **Concurrent**: Sharded storage with RwLock, one Tokio task per client
//! - **TTL Support**: Keys can have expiry times with lazy and background cleanup
//! - **Snapshots**: SAVE / LOAD / FLUSH against an atomically replaced JSON file
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              linekv                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                          ┌────────────────────┼──────────────┐          │
//! │                          ▼                    ▼              │          │
//! │  ┌─────────────┐    ┌──────────────────────────────────────┐ │          │
//! │  │   Line      │    │            StorageEngine             │ │          │
//! │  │   Parser    │    │  ┌────────┐ ┌────────┐ ┌────────┐    │ │          │
//! │  └─────────────┘    │  │Shard 0 │ │Shard 1 │ │...N    │    │ │          │
//! │                     │  └────────┘ └────────┘ └────────┘    │ │          │
//! │                     └──────────────────────────────────────┘ │          │
//! │                          ▲                    ▲              ▼          │
//! │                          │                    │   ┌──────────────────┐  │
//! │          ┌───────────────┴──────┐             └───│PersistenceManager│  │
//! │          │    ExpirySweeper     │                 │  (snapshot file) │  │
//! │          └──────────────────────┘                 └──────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use linekv::server::Server;
//! use linekv::storage::start_expiry_sweeper;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = Server::new("dump.linekv.json");
//!     let _sweeper = start_expiry_sweeper(Arc::clone(server.storage()));
//!
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!     server.run_until(listener, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     }).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Commands
//!
//! - `SET key value [ttl]`, `GET key`, `DEL key`, `EXISTS key`
//! - `EXPIRE key seconds`, `TTL key`, `KEYS`
//! - `SAVE`, `LOAD`, `CLEAR`, `FLUSH`
//! - `STATS`, `PING [message]`, `HELP`, `QUIT`
//!
//! ## Module Overview
//!
//! - [`protocol`]: line framing, command parsing, reply encoding
//! - [`storage`]: thread-safe storage engine with TTL support
//! - [`persistence`]: snapshot file format and SAVE / LOAD / FLUSH
//! - [`commands`]: command execution
//! - [`connection`]: client connection management
//! - [`server`]: accept loop and shared state
//! - [`config`]: command-line and environment configuration

pub mod commands;
pub mod config;
pub mod connection;
pub mod persistence;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::Config;
pub use connection::{handle_connection, ConnectionStats};
pub use persistence::{PersistenceManager, SnapshotError};
pub use protocol::{parse_command, Command, LineParser, ProtocolError, Reply};
pub use server::Server;
pub use storage::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, StorageEngine};

/// The default port linekv listens on
pub const DEFAULT_PORT: u16 = 8080;

/// The default host linekv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// The default snapshot file, relative to the working directory
pub const DEFAULT_SNAPSHOT_PATH: &str = "dump.linekv.json";

/// Version of linekv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
