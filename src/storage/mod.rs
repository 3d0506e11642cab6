//! Storage Engine Module
//!
//! The in-memory key-value store and its expiry machinery.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │                   gate: RwLock<()>                          │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...64    │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │
//!              ┌─────────────┴─────────────┐
//!              │     ExpirySweeper         │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use linekv::storage::StorageEngine;
//! use std::time::Duration;
//!
//! let engine = StorageEngine::new();
//!
//! engine.set("name".to_string(), "Ariz".to_string());
//! assert_eq!(engine.get("name"), Some("Ariz".to_string()));
//!
//! engine.set_with_ttl("gone".to_string(), "x".to_string(), Duration::ZERO);
//! assert_eq!(engine.get("gone"), None);
//! ```

pub mod engine;
pub mod expiry;

pub use engine::{Entry, StorageEngine, StorageStats, MAX_TTL};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper};
