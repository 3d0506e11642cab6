//! Command Handler Module
//!
//! Receives parsed commands, executes them against the storage engine or the
//! persistence manager, and returns one reply per command.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Line Parser    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Dispatch     │
//! │  - Execute      │
//! │  - Audit log    │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐      ┌────────────────────┐
//! │ StorageEngine   │<─────│ PersistenceManager │
//! └─────────────────┘      └────────────────────┘
//! ```

pub mod handler;

pub use handler::CommandHandler;
