//! TCP server: shared state wiring and the accept loop.
//!
//! One [`Server`] owns the store, the persistence manager and the connection
//! counters. Every accepted client runs in its own task against those shared
//! handles.

use crate::commands::CommandHandler;
use crate::config::Config;
use crate::connection::{handle_connection, ConnectionStats};
use crate::persistence::PersistenceManager;
use crate::protocol::DEFAULT_MAX_LINE_LENGTH;
use crate::storage::StorageEngine;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// The key-value server.
#[derive(Clone)]
pub struct Server {
    storage: Arc<StorageEngine>,
    persistence: Arc<PersistenceManager>,
    stats: Arc<ConnectionStats>,
    max_line_length: usize,
}

impl Server {
    /// Creates a server with an empty store backed by `snapshot_path`.
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Self {
        let storage = Arc::new(StorageEngine::new());
        let persistence = Arc::new(PersistenceManager::new(
            Arc::clone(&storage),
            snapshot_path,
        ));

        Self {
            storage,
            persistence,
            stats: Arc::new(ConnectionStats::new()),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.snapshot.clone()).with_max_line_length(config.max_line_length)
    }

    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    pub fn persistence(&self) -> &Arc<PersistenceManager> {
        &self.persistence
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    /// A command handler bound to this server's shared state.
    pub fn command_handler(&self) -> CommandHandler {
        CommandHandler::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.persistence),
            Arc::clone(&self.stats),
        )
    }

    /// Accepts connections until `shutdown` completes.
    ///
    /// Connections already being served keep running in their own tasks.
    pub async fn run_until<F>(&self, listener: TcpListener, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = self.accept_loop(listener) => {}
            _ = shutdown => {
                info!("Shutdown signal received, no longer accepting connections");
            }
        }
    }

    /// Main loop that accepts incoming connections
    pub async fn accept_loop(&self, listener: TcpListener) {
        let handler = self.command_handler();

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let handler = handler.clone();
                    let stats = Arc::clone(&self.stats);
                    let max_line_length = self.max_line_length;

                    tokio::spawn(async move {
                        handle_connection(stream, addr, handler, stats, max_line_length).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}
