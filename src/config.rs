//! Server configuration.
//!
//! Every option can be given as a command-line flag or through its
//! environment variable; flags win.

use crate::protocol::DEFAULT_MAX_LINE_LENGTH;
use crate::storage::ExpiryConfig;
use crate::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SNAPSHOT_PATH};
use clap::builder::RangedU64ValueParser;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// linekv - in-memory key-value store with a line-based TCP protocol
#[derive(Parser, Debug, Clone)]
#[command(name = "linekv", version, about, long_about = None)]
pub struct Config {
    /// Host to bind to
    #[arg(long, env = "LINEKV_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "LINEKV_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Snapshot file used by SAVE, LOAD and FLUSH
    #[arg(long, env = "LINEKV_SNAPSHOT", default_value = DEFAULT_SNAPSHOT_PATH)]
    pub snapshot: PathBuf,

    /// Also append plain-text logs to this file
    #[arg(long, env = "LINEKV_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, env = "LINEKV_LOG", default_value = "info")]
    pub log_level: String,

    /// Base interval of the background expiry sweep, in milliseconds
    #[arg(
        long,
        env = "LINEKV_SWEEP_INTERVAL_MS",
        default_value_t = 100,
        value_parser = RangedU64ValueParser::<u64>::new().range(1..)
    )]
    pub sweep_interval_ms: u64,

    /// Longest accepted command line, in bytes
    #[arg(
        long,
        env = "LINEKV_MAX_LINE_LENGTH",
        default_value_t = DEFAULT_MAX_LINE_LENGTH,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub max_line_length: usize,

    /// Write a snapshot when the server shuts down
    #[arg(long, env = "LINEKV_SAVE_ON_SHUTDOWN")]
    pub save_on_shutdown: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            snapshot: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            log_file: None,
            log_level: "info".to_string(),
            sweep_interval_ms: 100,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            save_on_shutdown: false,
        }
    }
}

impl Config {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Sweeper settings derived from `--sweep-interval-ms`.
    pub fn expiry_config(&self) -> ExpiryConfig {
        ExpiryConfig::with_base_interval(self.sweep_interval())
    }
}
