//! linekv - An In-Memory Key-Value Server
//!
//! This is the main entry point for the linekv server.
//! It reads the configuration, sets up logging, starts the expiry sweeper and
//! serves clients until Ctrl+C.

use anyhow::Context;
use clap::Parser;
use linekv::config::Config;
use linekv::server::Server;
use linekv::storage::ExpirySweeper;
use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the stdout log layer and, with `--log-file`, an append-mode file layer.
///
/// `RUST_LOG` wins over `--log-level` when set.
fn init_logging(config: &Config) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)
            .with_context(|| format!("invalid log level '{}'", config.log_level))?,
    };

    let file_layer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    Ok(())
}

fn print_banner(config: &Config) {
    println!(
        r#"
  _ _            _
 | (_)_ __   ___| | ____   __
 | | | '_ \ / _ \ |/ /\ \ / /
 | | | | | |  __/   <  \ V /
 |_|_|_| |_|\___|_|\_\  \_/

linekv v{} - In-Memory Key-Value Server
──────────────────────────────────────────────
Listening on {}
Snapshot file {}

Try: echo "PING" | nc {} {}
Use Ctrl+C to shutdown gracefully.
"#,
        linekv::VERSION,
        config.bind_address(),
        config.snapshot.display(),
        config.host,
        config.port,
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    init_logging(&config)?;

    let server = Server::from_config(&config);
    info!(
        snapshot = %config.snapshot.display(),
        max_line_length = config.max_line_length,
        "Storage engine initialized"
    );

    let sweeper = ExpirySweeper::start(Arc::clone(server.storage()), config.expiry_config());

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!(address = %config.bind_address(), "Listening");

    print_banner(&config);

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    server.run_until(listener, shutdown).await;
    sweeper.stop();

    if config.save_on_shutdown {
        match server.persistence().save() {
            Ok(entries) => info!(entries, "Final snapshot written"),
            Err(e) => error!(error = %e, "Final snapshot failed"),
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
