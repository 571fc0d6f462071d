//! sessionkit - command-line client for token-authenticated APIs.
//!
//! Restores the saved session on every run, then executes one command
//! (sign in, inspect, refresh, call an endpoint, check a route).

mod cli;
mod commands;

use std::io;

use anyhow::Result;
use clap::Parser;
use sessionkit_core::ClientConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::Cli;

/// Initialize the tracing subscriber for logging.
/// The returned guard flushes buffered log lines when dropped.
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=sessionkit_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();
    let cli = Cli::parse();

    let mut config = ClientConfig::load()?;
    if let Some(ref url) = cli.api_url {
        config.api_base_url = url.clone();
    }

    let manager = config.connect()?;
    commands::run(cli, manager).await
}
