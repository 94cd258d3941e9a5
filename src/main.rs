//! cider - A Small In-Memory Key-Value Cache
//!
//! This is the main entry point for the cider server.
//! It reads the configuration, starts the periodic tasks and accepts
//! connections until Ctrl+C.

use anyhow::Context;
use cider::config::{Config, Invocation};
use cider::server::{accept_loop, stats_task};
use cider::session::ConnectionStats;
use cider::storage::{start_expiry_sweeper, Store};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn print_help() {
    println!(
        r#"
cider - A small in-memory key-value cache

USAGE:
    cider [OPTIONS]

OPTIONS:
    -h, --host <HOST>              Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>              Port to listen on (default: 6379)
        --sweep-interval <SECS>    Seconds between expiry sweeps, 0 disables (default: 1)
        --stats-interval <SECS>    Seconds between stats reports, 0 disables (default: 60)
    -v, --version                  Print version information
        --help                     Print this help message

ENVIRONMENT:
    CIDER_ADDRESS            host:port to bind to
    CIDER_SWEEP_INTERVAL     Same as --sweep-interval
    CIDER_STATS_INTERVAL     Same as --stats-interval
    RUST_LOG                 Log filter (default: info)

CONNECTING:
    Any line-based TCP client works:
    $ nc 127.0.0.1 6379
    SET name cider
    +OK
    GET name
    $5
    cider
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_env().apply_args(std::env::args().skip(1)) {
        Ok(Invocation::Serve(config)) => config,
        Ok(Invocation::Help) => {
            print_help();
            return Ok(());
        }
        Ok(Invocation::Version) => {
            println!("cider version {}", cider::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // Create the store (shared across all connections)
    let store = Arc::new(Store::new());
    let stats = Arc::new(ConnectionStats::new());

    let _sweeper = config
        .sweep_interval()
        .map(|interval| start_expiry_sweeper(Arc::clone(&store), interval));
    let _reporter = config
        .stats_interval()
        .map(|interval| stats_task(interval, Arc::clone(&stats)).start(Arc::clone(&store)));

    // Bind the TCP listener
    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!(address = %config.bind_address(), version = cider::VERSION, "Listening");

    // Set up graceful shutdown
    let shutdown = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, stopping server..."),
            Err(e) => {
                error!(error = %e, "Failed to listen for Ctrl+C, running until killed");
                std::future::pending::<()>().await;
            }
        }
    };

    // Main accept loop
    tokio::select! {
        _ = accept_loop(listener, store, stats) => {}
        _ = shutdown => {}
    }

    info!("Server shutdown complete");
    Ok(())
}
