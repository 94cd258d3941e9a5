//! TCP Server
//!
//! Accepts connections and gives each one its own session task. Also hosts
//! the stats reporter, which is the only periodic task that needs to see
//! connection-level state.

use crate::commands::CommandHandler;
use crate::session::{handle_connection, ConnectionStats};
use crate::storage::Store;
use crate::task::Task;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error};

/// Accepts connections until the surrounding task is cancelled.
///
/// A failed accept is logged and the loop keeps going.
pub async fn accept_loop(listener: TcpListener, store: Arc<Store>, stats: Arc<ConnectionStats>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let handler = CommandHandler::new(Arc::clone(&store));
                let stats = Arc::clone(&stats);

                tokio::spawn(handle_connection(stream, addr, handler, stats));
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}

/// Builds the task that periodically logs store and connection statistics.
pub fn stats_task(interval: Duration, stats: Arc<ConnectionStats>) -> Task {
    Task::new("stats-reporter", interval, move |store| {
        let storage = store.stats();
        debug!(
            keys = storage.keys,
            get_ops = storage.get_ops,
            set_ops = storage.set_ops,
            del_ops = storage.del_ops,
            expired = storage.expired,
            connections_accepted = stats.connections_accepted.load(Ordering::Relaxed),
            active_connections = stats.active_connections.load(Ordering::Relaxed),
            commands_processed = stats.commands_processed.load(Ordering::Relaxed),
            bytes_read = stats.bytes_read.load(Ordering::Relaxed),
            bytes_written = stats.bytes_written.load(Ordering::Relaxed),
            "Server statistics"
        );
    })
}
