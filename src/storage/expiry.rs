//! Active Expiry
//!
//! Lazy expiry (checking on access) is cheap, but a key that expires and is
//! never touched again would stay in memory forever. The sweep runs as a
//! periodic [`Task`] and reaps those keys.
//!
//! ## Design
//!
//! Each run:
//! 1. Takes a snapshot of the keys whose expiry has passed
//! 2. Touches each one through an expiry-aware read, which reaps it
//! 3. Logs how many keys were removed
//!
//! Going through the regular read path means a key that was replaced by a
//! fresh SET between the snapshot and the reap is left alone.

use crate::storage::{Store, KEY_NOT_FOUND};
use crate::task::{Task, TaskHandle};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Reaps every expired key currently in the store.
///
/// # Returns
///
/// Returns the number of keys that were found expired and are now gone.
pub fn sweep_expired(store: &Store) -> usize {
    let candidates = store.expired_keys();
    if candidates.is_empty() {
        return 0;
    }

    let reaped = candidates
        .iter()
        .filter(|key| store.ttl(key) == KEY_NOT_FOUND)
        .count();

    if reaped > 0 {
        debug!(
            expired = reaped,
            keys_remaining = store.len(),
            "Expired keys cleaned up"
        );
    }

    reaped
}

/// Builds the expiry sweep task.
pub fn expiry_task(interval: Duration) -> Task {
    Task::new("expiry-sweep", interval, |store| {
        sweep_expired(store);
    })
}

/// Starts the expiry sweep as a background task.
pub fn start_expiry_sweeper(store: Arc<Store>, interval: Duration) -> TaskHandle {
    expiry_task(interval).start(store)
}
