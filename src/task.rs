//! Periodic Background Tasks
//!
//! A [`Task`] runs a job against the shared [`Store`] at a fixed interval on
//! the Tokio runtime until it is told to stop. The expiry sweep and the stats
//! reporter are both tasks.
//!
//! ## Lifecycle
//!
//! ```text
//!   Task::new(..).start(store) ──► TaskHandle
//!                                     │
//!          ┌──────────────────────────┤
//!          ▼                          │ stop() / drop
//!   sleep(interval) ──► job(&store)   ▼
//!          ▲               │       shutdown signal
//!          └───────────────┘
//! ```
//!
//! Stopping is checked before every run, so once `stop()` has returned the job
//! is not started again. A run that is already in progress completes.

use crate::storage::Store;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

type Job = Arc<dyn Fn(&Store) + Send + Sync + 'static>;

/// A named job to run periodically.
#[derive(Clone)]
pub struct Task {
    name: &'static str,
    interval: Duration,
    job: Job,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl Task {
    /// Creates a task that calls `job` every `interval`.
    pub fn new<F>(name: &'static str, interval: Duration, job: F) -> Self
    where
        F: Fn(&Store) + Send + Sync + 'static,
    {
        Self {
            name,
            interval,
            job: Arc::new(job),
        }
    }

    /// The task name, used in log output.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Starts the task as a background Tokio task.
    ///
    /// Must be called from within a Tokio runtime. The task stops when the
    /// returned handle is stopped or dropped.
    pub fn start(self, store: Arc<Store>) -> TaskHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let name = self.name;

        info!(task = name, interval_ms = self.interval.as_millis() as u64, "Task started");
        tokio::spawn(run(self, store, shutdown_rx));

        TaskHandle { name, shutdown_tx }
    }
}

/// A handle to a running task.
///
/// When this handle is dropped, the task will be stopped.
#[derive(Debug)]
pub struct TaskHandle {
    name: &'static str,
    shutdown_tx: watch::Sender<bool>,
}

impl TaskHandle {
    /// Signals the task to stop. Safe to call more than once.
    pub fn stop(&self) {
        let already_stopped = self.shutdown_tx.send_replace(true);
        if !already_stopped {
            info!(task = self.name, "Task stopped");
        }
    }

    /// Returns true once `stop` has been called.
    pub fn is_stopped(&self) -> bool {
        *self.shutdown_tx.borrow()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(task: Task, store: Arc<Store>, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            biased;
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!(task = task.name, "Task received shutdown signal");
                    return;
                }
            }
            _ = tokio::time::sleep(task.interval) => {}
        }

        if *shutdown_rx.borrow() {
            return;
        }

        trace!(task = task.name, "Running task");
        (task.job)(store.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_task(interval: Duration) -> (Task, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let task = Task::new("counter", interval, move |_store| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (task, runs)
    }

    #[tokio::test]
    async fn test_task_runs_periodically() {
        let (task, runs) = counting_task(Duration::from_millis(10));
        let handle = task.start(Arc::new(Store::new()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop();

        assert!(runs.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_task_not_run_after_stop() {
        let (task, runs) = counting_task(Duration::from_millis(10));
        let handle = task.start(Arc::new(Store::new()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop();
        assert!(handle.is_stopped());

        // Let an in-flight run settle, then nothing more may happen
        tokio::time::sleep(Duration::from_millis(20)).await;
        let after_stop = runs.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(runs.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn test_task_stops_on_drop() {
        let (task, runs) = counting_task(Duration::from_millis(10));

        {
            let _handle = task.start(Arc::new(Store::new()));
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        let after_drop = runs.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(runs.load(Ordering::SeqCst), after_drop);
    }

    #[tokio::test]
    async fn test_stop_before_first_run() {
        let (task, runs) = counting_task(Duration::from_millis(50));
        let handle = task.start(Arc::new(Store::new()));
        handle.stop();
        handle.stop();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_job_sees_store() {
        let store = Arc::new(Store::new());
        store.set("seen", bytes::Bytes::from("0"), None);

        let task = Task::new("touch", Duration::from_millis(10), |store| {
            let _ = store.incr("seen");
        });
        assert_eq!(task.name(), "touch");

        let handle = task.start(Arc::clone(&store));
        tokio::time::sleep(Duration::from_millis(80)).await;
        drop(handle);

        let (value, _) = store.get("seen").unwrap();
        assert_ne!(&value[..], b"0");
    }
}
