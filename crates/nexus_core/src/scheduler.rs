//! Repeating asynchronous timers for periodic jobs.
//!
//! Cache refreshes, heartbeat publication and expiry sweeps all run as named
//! repeating tasks on the worker pool. Cancellation is synchronous and
//! idempotent; modules rely on that for clean disable semantics.

use crate::error::CoreError;
use dashmap::DashMap;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Schedules and owns named repeating tasks.
#[derive(Default)]
pub struct Scheduler {
    tasks: DashMap<String, JoinHandle<()>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
        }
    }

    /// Spawns a repeating task under `name`, firing every `interval`.
    ///
    /// A failing tick logs and terminates that tick only; the timer stays
    /// alive. If a task already runs under this name the new one is
    /// rejected (cancel first to reschedule).
    pub fn spawn_repeating<F, Fut>(&self, name: &str, interval: Duration, task: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        if self.tasks.contains_key(name) {
            warn!(name, "repeating task already scheduled, ignoring");
            return;
        }

        let task_name = name.to_string();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The immediate first tick would race module enable order; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = task().await {
                    warn!(name = %task_name, error = %e, "repeating task tick failed");
                }
            }
        });

        self.tasks.insert(name.to_string(), handle);
        info!(name, interval_ms = interval.as_millis() as u64, "repeating task scheduled");
    }

    /// Cancels the task under `name`. No-op if nothing runs under it.
    /// Returns whether a task was actually cancelled.
    pub fn cancel(&self, name: &str) -> bool {
        match self.tasks.remove(name) {
            Some((_, handle)) => {
                handle.abort();
                info!(name, "repeating task cancelled");
                true
            }
            None => {
                debug!(name, "cancel on unscheduled task, no-op");
                false
            }
        }
    }

    /// Whether a task currently runs under `name`.
    pub fn is_scheduled(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Cancels everything. Used at process shutdown.
    pub fn cancel_all(&self) {
        let names: Vec<String> = self.tasks.iter().map(|e| e.key().clone()).collect();
        for name in names {
            self.cancel(&name);
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for entry in self.tasks.iter() {
            entry.value().abort();
        }
    }
}
