//! Named job locks
//!
//! Guarantees at most one run per job name is in flight. Acquisition never
//! waits: a caller that finds the job busy skips instead of queueing.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of per-job mutexes, shared by the scheduler and manual triggers
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Held for the duration of one job run; released on drop
#[derive(Debug)]
pub struct JobGuard {
    name: String,
    _guard: OwnedMutexGuard<()>,
}

impl JobGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the job lock if nobody holds it
    pub fn try_acquire(&self, name: &str) -> Option<JobGuard> {
        let lock = self
            .locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        lock.try_lock_owned().ok().map(|guard| JobGuard {
            name: name.to_string(),
            _guard: guard,
        })
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.locks
            .get(name)
            .is_some_and(|lock| lock.try_lock().is_err())
    }
}
