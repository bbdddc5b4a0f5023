//! Scheduling loop driving the reconcile job on wall-clock ticks

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::{is_misfire, ReconcileJob, Schedule, DEFAULT_MISFIRE_GRACE};

/// Configuration for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub schedule: Schedule,
    /// Ticks fired later than this are dropped, not caught up
    pub misfire_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            schedule: Schedule::Hourly,
            misfire_grace: DEFAULT_MISFIRE_GRACE,
        }
    }
}

/// Fires the reconcile job on schedule until shutdown
///
/// Only the next fire time is ever tracked, so ticks missed while a pass ran
/// long or the process was suspended collapse into nothing.
pub struct Scheduler {
    job: Arc<ReconcileJob>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(job: Arc<ReconcileJob>, config: SchedulerConfig) -> Self {
        Self { job, config }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            schedule = %self.config.schedule,
            misfire_grace_secs = self.config.misfire_grace.as_secs(),
            "Starting reconciliation scheduler"
        );

        loop {
            let now = Utc::now();
            let fire_at = self.config.schedule.next_after(now);
            let wait = (fire_at - now).to_std().unwrap_or_default();

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    let fired = Utc::now();
                    if is_misfire(fire_at, fired, self.config.misfire_grace) {
                        self.job.record_skip("tick missed its grace period");
                        continue;
                    }
                    if let Err(e) = self.job.try_run(fired).await {
                        warn!(error = %e, transient = e.is_transient(), "Scheduled pass failed");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down reconciliation scheduler");
                    break;
                }
            }
        }
    }
}
