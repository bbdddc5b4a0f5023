//! Periodic reconciliation
//!
//! This module provides:
//! - A named job lock so at most one pass runs at a time
//! - Hourly or development-cadence schedules with a misfire grace window
//! - The job tying samplers, evaluator and reconciler together

mod job;
mod lock;
mod runner;
mod schedule;

pub use job::{ReconcileJob, ScanSummary, SCAN_JOB};
pub use lock::{JobGuard, JobRegistry};
pub use runner::{Scheduler, SchedulerConfig};
pub use schedule::{is_misfire, Schedule, DEFAULT_MISFIRE_GRACE};
