//! Anomaly detection for VM utilization samples
//!
//! This module provides:
//! - Threshold evaluation of CPU, RAM and per-disk usage
//! - Hour-bucketed dedupe keys for alert creation

mod dedupe;
mod evaluator;

pub use dedupe::{candidate_key, dedupe_key, floor_to_hour};
pub use evaluator::{evaluate, evaluate_batch, ThresholdEvaluator, DEFAULT_THRESHOLD_PCT};
