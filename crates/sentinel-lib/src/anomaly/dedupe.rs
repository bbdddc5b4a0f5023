//! Hour-bucketed dedupe keys
//!
//! The key gives the store a natural unique constraint so that two creators
//! racing on the same VM, metric and clock hour produce a single row. It does
//! not decide whether an existing notification gets updated.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};

use crate::error::{Result, SentinelError};
use crate::models::{AnomalyCandidate, MetricKind, Provider};

/// Truncate a timestamp to the start of its hour
pub fn floor_to_hour(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(TimeDelta::hours(1)).unwrap_or(at)
}

/// `provider:vm_name:metric:YYYY-MM-DDTHH`, provider and metric lowercased
pub fn dedupe_key(
    provider: Provider,
    vm_name: &str,
    metric: MetricKind,
    at: DateTime<Utc>,
) -> String {
    format!(
        "{}:{}:{}:{}",
        provider.as_str().to_lowercase(),
        vm_name,
        metric.as_str().to_lowercase(),
        floor_to_hour(at).format("%Y-%m-%dT%H")
    )
}

/// Dedupe key for a candidate, rejecting candidates without a usable VM name
pub fn candidate_key(candidate: &AnomalyCandidate) -> Result<String> {
    if candidate.vm_name.trim().is_empty() {
        return Err(SentinelError::Validation(format!(
            "{} {} candidate has an empty vm_name",
            candidate.provider, candidate.metric
        )));
    }
    Ok(dedupe_key(
        candidate.provider,
        &candidate.vm_name,
        candidate.metric,
        candidate.at,
    ))
}
