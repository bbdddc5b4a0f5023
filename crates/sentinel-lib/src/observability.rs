//! Observability infrastructure for the sentinel
//!
//! Provides:
//! - Prometheus metrics (pass latency, decision counters, active notifications)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

use crate::models::{Notification, ReconciliationReport};

/// Histogram buckets for reconciliation pass latency (in seconds)
const PASS_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SentinelMetricsInner> = OnceLock::new();

struct SentinelMetricsInner {
    pass_latency_seconds: Histogram,
    decisions: IntCounterVec,
    active_notifications: IntGauge,
    candidates_evaluated: IntCounter,
    candidates_rejected: IntCounter,
    passes_failed: IntCounter,
    passes_skipped: IntCounter,
}

impl SentinelMetricsInner {
    fn new() -> Self {
        Self {
            pass_latency_seconds: register_histogram!(
                "vm_sentinel_reconcile_latency_seconds",
                "Time spent on one sample-evaluate-reconcile pass",
                PASS_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register reconcile_latency_seconds"),

            decisions: register_int_counter_vec!(
                "vm_sentinel_notification_decisions_total",
                "Reconciliation decisions by kind",
                &["decision"]
            )
            .expect("Failed to register notification_decisions_total"),

            active_notifications: register_int_gauge!(
                "vm_sentinel_active_notifications",
                "Notifications currently OPEN or ACK"
            )
            .expect("Failed to register active_notifications"),

            candidates_evaluated: register_int_counter!(
                "vm_sentinel_candidates_evaluated_total",
                "Anomaly candidates produced by the threshold evaluator"
            )
            .expect("Failed to register candidates_evaluated_total"),

            candidates_rejected: register_int_counter!(
                "vm_sentinel_candidates_rejected_total",
                "Anomaly candidates dropped by validation"
            )
            .expect("Failed to register candidates_rejected_total"),

            passes_failed: register_int_counter!(
                "vm_sentinel_passes_failed_total",
                "Reconciliation passes that rolled back"
            )
            .expect("Failed to register passes_failed_total"),

            passes_skipped: register_int_counter!(
                "vm_sentinel_passes_skipped_total",
                "Scheduled ticks dropped because a pass was running or the tick was late"
            )
            .expect("Failed to register passes_skipped_total"),
        }
    }
}

/// Sentinel metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance. Clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct SentinelMetrics {
    _private: (),
}

impl Default for SentinelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SentinelMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SentinelMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SentinelMetricsInner {
        GLOBAL_METRICS.get_or_init(SentinelMetricsInner::new)
    }

    pub fn observe_pass_latency(&self, duration_secs: f64) {
        self.inner().pass_latency_seconds.observe(duration_secs);
    }

    /// Add the decision counts of a committed pass
    pub fn record_report(&self, report: &ReconciliationReport) {
        let decisions = &self.inner().decisions;
        decisions.with_label_values(&["created"]).inc_by(report.created as u64);
        decisions.with_label_values(&["updated"]).inc_by(report.updated as u64);
        decisions.with_label_values(&["cleared"]).inc_by(report.cleared as u64);
        decisions.with_label_values(&["preserved"]).inc_by(report.preserved as u64);
        decisions.with_label_values(&["suppressed"]).inc_by(report.suppressed as u64);
        self.inner().candidates_rejected.inc_by(report.rejected as u64);
    }

    pub fn set_active_notifications(&self, count: i64) {
        self.inner().active_notifications.set(count);
    }

    pub fn add_candidates_evaluated(&self, count: usize) {
        self.inner().candidates_evaluated.inc_by(count as u64);
    }

    pub fn inc_passes_failed(&self) {
        self.inner().passes_failed.inc();
    }

    pub fn inc_passes_skipped(&self) {
        self.inner().passes_skipped.inc();
    }
}

/// Structured logger for notification lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_created(&self, notification: &Notification) {
        warn!(
            event = "notification_created",
            instance = %self.instance,
            notification_id = notification.id,
            provider = %notification.provider,
            vm_name = %notification.vm_name,
            metric = %notification.metric,
            value_pct = notification.value_pct,
            threshold_pct = notification.threshold_pct,
            dedupe_key = %notification.dedupe_key,
            "Resource anomaly opened"
        );
    }

    pub fn log_updated(&self, notification: &Notification, previous_value_pct: f64) {
        info!(
            event = "notification_updated",
            instance = %self.instance,
            notification_id = notification.id,
            provider = %notification.provider,
            vm_name = %notification.vm_name,
            metric = %notification.metric,
            previous_value_pct = previous_value_pct,
            value_pct = notification.value_pct,
            status = %notification.status,
            "Resource anomaly refreshed"
        );
    }

    pub fn log_cleared(&self, notification: &Notification) {
        info!(
            event = "notification_cleared",
            instance = %self.instance,
            notification_id = notification.id,
            provider = %notification.provider,
            vm_name = %notification.vm_name,
            metric = %notification.metric,
            acknowledged = notification.ack_by.is_some(),
            "Resource anomaly cleared"
        );
    }

    pub fn log_acknowledged(&self, notification: &Notification) {
        info!(
            event = "notification_acknowledged",
            instance = %self.instance,
            notification_id = notification.id,
            ack_by = ?notification.ack_by,
            "Notification acknowledged"
        );
    }

    pub fn log_pass_completed(
        &self,
        samples: usize,
        candidates: usize,
        report: &ReconciliationReport,
        elapsed_ms: u128,
    ) {
        info!(
            event = "reconcile_completed",
            instance = %self.instance,
            samples = samples,
            candidates = candidates,
            created = report.created,
            updated = report.updated,
            cleared = report.cleared,
            preserved = report.preserved,
            rejected = report.rejected,
            suppressed = report.suppressed,
            elapsed_ms = elapsed_ms,
            "Reconciliation pass committed"
        );
    }

    pub fn log_pass_failed(&self, reason: &str) {
        error!(
            event = "reconcile_failed",
            instance = %self.instance,
            reason = %reason,
            "Reconciliation pass rolled back, retrying on next tick"
        );
    }

    pub fn log_pass_skipped(&self, job: &str, reason: &str) {
        warn!(
            event = "reconcile_skipped",
            instance = %self.instance,
            job = %job,
            reason = %reason,
            "Scheduled pass skipped"
        );
    }

    pub fn log_startup(&self, version: &str, threshold_pct: f64) {
        info!(
            event = "sentinel_started",
            instance = %self.instance,
            version = %version,
            threshold_pct = threshold_pct,
            "VM sentinel started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "sentinel_shutdown",
            instance = %self.instance,
            reason = %reason,
            "VM sentinel shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_metrics_handles_share_registry() {
        let metrics = SentinelMetrics::new();
        let other = metrics.clone();

        let report = ReconciliationReport {
            created: 2,
            cleared: 1,
            ..Default::default()
        };
        metrics.record_report(&report);
        other.observe_pass_latency(0.02);
        other.set_active_notifications(3);
        other.add_candidates_evaluated(4);
        other.inc_passes_skipped();

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "vm_sentinel_notification_decisions_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("sentinel-1");
        assert_eq!(logger.instance, "sentinel-1");
    }
}
