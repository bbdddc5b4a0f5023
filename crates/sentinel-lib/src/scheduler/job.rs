//! The sample-evaluate-reconcile job

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::JobRegistry;
use crate::anomaly::ThresholdEvaluator;
use crate::error::{Result, SentinelError, StoreError};
use crate::health::{components, HealthRegistry};
use crate::models::{NotificationStatus, ReconciliationReport, Sample};
use crate::observability::{SentinelMetrics, StructuredLogger};
use crate::reconcile::Reconciler;
use crate::sampler::Sampler;
use crate::store::NotificationFilter;

/// Lock name shared by scheduled and manual passes
pub const SCAN_JOB: &str = "notifications_scan";

/// What one committed pass saw and did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub samples: usize,
    pub candidates: usize,
    pub rejected: usize,
    pub report: ReconciliationReport,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// One full pass over every sampler
pub struct ReconcileJob {
    samplers: Vec<Arc<dyn Sampler>>,
    evaluator: ThresholdEvaluator,
    reconciler: Reconciler,
    locks: JobRegistry,
    health: HealthRegistry,
    metrics: SentinelMetrics,
    logger: StructuredLogger,
    refresh: bool,
}

impl ReconcileJob {
    pub fn new(
        samplers: Vec<Arc<dyn Sampler>>,
        evaluator: ThresholdEvaluator,
        reconciler: Reconciler,
        locks: JobRegistry,
        health: HealthRegistry,
    ) -> Self {
        Self {
            samplers,
            evaluator,
            reconciler,
            locks,
            health,
            metrics: SentinelMetrics::new(),
            logger: StructuredLogger::new("scheduler"),
            refresh: true,
        }
    }

    /// Whether samplers are asked to re-read their sources every pass
    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn is_running(&self) -> bool {
        self.locks.is_running(SCAN_JOB)
    }

    pub(crate) fn record_skip(&self, reason: &str) {
        self.metrics.inc_passes_skipped();
        self.logger.log_pass_skipped(SCAN_JOB, reason);
    }

    /// Run one pass unless another is already in flight
    ///
    /// # Returns
    /// `Ok(None)` when the job lock is held elsewhere. Errors leave the
    /// store untouched; the next tick retries.
    pub async fn try_run(&self, now: DateTime<Utc>) -> Result<Option<ScanSummary>> {
        let Some(_guard) = self.locks.try_acquire(SCAN_JOB) else {
            self.record_skip("previous pass still running");
            return Ok(None);
        };

        let started = Instant::now();
        let outcome = self.run_locked(now).await;
        let elapsed = started.elapsed();
        self.metrics.observe_pass_latency(elapsed.as_secs_f64());

        match outcome {
            Ok(summary) => {
                self.metrics.add_candidates_evaluated(summary.candidates);
                self.metrics.record_report(&summary.report);
                self.logger.log_pass_completed(
                    summary.samples,
                    summary.candidates,
                    &summary.report,
                    elapsed.as_millis(),
                );
                self.health.set_healthy(components::SCHEDULER).await;
                self.health.set_healthy(components::STORE).await;
                self.refresh_active_gauge().await;
                Ok(Some(summary))
            }
            Err(e) => {
                self.metrics.inc_passes_failed();
                self.logger.log_pass_failed(&e.to_string());
                self.health
                    .set_degraded(components::SCHEDULER, e.to_string())
                    .await;
                match &e {
                    // The snapshot could not be written; nothing will commit until fixed
                    SentinelError::Store(StoreError::Io(_) | StoreError::Json(_)) => {
                        self.health.set_unhealthy(components::STORE, e.to_string()).await;
                    }
                    SentinelError::Store(_) | SentinelError::Timeout { .. } => {
                        self.health.set_degraded(components::STORE, e.to_string()).await;
                    }
                    _ => {}
                }
                Err(e)
            }
        }
    }

    async fn run_locked(&self, now: DateTime<Utc>) -> Result<ScanSummary> {
        let samples = self.collect().await?;
        let candidates = self.evaluator.evaluate_batch(&samples);
        debug!(
            samples = samples.len(),
            candidates = candidates.len(),
            threshold_pct = self.evaluator.threshold_pct,
            "Evaluated samples"
        );

        let report = self.reconciler.reconcile(&candidates, now).await?;

        Ok(ScanSummary {
            samples: samples.len(),
            candidates: candidates.len(),
            rejected: report.rejected,
            report,
            started_at: now,
            finished_at: Utc::now(),
        })
    }

    /// Gather every provider's batch; any failure aborts the pass
    ///
    /// Reconciling a partial batch would clear live alerts of the provider
    /// that failed to report.
    async fn collect(&self) -> Result<Vec<Sample>> {
        let mut samples = Vec::new();
        for sampler in &self.samplers {
            let provider = sampler.provider();
            match sampler.collect_samples(self.refresh).await {
                Ok(batch) => {
                    debug!(provider = %provider, samples = batch.len(), "Collected samples");
                    samples.extend(batch);
                }
                Err(e) => {
                    let message = format!("{e:#}");
                    self.health
                        .set_degraded(components::SAMPLER, format!("{provider}: {message}"))
                        .await;
                    return Err(SentinelError::Sampler {
                        provider: provider.to_string(),
                        message,
                    });
                }
            }
        }
        self.health.set_healthy(components::SAMPLER).await;
        Ok(samples)
    }

    async fn refresh_active_gauge(&self) {
        let store = self.reconciler.store();
        let mut active = 0;
        for status in [NotificationStatus::Open, NotificationStatus::Ack] {
            let filter = NotificationFilter {
                status: Some(status),
                include_archived: true,
                limit: Some(1),
                ..Default::default()
            };
            match store.list(&filter).await {
                Ok(page) => active += page.total,
                Err(e) => {
                    warn!(error = %e, "Could not count active notifications");
                    return;
                }
            }
        }
        self.metrics.set_active_notifications(active as i64);
    }
}
