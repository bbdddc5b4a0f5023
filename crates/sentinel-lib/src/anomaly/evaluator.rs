//! Threshold evaluation
//!
//! Turns a utilization sample into zero or more anomaly candidates. Each
//! metric is judged independently, so one sample may yield CPU, RAM and DISK
//! candidates at once. Evaluation is pure: no I/O, no state.

use crate::models::{AnomalyCandidate, DiskUsage, MetricKind, Sample};

/// Default utilization threshold in percent
pub const DEFAULT_THRESHOLD_PCT: f64 = 85.0;

/// Evaluates samples against a single inclusive percentage threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdEvaluator {
    /// Values at or above this percentage are anomalous
    pub threshold_pct: f64,
}

impl ThresholdEvaluator {
    pub fn new(threshold_pct: f64) -> Self {
        Self { threshold_pct }
    }

    /// Evaluate one sample
    ///
    /// # Returns
    /// Candidates in metric order CPU, RAM, DISK. Missing readings produce
    /// nothing for that metric.
    pub fn evaluate(&self, sample: &Sample) -> Vec<AnomalyCandidate> {
        let mut candidates = Vec::new();

        if let Some(cpu) = sample.cpu_pct.filter(|v| self.crosses(*v)) {
            candidates.push(self.candidate(sample, MetricKind::Cpu, cpu, None));
        }

        if let Some(ram) = sample.ram_pct.filter(|v| self.crosses(*v)) {
            candidates.push(self.candidate(sample, MetricKind::Ram, ram, None));
        }

        if sample.provider.reports_per_disk() {
            if let Some(min_used) = min_disk_usage(&sample.disks) {
                if self.crosses(min_used) {
                    candidates.push(self.candidate(
                        sample,
                        MetricKind::Disk,
                        min_used,
                        sanitize_disks(&sample.disks),
                    ));
                }
            }
        }

        candidates
    }

    /// Evaluate samples in order, concatenating their candidates
    pub fn evaluate_batch<'a, I>(&self, samples: I) -> Vec<AnomalyCandidate>
    where
        I: IntoIterator<Item = &'a Sample>,
    {
        samples
            .into_iter()
            .flat_map(|sample| self.evaluate(sample))
            .collect()
    }

    fn crosses(&self, value: f64) -> bool {
        value >= self.threshold_pct
    }

    fn candidate(
        &self,
        sample: &Sample,
        metric: MetricKind,
        value_pct: f64,
        disks: Option<Vec<DiskUsage>>,
    ) -> AnomalyCandidate {
        AnomalyCandidate {
            provider: sample.provider,
            vm_name: sample.vm_name.clone(),
            vm_id: sample.vm_id.clone(),
            metric,
            value_pct,
            threshold_pct: self.threshold_pct,
            env: sample.env.clone(),
            at: sample.at,
            disks,
        }
    }
}

impl Default for ThresholdEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_PCT)
    }
}

/// Evaluate one sample against `threshold_pct`
pub fn evaluate(sample: &Sample, threshold_pct: f64) -> Vec<AnomalyCandidate> {
    ThresholdEvaluator::new(threshold_pct).evaluate(sample)
}

/// Evaluate a batch of samples against `threshold_pct`, preserving input order
pub fn evaluate_batch(samples: &[Sample], threshold_pct: f64) -> Vec<AnomalyCandidate> {
    ThresholdEvaluator::new(threshold_pct).evaluate_batch(samples)
}

/// Lowest reported `used_pct`; a disk under pressure alone is not an anomaly
fn min_disk_usage(disks: &[DiskUsage]) -> Option<f64> {
    disks
        .iter()
        .filter_map(|d| d.used_pct)
        .fold(None, |min, used| match min {
            Some(m) if m <= used => Some(m),
            _ => Some(used),
        })
}

/// Drop readings that carry no fields at all
fn sanitize_disks(disks: &[DiskUsage]) -> Option<Vec<DiskUsage>> {
    let kept: Vec<DiskUsage> = disks
        .iter()
        .filter(|d| d.used_pct.is_some() || d.size_gib.is_some())
        .cloned()
        .collect();

    if kept.is_empty() {
        None
    } else {
        Some(kept)
    }
}
