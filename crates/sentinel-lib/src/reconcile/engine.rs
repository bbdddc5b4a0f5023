//! Diff-based reconciliation of anomaly candidates against active notifications

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, warn};

use crate::anomaly::candidate_key;
use crate::error::{Result, SentinelError, StoreError};
use crate::models::{
    AnomalyCandidate, AuditAction, MatchKey, NewNotification, Notification, NotificationStatus,
    ReconciliationReport,
};
use crate::observability::StructuredLogger;
use crate::store::{NotificationStore, StoreTransaction};

/// Default bound on every individual store call
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(30);

/// Reconciler configuration
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Upper bound for each store or audit call; expiry fails the whole pass
    pub store_timeout: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

/// Change applied during a pass, logged only once the pass commits
enum Change {
    Created(Notification),
    Updated(Notification, f64),
    Cleared(Notification),
}

/// Applies the notification state machine to a batch of candidates
///
/// Each call to [`Reconciler::reconcile`] or [`Reconciler::acknowledge`] runs
/// inside one store transaction. Either every mutation and its audit row
/// commits, or none of them do.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn NotificationStore>,
    config: ReconcileConfig,
    logger: StructuredLogger,
}

impl Reconciler {
    pub fn new(store: Arc<dyn NotificationStore>, config: ReconcileConfig) -> Self {
        Self {
            store,
            config,
            logger: StructuredLogger::new("reconciler"),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        &self.store
    }

    /// Reconcile the current candidates against the active notifications
    ///
    /// # Arguments
    /// * `candidates` - Current truth from the evaluator, in observation order
    /// * `now` - Pass timestamp, used for `created_at` and `cleared_at`
    ///
    /// # Returns
    /// Per-decision counts and ids, in processing order. Candidates that fail
    /// validation are counted in `rejected` and skipped; any store failure
    /// rolls the whole pass back and is returned as an error.
    pub async fn reconcile(
        &self,
        candidates: &[AnomalyCandidate],
        now: DateTime<Utc>,
    ) -> Result<ReconciliationReport> {
        let mut report = ReconciliationReport::default();

        // Last candidate per identity wins; identities keep first-seen order
        let mut order: Vec<MatchKey> = Vec::new();
        let mut current: HashMap<MatchKey, (&AnomalyCandidate, String)> = HashMap::new();
        for candidate in candidates {
            let dedupe = match candidate_key(candidate) {
                Ok(key) => key,
                Err(e) => {
                    warn!(error = %e, "Skipping invalid anomaly candidate");
                    report.record_rejected();
                    continue;
                }
            };
            let identity = candidate.match_key();
            if current.insert(identity.clone(), (candidate, dedupe)).is_none() {
                order.push(identity);
            }
        }

        let mut tx = self.timed("begin", self.store.begin()).await?;

        let mut active = self.timed("list_active", tx.list_active()).await?;
        active.sort_by_key(|n| n.id);

        let mut prior: HashMap<MatchKey, Notification> = HashMap::new();
        let mut orphans: Vec<Notification> = Vec::new();
        for notification in active {
            match prior.entry(notification.match_key()) {
                Entry::Vacant(slot) => {
                    slot.insert(notification);
                }
                Entry::Occupied(slot) => {
                    warn!(
                        identity = %slot.key(),
                        kept_id = slot.get().id,
                        extra_id = notification.id,
                        "More than one active notification for identity, clearing the newer"
                    );
                    orphans.push(notification);
                }
            }
        }

        let mut changes = Vec::new();

        for identity in &order {
            let Some((candidate, dedupe)) = current.get(identity) else {
                continue;
            };
            match prior.remove(identity) {
                Some(existing) => {
                    self.refresh(tx.as_mut(), existing, candidate, now, &mut report, &mut changes)
                        .await?;
                }
                None => {
                    self.open(tx.as_mut(), candidate, dedupe, now, &mut report, &mut changes)
                        .await?;
                }
            }
        }

        orphans.extend(prior.into_values());
        orphans.sort_by_key(|n| n.id);
        for notification in orphans {
            self.clear(tx.as_mut(), notification, now, &mut report, &mut changes)
                .await?;
        }

        self.timed("commit", tx.commit()).await?;

        for change in &changes {
            match change {
                Change::Created(n) => self.logger.log_created(n),
                Change::Updated(n, previous) => self.logger.log_updated(n, *previous),
                Change::Cleared(n) => self.logger.log_cleared(n),
            }
        }

        debug!(
            created = report.created,
            updated = report.updated,
            cleared = report.cleared,
            preserved = report.preserved,
            rejected = report.rejected,
            suppressed = report.suppressed,
            "Reconciliation committed"
        );

        Ok(report)
    }

    /// Transition an OPEN notification to ACK
    ///
    /// # Errors
    /// * `Validation` when `by` is blank
    /// * `NotFound` for an unknown id
    /// * `Conflict` when the notification is already ACK or CLEARED
    pub async fn acknowledge(&self, id: i64, by: &str, now: DateTime<Utc>) -> Result<Notification> {
        let by = by.trim();
        if by.is_empty() {
            return Err(SentinelError::Validation(
                "acknowledger identity must not be empty".to_string(),
            ));
        }

        let mut tx = self.timed("begin", self.store.begin()).await?;
        let mut notification = self
            .timed("get", tx.get(id))
            .await?
            .ok_or(SentinelError::NotFound(id))?;

        if notification.status != NotificationStatus::Open {
            return Err(SentinelError::Conflict {
                id,
                status: notification.status,
            });
        }

        notification.status = NotificationStatus::Ack;
        notification.ack_by = Some(by.to_string());
        notification.ack_at = Some(now);

        self.timed("update", tx.update(&notification)).await?;
        self.timed(
            "audit",
            tx.append(
                AuditAction::NotificationAcknowledged,
                id,
                json!({ "ack_by": by }),
                now,
            ),
        )
        .await?;
        self.timed("commit", tx.commit()).await?;

        self.logger.log_acknowledged(&notification);
        Ok(notification)
    }

    async fn open(
        &self,
        tx: &mut dyn StoreTransaction,
        candidate: &AnomalyCandidate,
        dedupe: &str,
        now: DateTime<Utc>,
        report: &mut ReconciliationReport,
        changes: &mut Vec<Change>,
    ) -> Result<()> {
        let new = NewNotification {
            provider: candidate.provider,
            vm_id: candidate.vm_id.clone(),
            vm_name: candidate.vm_name.clone(),
            metric: candidate.metric,
            value_pct: candidate.value_pct,
            threshold_pct: candidate.threshold_pct,
            env: candidate.env.clone(),
            at: candidate.at,
            created_at: now,
            disks: candidate.disks.clone(),
            dedupe_key: dedupe.to_string(),
        };

        let (row, created) = self.timed("insert", tx.insert(new)).await?;

        if created {
            self.timed(
                "audit",
                tx.append(
                    AuditAction::NotificationCreated,
                    row.id,
                    json!({
                        "provider": row.provider,
                        "vm_name": row.vm_name,
                        "metric": row.metric,
                        "value_pct": row.value_pct,
                        "threshold_pct": row.threshold_pct,
                        "dedupe_key": row.dedupe_key,
                    }),
                    now,
                ),
            )
            .await?;
            report.record_created(row.id);
            changes.push(Change::Created(row));
        } else if row.is_active() {
            // Another writer won the dedupe key; its row is authoritative
            debug!(notification_id = row.id, dedupe_key = %dedupe, "Insert lost dedupe race");
            self.refresh(tx, row, candidate, now, report, changes).await?;
        } else {
            warn!(
                notification_id = row.id,
                dedupe_key = %dedupe,
                "Anomaly recurred within the hour it was cleared, keeping the cleared row"
            );
            report.record_suppressed(row.id);
        }
        Ok(())
    }

    async fn refresh(
        &self,
        tx: &mut dyn StoreTransaction,
        mut existing: Notification,
        candidate: &AnomalyCandidate,
        now: DateTime<Utc>,
        report: &mut ReconciliationReport,
        changes: &mut Vec<Change>,
    ) -> Result<()> {
        if existing.value_pct == candidate.value_pct && existing.disks == candidate.disks {
            report.record_preserved(existing.id);
            return Ok(());
        }

        let previous = json!({
            "value_pct": existing.value_pct,
            "threshold_pct": existing.threshold_pct,
            "env": existing.env,
            "at": existing.at,
            "disks": existing.disks,
        });
        let previous_value = existing.value_pct;

        existing.value_pct = candidate.value_pct;
        existing.threshold_pct = candidate.threshold_pct;
        existing.env = candidate.env.clone();
        existing.at = candidate.at;
        existing.disks = candidate.disks.clone();

        self.timed("update", tx.update(&existing)).await?;
        self.timed(
            "audit",
            tx.append(
                AuditAction::NotificationUpdated,
                existing.id,
                json!({
                    "old": previous,
                    "new": {
                        "value_pct": existing.value_pct,
                        "threshold_pct": existing.threshold_pct,
                        "env": existing.env,
                        "at": existing.at,
                        "disks": existing.disks,
                    },
                }),
                now,
            ),
        )
        .await?;

        report.record_updated(existing.id);
        changes.push(Change::Updated(existing, previous_value));
        Ok(())
    }

    async fn clear(
        &self,
        tx: &mut dyn StoreTransaction,
        mut existing: Notification,
        now: DateTime<Utc>,
        report: &mut ReconciliationReport,
        changes: &mut Vec<Change>,
    ) -> Result<()> {
        let previous_status = existing.status;
        existing.status = NotificationStatus::Cleared;
        existing.cleared_at = Some(now);

        self.timed("update", tx.update(&existing)).await?;
        self.timed(
            "audit",
            tx.append(
                AuditAction::NotificationCleared,
                existing.id,
                json!({
                    "previous_status": previous_status,
                    "value_pct": existing.value_pct,
                    "cleared_at": now,
                }),
                now,
            ),
        )
        .await?;

        report.record_cleared(existing.id);
        changes.push(Change::Cleared(existing));
        Ok(())
    }

    /// Run one store call under the configured timeout
    async fn timed<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.config.store_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(SentinelError::Timeout {
                operation,
                elapsed: self.config.store_timeout,
            }),
        }
    }
}
