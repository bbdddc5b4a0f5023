//! In-memory notification store with optional JSON snapshot persistence
//!
//! Every committed transaction rewrites the snapshot file atomically (temp
//! file + rename) before the new state becomes visible, so a failed write
//! leaves both the file and the in-memory state unchanged.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use super::{
    AuditFilter, AuditSink, NotificationFilter, NotificationStore, Page, StoreTransaction,
};
use crate::error::StoreError;
use crate::models::{
    AuditAction, AuditEvent, MetricKind, NewNotification, Notification, Provider,
};

/// Everything the store holds; also the on-disk snapshot format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    next_notification_id: i64,
    next_audit_id: i64,
    notifications: BTreeMap<i64, Notification>,
    audit: Vec<AuditEvent>,
}

impl Snapshot {
    fn by_dedupe_key(&self, key: &str) -> Option<&Notification> {
        self.notifications.values().find(|n| n.dedupe_key == key)
    }
}

/// Store backed by process memory
#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<Snapshot>>,
    persistence_path: Option<PathBuf>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create an empty, purely in-memory store
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(Snapshot::default())),
            persistence_path: None,
        }
    }

    /// Create a store persisted to `path`, loading the snapshot if present
    pub fn with_persistence(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let snapshot = if path.exists() {
            load_snapshot(&path)?
        } else {
            Snapshot::default()
        };

        info!(
            path = %path.display(),
            notifications = snapshot.notifications.len(),
            audit_events = snapshot.audit.len(),
            "Loaded notification store"
        );

        Ok(Self {
            state: Arc::new(Mutex::new(snapshot)),
            persistence_path: Some(path),
        })
    }

    /// Number of committed notifications, all statuses
    pub async fn len(&self) -> usize {
        self.state.lock().await.notifications.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Insert a fully formed row, bypassing reconciliation
    ///
    /// Used to seed state (imports, fixtures). The id is assigned by the store.
    pub async fn seed(&self, mut notification: Notification) -> Result<Notification, StoreError> {
        let mut state = self.state.lock().await;
        let mut working = state.clone();
        working.next_notification_id += 1;
        notification.id = working.next_notification_id;
        working
            .notifications
            .insert(notification.id, notification.clone());
        self.persist(&working)?;
        *state = working;
        Ok(notification)
    }

    fn persist(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        if let Some(ref path) = self.persistence_path {
            save_snapshot(path, snapshot)?;
            debug!(
                path = %path.display(),
                notifications = snapshot.notifications.len(),
                "Store snapshot written"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard: Some(guard),
            working,
            store: self.clone(),
        }))
    }

    async fn get(&self, id: i64) -> Result<Option<Notification>, StoreError> {
        Ok(self.state.lock().await.notifications.get(&id).cloned())
    }

    async fn list(&self, filter: &NotificationFilter) -> Result<Page<Notification>, StoreError> {
        let state = self.state.lock().await;
        let mut matching: Vec<&Notification> = state
            .notifications
            .values()
            .filter(|n| filter.matches(n))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let limit = filter.effective_limit();
        let offset = filter.effective_offset();
        Ok(Page {
            total: matching.len(),
            items: matching
                .into_iter()
                .skip(offset)
                .take(limit)
                .cloned()
                .collect(),
            limit,
            offset,
        })
    }

    async fn audit_events(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .audit
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }
}

/// Transaction holding the store lock and a private working copy
struct MemoryTransaction {
    guard: Option<OwnedMutexGuard<Snapshot>>,
    working: Snapshot,
    store: InMemoryStore,
}

impl MemoryTransaction {
    fn open(&mut self) -> Result<&mut Snapshot, StoreError> {
        if self.guard.is_none() {
            return Err(StoreError::TransactionClosed);
        }
        Ok(&mut self.working)
    }
}

#[async_trait]
impl AuditSink for MemoryTransaction {
    async fn append(
        &mut self,
        action: AuditAction,
        target_id: i64,
        metadata: serde_json::Value,
        at: DateTime<Utc>,
    ) -> Result<AuditEvent, StoreError> {
        let working = self.open()?;
        working.next_audit_id += 1;
        let event = AuditEvent {
            id: working.next_audit_id,
            action,
            target_id,
            metadata,
            at,
        };
        working.audit.push(event.clone());
        Ok(event)
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get(&mut self, id: i64) -> Result<Option<Notification>, StoreError> {
        Ok(self.open()?.notifications.get(&id).cloned())
    }

    async fn list_active(&mut self) -> Result<Vec<Notification>, StoreError> {
        Ok(self
            .open()?
            .notifications
            .values()
            .filter(|n| n.is_active())
            .cloned()
            .collect())
    }

    async fn find_active(
        &mut self,
        provider: Provider,
        vm_name: &str,
        metric: MetricKind,
    ) -> Result<Option<Notification>, StoreError> {
        Ok(self
            .open()?
            .notifications
            .values()
            .find(|n| {
                n.is_active()
                    && n.provider == provider
                    && n.metric == metric
                    && n.vm_name == vm_name
            })
            .cloned())
    }

    async fn insert(&mut self, new: NewNotification) -> Result<(Notification, bool), StoreError> {
        let working = self.open()?;
        if let Some(existing) = working.by_dedupe_key(&new.dedupe_key) {
            return Ok((existing.clone(), false));
        }

        working.next_notification_id += 1;
        let notification = new.into_notification(working.next_notification_id);
        working
            .notifications
            .insert(notification.id, notification.clone());
        Ok((notification, true))
    }

    async fn update(&mut self, notification: &Notification) -> Result<(), StoreError> {
        let working = self.open()?;
        match working.notifications.get_mut(&notification.id) {
            Some(row) => {
                *row = notification.clone();
                Ok(())
            }
            None => Err(StoreError::Unavailable(format!(
                "notification {} vanished during transaction",
                notification.id
            ))),
        }
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let mut guard = self.guard.take().ok_or(StoreError::TransactionClosed)?;
        self.store.persist(&self.working)?;
        *guard = std::mem::take(&mut self.working);
        Ok(())
    }
}

fn save_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_vec_pretty(snapshot)?;

    let temp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)?;
    file.write_all(&json)?;
    file.sync_all()?;

    std::fs::rename(&temp_path, path)?;
    Ok(())
}

fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
    let mut file = File::open(path)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    Ok(serde_json::from_slice(&data)?)
}
