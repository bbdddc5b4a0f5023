//! Notification store and audit sink
//!
//! The reconciliation engine talks to storage only through these traits.
//! A [`StoreTransaction`] sees its own writes, and nothing it does is visible
//! to other readers until [`StoreTransaction::commit`] succeeds. Dropping a
//! transaction without committing discards every staged write, audit rows
//! included.

mod memory;

#[cfg(test)]
mod tests;

pub use memory::InMemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::models::{
    AuditAction, AuditEvent, MetricKind, NewNotification, Notification, NotificationStatus,
    Provider,
};

/// Default page size for notification listings
pub const DEFAULT_PAGE_LIMIT: usize = 50;

/// Maximum page size a caller may request
pub const MAX_PAGE_LIMIT: usize = 500;

/// Transactional access to notification rows
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Open a transaction; concurrent transactions are serialized
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    /// Read a committed notification by id
    async fn get(&self, id: i64) -> Result<Option<Notification>, StoreError>;

    /// List committed notifications, newest first
    async fn list(&self, filter: &NotificationFilter) -> Result<Page<Notification>, StoreError>;

    /// List committed audit events in append order
    async fn audit_events(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>, StoreError>;
}

/// Append-only log of structured events
#[async_trait]
pub trait AuditSink: Send {
    async fn append(
        &mut self,
        action: AuditAction,
        target_id: i64,
        metadata: serde_json::Value,
        at: DateTime<Utc>,
    ) -> Result<AuditEvent, StoreError>;
}

/// Unit of work against the store; audit rows commit with the mutations
#[async_trait]
pub trait StoreTransaction: AuditSink {
    async fn get(&mut self, id: i64) -> Result<Option<Notification>, StoreError>;

    /// All notifications with status OPEN or ACK
    async fn list_active(&mut self) -> Result<Vec<Notification>, StoreError>;

    async fn find_active(
        &mut self,
        provider: Provider,
        vm_name: &str,
        metric: MetricKind,
    ) -> Result<Option<Notification>, StoreError>;

    /// Insert unless a row with the same dedupe key exists
    ///
    /// # Returns
    /// The stored row and `true` when it was created by this call, or the
    /// already existing row and `false`.
    async fn insert(&mut self, new: NewNotification) -> Result<(Notification, bool), StoreError>;

    /// Overwrite the row with the same id
    async fn update(&mut self, notification: &Notification) -> Result<(), StoreError>;

    /// Make every staged write visible atomically
    async fn commit(&mut self) -> Result<(), StoreError>;
}

/// Filters for listing notifications
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationFilter {
    pub status: Option<NotificationStatus>,
    pub provider: Option<Provider>,
    pub metric: Option<MetricKind>,
    pub vm_name: Option<String>,
    pub env: Option<String>,
    #[serde(default)]
    pub include_archived: bool,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl NotificationFilter {
    pub fn matches(&self, n: &Notification) -> bool {
        (self.include_archived || !n.archived)
            && self.status.map_or(true, |s| n.status == s)
            && self.provider.map_or(true, |p| n.provider == p)
            && self.metric.map_or(true, |m| n.metric == m)
            && self.vm_name.as_ref().map_or(true, |v| &n.vm_name == v)
            && self
                .env
                .as_ref()
                .map_or(true, |e| n.env.as_deref().is_some_and(|env| env.eq_ignore_ascii_case(e)))
    }

    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
    }

    pub fn effective_offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }
}

/// Filters for listing audit events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    pub target_id: Option<i64>,
    pub action: Option<AuditAction>,
}

impl AuditFilter {
    pub fn matches(&self, event: &AuditEvent) -> bool {
        self.target_id.map_or(true, |id| event.target_id == id)
            && self.action.map_or(true, |a| event.action == a)
    }
}

/// One page of a listing plus the total number of matches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}
