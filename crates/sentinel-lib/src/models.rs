//! Core data models for the sentinel

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hypervisor provider family a VM is hosted on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[serde(try_from = "String")]
pub enum Provider {
    Vmware,
    Hyperv,
    Kvm,
    Cedia,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Vmware => "vmware",
            Provider::Hyperv => "hyperv",
            Provider::Kvm => "kvm",
            Provider::Cedia => "cedia",
        }
    }

    /// Whether the provider reports usage per virtual disk
    pub fn reports_per_disk(&self) -> bool {
        matches!(self, Provider::Hyperv)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vmware" => Ok(Provider::Vmware),
            "hyperv" => Ok(Provider::Hyperv),
            "kvm" => Ok(Provider::Kvm),
            "cedia" => Ok(Provider::Cedia),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

impl TryFrom<String> for Provider {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Utilization metric an anomaly is raised for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[serde(try_from = "String")]
pub enum MetricKind {
    Cpu,
    Ram,
    Disk,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "CPU",
            MetricKind::Ram => "RAM",
            MetricKind::Disk => "DISK",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CPU" => Ok(MetricKind::Cpu),
            "RAM" => Ok(MetricKind::Ram),
            "DISK" => Ok(MetricKind::Disk),
            other => Err(format!("unknown metric: {other}")),
        }
    }
}

impl TryFrom<String> for MetricKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Lifecycle status of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[serde(try_from = "String")]
pub enum NotificationStatus {
    Open,
    Ack,
    Cleared,
}

impl NotificationStatus {
    /// Open and acknowledged notifications still describe a live anomaly
    pub fn is_active(&self) -> bool {
        matches!(self, NotificationStatus::Open | NotificationStatus::Ack)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Open => "OPEN",
            NotificationStatus::Ack => "ACK",
            NotificationStatus::Cleared => "CLEARED",
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Ok(NotificationStatus::Open),
            "ACK" => Ok(NotificationStatus::Ack),
            "CLEARED" => Ok(NotificationStatus::Cleared),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

impl TryFrom<String> for NotificationStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Usage reading for a single virtual disk
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DiskUsage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_gib: Option<f64>,
}

/// One provider's utilization reading for one VM at one point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub provider: Provider,
    pub vm_name: String,
    #[serde(default)]
    pub vm_id: Option<String>,
    #[serde(default)]
    pub env: Option<String>,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub cpu_pct: Option<f64>,
    #[serde(default)]
    pub ram_pct: Option<f64>,
    #[serde(default)]
    pub disks: Vec<DiskUsage>,
}

impl Sample {
    /// Sample with identity fields only; metric readings are added by the caller
    pub fn new(provider: Provider, vm_name: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            provider,
            vm_name: vm_name.into(),
            vm_id: None,
            env: None,
            at,
            cpu_pct: None,
            ram_pct: None,
            disks: Vec::new(),
        }
    }
}

/// Threshold crossing derived from a sample for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyCandidate {
    pub provider: Provider,
    pub vm_name: String,
    pub vm_id: Option<String>,
    pub metric: MetricKind,
    pub value_pct: f64,
    pub threshold_pct: f64,
    pub env: Option<String>,
    pub at: DateTime<Utc>,
    pub disks: Option<Vec<DiskUsage>>,
}

impl AnomalyCandidate {
    pub fn match_key(&self) -> MatchKey {
        MatchKey::new(self.provider, &self.vm_name, self.metric)
    }
}

/// Identity used to find "the same alert occurrence" across passes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchKey {
    pub provider: Provider,
    pub vm_name: String,
    pub metric: MetricKind,
}

impl MatchKey {
    pub fn new(provider: Provider, vm_name: &str, metric: MetricKind) -> Self {
        Self {
            provider,
            vm_name: vm_name.to_string(),
            metric,
        }
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.provider, self.vm_name, self.metric)
    }
}

/// Durable unit of alerting state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub provider: Provider,
    pub vm_id: Option<String>,
    pub vm_name: String,
    pub metric: MetricKind,
    pub value_pct: f64,
    pub threshold_pct: f64,
    pub env: Option<String>,
    pub at: DateTime<Utc>,
    pub status: NotificationStatus,
    pub ack_by: Option<String>,
    pub ack_at: Option<DateTime<Utc>>,
    pub cleared_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub disks: Option<Vec<DiskUsage>>,
    pub dedupe_key: String,
}

impl Notification {
    pub fn match_key(&self) -> MatchKey {
        MatchKey::new(self.provider, &self.vm_name, self.metric)
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Notification fields known before the store assigns an id
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub provider: Provider,
    pub vm_id: Option<String>,
    pub vm_name: String,
    pub metric: MetricKind,
    pub value_pct: f64,
    pub threshold_pct: f64,
    pub env: Option<String>,
    pub at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub disks: Option<Vec<DiskUsage>>,
    pub dedupe_key: String,
}

impl NewNotification {
    /// Materialize an OPEN notification under the given id
    pub fn into_notification(self, id: i64) -> Notification {
        Notification {
            id,
            provider: self.provider,
            vm_id: self.vm_id,
            vm_name: self.vm_name,
            metric: self.metric,
            value_pct: self.value_pct,
            threshold_pct: self.threshold_pct,
            env: self.env,
            at: self.at,
            status: NotificationStatus::Open,
            ack_by: None,
            ack_at: None,
            cleared_at: None,
            created_at: self.created_at,
            archived: false,
            disks: self.disks,
            dedupe_key: self.dedupe_key,
        }
    }
}

/// Kind of change recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(try_from = "String")]
pub enum AuditAction {
    NotificationCreated,
    NotificationUpdated,
    NotificationCleared,
    NotificationAcknowledged,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::NotificationCreated => "NOTIFICATION_CREATED",
            AuditAction::NotificationUpdated => "NOTIFICATION_UPDATED",
            AuditAction::NotificationCleared => "NOTIFICATION_CLEARED",
            AuditAction::NotificationAcknowledged => "NOTIFICATION_ACKNOWLEDGED",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NOTIFICATION_CREATED" => Ok(AuditAction::NotificationCreated),
            "NOTIFICATION_UPDATED" => Ok(AuditAction::NotificationUpdated),
            "NOTIFICATION_CLEARED" => Ok(AuditAction::NotificationCleared),
            "NOTIFICATION_ACKNOWLEDGED" => Ok(AuditAction::NotificationAcknowledged),
            other => Err(format!("unknown audit action: {other}")),
        }
    }
}

impl TryFrom<String> for AuditAction {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Append-only audit trail entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: i64,
    pub action: AuditAction,
    pub target_id: i64,
    pub metadata: serde_json::Value,
    pub at: DateTime<Utc>,
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub created: usize,
    pub updated: usize,
    pub cleared: usize,
    pub preserved: usize,
    /// Candidates dropped because they failed validation
    #[serde(default)]
    pub rejected: usize,
    /// Recurrences held back because their hour's row was already cleared
    #[serde(default)]
    pub suppressed: usize,
    pub created_ids: Vec<i64>,
    pub updated_ids: Vec<i64>,
    pub cleared_ids: Vec<i64>,
    pub preserved_ids: Vec<i64>,
    /// Ids of the cleared rows that held back a recurrence
    #[serde(default)]
    pub suppressed_ids: Vec<i64>,
}

impl ReconciliationReport {
    pub(crate) fn record_created(&mut self, id: i64) {
        self.created += 1;
        self.created_ids.push(id);
    }

    pub(crate) fn record_updated(&mut self, id: i64) {
        self.updated += 1;
        self.updated_ids.push(id);
    }

    pub(crate) fn record_cleared(&mut self, id: i64) {
        self.cleared += 1;
        self.cleared_ids.push(id);
    }

    pub(crate) fn record_preserved(&mut self, id: i64) {
        self.preserved += 1;
        self.preserved_ids.push(id);
    }

    pub(crate) fn record_suppressed(&mut self, id: i64) {
        self.suppressed += 1;
        self.suppressed_ids.push(id);
    }

    pub(crate) fn record_rejected(&mut self) {
        self.rejected += 1;
    }

    /// Number of notifications written during the pass
    pub fn mutations(&self) -> usize {
        self.created + self.updated + self.cleared
    }
}
