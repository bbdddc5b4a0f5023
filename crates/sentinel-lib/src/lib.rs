//! VM anomaly sentinel library
//!
//! This crate provides the core functionality for:
//! - Threshold evaluation of VM utilization samples
//! - Reconciliation of anomaly candidates against recorded notifications
//! - Notification storage with an audit trail
//! - Scheduling with a single-run job guard
//! - Health checks and observability

pub mod anomaly;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod reconcile;
pub mod sampler;
pub mod scheduler;
pub mod store;

pub use error::{Result, SentinelError, StoreError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{SentinelMetrics, StructuredLogger};
pub use reconcile::{ReconcileConfig, Reconciler};
