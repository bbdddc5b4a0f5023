//! Reconciliation of anomaly candidates against recorded notifications
//!
//! A pass diffs the evaluator's current candidates against the store's
//! active notifications and decides, per `(provider, vm_name, metric)`,
//! whether to create, update, preserve or clear. Every mutation writes one
//! audit row in the same transaction.

mod engine;


pub use engine::{ReconcileConfig, Reconciler, DEFAULT_STORE_TIMEOUT};
