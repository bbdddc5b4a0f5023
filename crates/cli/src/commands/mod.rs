//! Subcommand implementations

pub mod audit;
pub mod notifications;
pub mod scan;
