//! Utilization samplers
//!
//! A sampler delivers one finite batch of normalized samples per provider per
//! run. Talking to hypervisors is left to external collectors; the sentinel
//! reads what they produce.

mod spool;

pub use spool::JsonFileSampler;

use crate::models::{Provider, Sample};
use anyhow::Result;
use async_trait::async_trait;

/// Source of samples for one provider
#[async_trait]
pub trait Sampler: Send + Sync {
    /// Provider every returned sample belongs to
    fn provider(&self) -> Provider;

    /// Collect the current batch
    ///
    /// With `refresh` false an implementation may return its last batch
    /// instead of reading again.
    async fn collect_samples(&self, refresh: bool) -> Result<Vec<Sample>>;
}

/// Sampler returning a fixed batch, or a fixed failure
///
/// Handy for wiring the service without collectors and for tests.
#[derive(Debug, Clone)]
pub struct StaticSampler {
    provider: Provider,
    samples: Vec<Sample>,
    failure: Option<String>,
}

impl StaticSampler {
    pub fn new(provider: Provider, samples: Vec<Sample>) -> Self {
        Self {
            provider,
            samples,
            failure: None,
        }
    }

    pub fn failing(provider: Provider, message: impl Into<String>) -> Self {
        Self {
            provider,
            samples: Vec::new(),
            failure: Some(message.into()),
        }
    }
}

#[async_trait]
impl Sampler for StaticSampler {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn collect_samples(&self, _refresh: bool) -> Result<Vec<Sample>> {
        match &self.failure {
            Some(message) => anyhow::bail!("{message}"),
            None => Ok(self.samples.clone()),
        }
    }
}
