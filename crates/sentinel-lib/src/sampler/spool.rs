//! Sampler reading collector output from a spool directory
//!
//! Collectors drop one `<provider>.json` file per provider, holding a JSON
//! array of samples. Timestamps may carry any offset and are normalized to
//! UTC on parse.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::Sampler;
use crate::models::{Provider, Sample};

pub struct JsonFileSampler {
    provider: Provider,
    path: PathBuf,
    last_batch: Mutex<Option<Vec<Sample>>>,
}

impl JsonFileSampler {
    /// Sampler for `provider` reading `<spool_dir>/<provider>.json`
    pub fn new(provider: Provider, spool_dir: impl AsRef<Path>) -> Self {
        let path = spool_dir
            .as_ref()
            .join(format!("{}.json", provider.as_str()));
        Self {
            provider,
            path,
            last_batch: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_batch(&self) -> Result<Vec<Sample>> {
        let data = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read spool file {}", self.path.display()))?;
        let samples: Vec<Sample> = serde_json::from_slice(&data)
            .with_context(|| format!("Invalid samples in {}", self.path.display()))?;

        let total = samples.len();
        let samples: Vec<Sample> = samples
            .into_iter()
            .filter(|s| s.provider == self.provider)
            .collect();
        if samples.len() != total {
            warn!(
                provider = %self.provider,
                path = %self.path.display(),
                dropped = total - samples.len(),
                "Dropping samples labelled with another provider"
            );
        }

        debug!(provider = %self.provider, samples = samples.len(), "Read spool batch");
        Ok(samples)
    }
}

#[async_trait]
impl Sampler for JsonFileSampler {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn collect_samples(&self, refresh: bool) -> Result<Vec<Sample>> {
        let mut last_batch = self.last_batch.lock().await;
        if !refresh {
            if let Some(batch) = last_batch.as_ref() {
                return Ok(batch.clone());
            }
        }

        let batch = self.read_batch().await?;
        *last_batch = Some(batch.clone());
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HYPERV_BATCH: &str = r#"[
        {"provider": "hyperv", "vm_name": "hv-01", "at": "2024-01-01T12:05:00-05:00",
         "cpu_pct": 12.5, "disks": [{"used_pct": 91.0, "size_gib": 120.0}]},
        {"provider": "vmware", "vm_name": "stray", "at": "2024-01-01T12:05:00Z"}
    ]"#;

    #[tokio::test]
    async fn test_reads_provider_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("hyperv.json"), HYPERV_BATCH).unwrap();

        let sampler = JsonFileSampler::new(Provider::Hyperv, dir.path());
        let samples = sampler.collect_samples(true).await.unwrap();

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].vm_name, "hv-01");
        assert_eq!(samples[0].at.to_rfc3339(), "2024-01-01T17:05:00+00:00");
        assert_eq!(samples[0].disks.len(), 1);
    }

    #[tokio::test]
    async fn test_provider_label_casing_is_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("hyperv.json"),
            r#"[
                {"provider": "HyperV", "vm_name": "hv-01", "at": "2024-01-01T12:00:00Z",
                 "disks": [{"used_pct": 91.0}]},
                {"provider": "HYPERV", "vm_name": "hv-02", "at": "2024-01-01T12:00:00Z"},
                {"provider": "VMware", "vm_name": "stray", "at": "2024-01-01T12:00:00Z"}
            ]"#,
        )
        .unwrap();

        let sampler = JsonFileSampler::new(Provider::Hyperv, dir.path());
        let samples = sampler.collect_samples(true).await.unwrap();

        let names: Vec<&str> = samples.iter().map(|s| s.vm_name.as_str()).collect();
        assert_eq!(names, vec!["hv-01", "hv-02"]);
        assert!(samples.iter().all(|s| s.provider == Provider::Hyperv));
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let sampler = JsonFileSampler::new(Provider::Kvm, dir.path());

        let err = sampler.collect_samples(true).await.unwrap_err();
        assert!(err.to_string().contains("kvm.json"));
    }

    #[tokio::test]
    async fn test_without_refresh_reuses_last_batch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hyperv.json");
        std::fs::write(&path, HYPERV_BATCH).unwrap();

        let sampler = JsonFileSampler::new(Provider::Hyperv, dir.path());
        assert_eq!(sampler.collect_samples(true).await.unwrap().len(), 1);

        std::fs::write(&path, "[]").unwrap();
        assert_eq!(sampler.collect_samples(false).await.unwrap().len(), 1);
        assert!(sampler.collect_samples(true).await.unwrap().is_empty());
    }
}
