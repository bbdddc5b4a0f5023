//! Service configuration
//!
//! Read from an optional `sentinel.toml` in the working directory, then from
//! `SENTINEL_*` environment variables. Every key has a default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use sentinel_lib::anomaly::DEFAULT_THRESHOLD_PCT;
use sentinel_lib::scheduler::{Schedule, SchedulerConfig};
use sentinel_lib::Provider;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SentinelConfig {
    /// Name attached to structured log events
    #[serde(default = "default_instance")]
    pub instance: String,

    /// Port for the operator API, probes and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Utilization percentage at or above which a metric is anomalous
    #[serde(default = "default_threshold_pct")]
    pub threshold_pct: f64,

    /// Run every N minutes instead of hourly
    #[serde(default)]
    pub schedule_dev_minutes: Option<u32>,

    #[serde(default = "default_misfire_grace_secs")]
    pub misfire_grace_secs: u64,

    /// Notification snapshot file
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Bound on each store call during a pass
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,

    /// Directory holding one `<provider>.json` sample batch per provider
    #[serde(default = "default_spool_dir")]
    pub spool_dir: PathBuf,

    /// Comma separated providers to sample
    #[serde(default = "default_providers")]
    pub providers: String,

    /// Re-read sampler sources on every pass
    #[serde(default = "default_refresh")]
    pub refresh: bool,
}

fn default_instance() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "vm-sentinel".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_threshold_pct() -> f64 {
    DEFAULT_THRESHOLD_PCT
}

fn default_misfire_grace_secs() -> u64 {
    180
}

fn default_store_path() -> PathBuf {
    PathBuf::from("/var/lib/vm-sentinel/notifications.json")
}

fn default_store_timeout_secs() -> u64 {
    30
}

fn default_spool_dir() -> PathBuf {
    PathBuf::from("/var/spool/vm-sentinel")
}

fn default_providers() -> String {
    "vmware,hyperv,kvm,cedia".to_string()
}

fn default_refresh() -> bool {
    true
}

impl SentinelConfig {
    /// Load configuration from `sentinel.toml` and the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("sentinel").required(false))
            .add_source(config::Environment::with_prefix("SENTINEL").try_parsing(true))
            .build()
            .context("Failed to read configuration")?;

        Self::from_config(config)
    }

    /// Parse a TOML document, defaults filling the gaps
    pub fn from_toml(toml: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .context("Failed to parse configuration")?;

        Self::from_config(config)
    }

    fn from_config(config: config::Config) -> Result<Self> {
        let parsed: Self = config
            .try_deserialize()
            .context("Invalid sentinel configuration")?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<()> {
        if !self.threshold_pct.is_finite() || self.threshold_pct <= 0.0 {
            anyhow::bail!(
                "threshold_pct must be a positive percentage, got {}",
                self.threshold_pct
            );
        }
        if self.store_timeout_secs == 0 {
            anyhow::bail!("store_timeout_secs must be at least 1");
        }
        if matches!(self.schedule_dev_minutes, Some(n) if n > 60) {
            anyhow::bail!("schedule_dev_minutes must be between 1 and 60");
        }
        self.provider_list()?;
        Ok(())
    }

    /// Providers to build samplers for, in configured order
    pub fn provider_list(&self) -> Result<Vec<Provider>> {
        self.providers
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| p.parse::<Provider>().map_err(anyhow::Error::msg))
            .collect()
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            schedule: Schedule::from_dev_minutes(self.schedule_dev_minutes),
            misfire_grace: Duration::from_secs(self.misfire_grace_secs),
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}
