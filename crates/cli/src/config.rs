//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::output::OutputFormat;

/// API URL used when neither the flag, the environment nor the file sets one
pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// CLI configuration stored in `~/.config/vms/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// API endpoint URL
    pub api_url: Option<String>,
    /// Identity recorded when acknowledging
    pub operator: Option<String>,
    /// Default output format (`table` or `json`)
    pub default_format: Option<String>,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("vms").join("config.json"))
    }

    /// Flag or environment value first, then the file, then the default
    pub fn api_url(&self, from_cli: Option<String>) -> String {
        from_cli
            .or_else(|| self.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    pub fn format(&self, from_cli: Option<OutputFormat>) -> Result<OutputFormat> {
        match (from_cli, &self.default_format) {
            (Some(format), _) => Ok(format),
            (None, Some(name)) => name
                .parse()
                .map_err(|e: String| anyhow::anyhow!("Invalid default_format in config: {e}")),
            (None, None) => Ok(OutputFormat::Table),
        }
    }

    /// Acknowledger identity: flag, then config, then `$USER`
    pub fn operator(&self, from_cli: Option<String>) -> Option<String> {
        from_cli
            .or_else(|| self.operator.clone())
            .or_else(|| std::env::var("USER").ok())
            .filter(|name| !name.trim().is_empty())
    }
}
