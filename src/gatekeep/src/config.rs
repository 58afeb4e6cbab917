//! Engine configuration loading and validation

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Per-session engine configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Re-validate the active destination after every apply cycle
    #[serde(default = "default_true")]
    pub revalidate_navigation: bool,

    /// Where to reroute when a view's bound permissions are not granted
    #[serde(default)]
    pub view_denied_destination: String,

    /// Drop bindings of reclaimed elements before a full rebind
    #[serde(default = "default_true")]
    pub sweep_on_rebind: bool,

    /// Collect apply-cycle metrics
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Initial capacity of the per-cycle grant cache
    #[serde(default = "default_cache_capacity")]
    pub grant_cache_capacity: usize,

    /// Log filter installed by [`crate::telemetry::init_from_config`]
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_true() -> bool { true }
fn default_cache_capacity() -> usize { 64 }
fn default_log_level() -> String { "info".to_string() }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            revalidate_navigation: true,
            view_denied_destination: String::new(),
            sweep_on_rebind: true,
            enable_metrics: true,
            grant_cache_capacity: default_cache_capacity(),
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a `.toml` or `.json` file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => {
                let config: EngineConfig = serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?;
                config.validate()?;
                config
            }
            _ => Self::from_toml_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?,
        };

        Ok(config)
    }

    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(contents).context("Invalid TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        EnvFilter::try_new(&self.log_level)
            .with_context(|| format!("Invalid log_level: {}", self.log_level))?;

        if self.view_denied_destination.chars().any(char::is_whitespace) {
            bail!(
                "view_denied_destination must not contain whitespace: {:?}",
                self.view_denied_destination
            );
        }

        Ok(())
    }
}
