//! Tracing subscriber setup for embedding applications and tests

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;

/// Install a global fmt subscriber filtered by `RUST_LOG`, falling back to `level`
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))
}

/// Install a global subscriber at the configured [`EngineConfig::log_level`]
pub fn init_from_config(config: &EngineConfig) -> Result<()> {
    init_tracing(&config.log_level)
}

/// Install a subscriber writing through the test harness; repeated calls are no-ops
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("gatekeep=debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_subscriber_installed_once() {
        let config = EngineConfig {
            log_level: "gatekeep=debug".to_string(),
            ..Default::default()
        };
        let _ = init_from_config(&config);
        assert!(init_tracing("info").is_err());
        assert!(init_from_config(&config).is_err());

        // no-op once a subscriber exists
        init_test_tracing();
    }
}
