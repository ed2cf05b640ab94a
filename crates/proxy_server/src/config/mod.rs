//! Configuration loading.
//!
//! Loads the JSON configuration from disk. A missing file is replaced with
//! a freshly written default configuration so a new deployment starts with
//! something editable; an unreadable or unparseable file is an error the
//! caller treats as fatal.

pub mod settings;

pub use settings::{
    Config, GroupSettings, LoadBalancerSettings, LoggingSettings, ServerEntry, WebSettings,
    WhitelistSettings,
};

use std::path::Path;

use tracing::{info, warn};

use crate::error::ProxyError;

/// Loads configuration from `path`, creating a default file if none exists.
pub async fn load_config(path: &Path) -> Result<Config, ProxyError> {
    if path.exists() {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProxyError::Config(format!("failed to read {}: {e}", path.display())))?;
        serde_json::from_str(&contents)
            .map_err(|e| ProxyError::Config(format!("failed to parse {}: {e}", path.display())))
    } else {
        warn!("Configuration file not found: {}, using defaults", path.display());

        let config = Config::default();
        let contents = serde_json::to_string_pretty(&config)
            .map_err(|e| ProxyError::Internal(format!("failed to serialize defaults: {e}")))?;
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| ProxyError::Config(format!("failed to write {}: {e}", path.display())))?;
        info!("Created default configuration file: {}", path.display());

        Ok(config)
    }
}
