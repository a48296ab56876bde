//! Application configuration management.
//!
//! Configuration is stored at `~/.config/switchback/config.json`. The API
//! base URL can be overridden with the `SWITCHBACK_API_URL` environment
//! variable, which takes precedence over the config file.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "switchback";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default base URL for the authentication API
const DEFAULT_API_BASE_URL: &str = "https://api.switchback.app";

/// Environment variable overriding the API base URL
const API_URL_ENV: &str = "SWITCHBACK_API_URL";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub last_identifier: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Resolved API base URL: environment override, then the config file,
    /// then the default.
    pub fn api_base_url(&self) -> String {
        std::env::var(API_URL_ENV)
            .ok()
            .or_else(|| self.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_no_overrides() {
        let config = Config::default();
        assert!(config.api_base_url.is_none());
        assert!(config.last_identifier.is_none());
    }

    #[test]
    fn test_configured_url_wins_over_default() {
        let config = Config {
            api_base_url: Some("https://staging.switchback.app".to_string()),
            last_identifier: None,
        };
        // No env override in the test environment for this variable name.
        if std::env::var(API_URL_ENV).is_err() {
            assert_eq!(config.api_base_url(), "https://staging.switchback.app");
        }
    }
}
