//! Client configuration management.
//!
//! This module handles loading and saving the client configuration, which
//! includes an optional API base-URL override and the last used login email.
//!
//! Configuration is stored at `~/.config/ledgerly/config.json`.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::api::client::DEFAULT_BASE_URL;

/// Application name used for config/data directory paths
const APP_NAME: &str = "ledgerly";

/// Config file name
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Base-URL override for staging or self-hosted servers.
    pub api_base_url: Option<String>,
    /// Email to prefill on the login form.
    pub last_email: Option<String>,
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

    /// The configured base URL, or the production default.
    pub fn base_url(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Per-user data directory, used for the encrypted credential file on
    /// hosts without a usable OS keychain.
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_falls_back_to_default() {
        let config = Config::default();
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);

        let config = Config {
            api_base_url: Some("https://staging.ledgerly.app".to_string()),
            last_email: None,
        };
        assert_eq!(config.base_url(), "https://staging.ledgerly.app");
    }

    #[test]
    fn round_trips_through_json() {
        let config = Config {
            api_base_url: None,
            last_email: Some("ana@example.com".to_string()),
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.last_email.as_deref(), Some("ana@example.com"));
        assert!(parsed.api_base_url.is_none());
    }
}
