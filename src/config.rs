//! Configuration loading and persistence.
//!
//! Reads `config.json` from the config directory and layers environment
//! variable overrides on top. Every field has a default, so a missing or
//! partial file is fine.

use std::path::PathBuf;
use std::time::Duration;
use std::{fs, io};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{
    HTTP_REQUEST_TIMEOUT, LOCATION_DEBOUNCE, TOKEN_REFRESH_TIMEOUT,
};
use crate::env::Environment;

/// Application identifier sent when none is configured.
pub const DEFAULT_APP_ID: &str = "com.bonnet.alternator";

/// Bridge configuration.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Host application identifier, sent as `app_id` in every envelope.
    pub app_id: String,
    /// Environment to activate on start. `None` keeps the persisted choice.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    /// Overrides the environment's web page URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
    /// Overrides the environment's profile endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
    /// Overrides the key-value store location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<PathBuf>,
    /// Location debounce quiet period in milliseconds.
    pub location_debounce_ms: u64,
    /// Profile request timeout in seconds.
    pub http_timeout_secs: u64,
    /// Token refresh timeout in seconds.
    pub token_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_id: DEFAULT_APP_ID.to_string(),
            environment: None,
            web_url: None,
            profile_url: None,
            storage_path: None,
            location_debounce_ms: u64::try_from(LOCATION_DEBOUNCE.as_millis()).unwrap_or(1000),
            http_timeout_secs: HTTP_REQUEST_TIMEOUT.as_secs(),
            token_timeout_secs: TOKEN_REFRESH_TIMEOUT.as_secs(),
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// `ALTERNATOR_CONFIG_DIR` overrides the platform config directory
    /// (`~/.config/alternator` on Linux).
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("ALTERNATOR_CONFIG_DIR") {
            PathBuf::from(dir)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("alternator")
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from the config directory, with environment
    /// variable overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_dir()?.join("config.json");
        let mut config = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(app_id) = std::env::var("ALTERNATOR_APP_ID") {
            self.app_id = app_id;
        }

        if let Ok(web_url) = std::env::var("ALTERNATOR_WEB_URL") {
            self.web_url = Some(web_url);
        }

        if let Ok(profile_url) = std::env::var("ALTERNATOR_PROFILE_URL") {
            self.profile_url = Some(profile_url);
        }

        if let Ok(env) = std::env::var("ALTERNATOR_ENV") {
            match env.parse() {
                Ok(env) => self.environment = Some(env),
                Err(e) => log::warn!("Ignoring ALTERNATOR_ENV: {e}"),
            }
        }
    }

    /// Persists the configuration to the config directory.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_dir()?.join("config.json");
        fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        #[cfg(unix)]
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Key-value store location: the override, or `store.json` in the
    /// config directory.
    pub fn storage_path(&self) -> Result<PathBuf> {
        match &self.storage_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("store.json")),
        }
    }

    /// Web page base URL for `env`, honouring the override.
    #[must_use]
    pub fn web_url(&self, env: Environment) -> String {
        self.web_url
            .clone()
            .unwrap_or_else(|| env.web_url().to_string())
    }

    /// Profile endpoint for `env`, honouring the override.
    #[must_use]
    pub fn profile_url(&self, env: Environment) -> String {
        self.profile_url
            .clone()
            .unwrap_or_else(|| env.profile_url())
    }

    /// Location debounce quiet period.
    #[must_use]
    pub fn location_debounce(&self) -> Duration {
        Duration::from_millis(self.location_debounce_ms)
    }

    /// Profile request timeout.
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Token refresh timeout.
    #[must_use]
    pub fn token_timeout(&self) -> Duration {
        Duration::from_secs(self.token_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.app_id, DEFAULT_APP_ID);
        assert_eq!(config.location_debounce(), Duration::from_secs(1));
        assert_eq!(config.http_timeout(), Duration::from_secs(15));
        assert_eq!(config.token_timeout(), Duration::from_secs(15));
        assert_eq!(config.environment, None);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"app_id":"com.example","environment":"staging"}"#).unwrap();
        assert_eq!(config.app_id, "com.example");
        assert_eq!(config.environment, Some(Environment::Staging));
        assert_eq!(config.http_timeout_secs, 15);
    }

    #[test]
    fn test_url_overrides() {
        let mut config = Config::default();
        assert_eq!(
            config.web_url(Environment::Staging),
            Environment::Staging.web_url()
        );

        config.web_url = Some("http://localhost:3000".into());
        config.profile_url = Some("http://localhost:3000/profile".into());
        assert_eq!(config.web_url(Environment::Production), "http://localhost:3000");
        assert_eq!(
            config.profile_url(Environment::Production),
            "http://localhost:3000/profile"
        );
    }

    #[test]
    fn test_serialization_skips_unset_overrides() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(!json.contains("web_url"));
        assert!(!json.contains("storage_path"));
    }
}
