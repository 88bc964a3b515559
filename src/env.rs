//! Backend environment selection.
//!
//! The hosted web page and the profile service exist in a staging and a
//! production deployment. The selection is persisted in the key-value store
//! under `CurrentEnvironment` and defaults to production.
//!
//! # Usage
//!
//! ```rust
//! use alternator_bridge::env::Environment;
//! use alternator_bridge::storage::{KeyValueStore, MemoryStore};
//!
//! let store = MemoryStore::new();
//! let store: &dyn KeyValueStore = &store;
//! assert_eq!(Environment::active(store), Environment::Production);
//!
//! Environment::Staging.activate(store).unwrap();
//! assert_eq!(Environment::active(store), Environment::Staging);
//! ```

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{self, KeyValueStore, StorageKey};

/// Backend deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Test deployment.
    Staging,
    /// Live deployment (default).
    #[default]
    Production,
}

impl Environment {
    /// Base URL of the hosted web page.
    #[must_use]
    pub fn web_url(self) -> &'static str {
        match self {
            Self::Staging => "https://test.alternator.bonnetapps.com",
            Self::Production => "https://alternator.bonnetapps.com",
        }
    }

    /// Profile preload endpoint.
    #[must_use]
    pub fn profile_url(self) -> String {
        format!("{}/api/profile", self.web_url())
    }

    /// Persisted selection, or production when nothing (or garbage) is stored.
    #[must_use]
    pub fn active(store: &dyn KeyValueStore) -> Self {
        store
            .get_string(StorageKey::Environment)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }

    /// Persist this environment as the active one.
    pub fn activate(self, store: &dyn KeyValueStore) -> Result<()> {
        log::info!("Switching environment to {self}");
        store.set_string(StorageKey::Environment, self.as_str())
    }

    /// Lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => anyhow::bail!("Unknown environment '{other}' (expected staging or production)"),
        }
    }
}

/// URL the web view should load.
///
/// Appends a fresh saved path to `base`. The saved path is consumed either
/// way, so a stale or used path never comes back.
#[must_use]
pub fn page_url(base: &str, store: &dyn KeyValueStore, now: DateTime<Utc>) -> String {
    match storage::take_start_path(store, now) {
        Some(path) => format!("{base}{path}"),
        None => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, SavedPath};

    #[test]
    fn test_parse_and_display() {
        assert_eq!("staging".parse::<Environment>().unwrap(), Environment::Staging);
        assert_eq!(" Production ".parse::<Environment>().unwrap(), Environment::Production);
        assert!("qa".parse::<Environment>().is_err());
        assert_eq!(Environment::Staging.to_string(), "staging");
    }

    #[test]
    fn test_active_defaults_to_production() {
        let store = MemoryStore::new();
        let store: &dyn KeyValueStore = &store;
        assert_eq!(Environment::active(store), Environment::Production);

        store.set_string(StorageKey::Environment, "nonsense").unwrap();
        assert_eq!(Environment::active(store), Environment::Production);

        Environment::Staging.activate(store).unwrap();
        assert_eq!(Environment::active(store), Environment::Staging);
    }

    #[test]
    fn test_urls_differ_per_environment() {
        assert_ne!(Environment::Staging.web_url(), Environment::Production.web_url());
        assert!(Environment::Production
            .profile_url()
            .starts_with(Environment::Production.web_url()));
    }

    #[test]
    fn test_page_url_appends_fresh_path_once() {
        let store = MemoryStore::new();
        let store: &dyn KeyValueStore = &store;
        store
            .set(StorageKey::SavedPath, &SavedPath::new("/locations/7"))
            .unwrap();

        let now = Utc::now();
        let base = Environment::Production.web_url();
        assert_eq!(page_url(base, store, now), format!("{base}/locations/7"));
        assert_eq!(page_url(base, store, now), base);
    }
}
