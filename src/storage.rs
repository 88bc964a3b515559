//! Key-value persistence for state that outlives a bridge session.
//!
//! Stores the selected environment, the user's charging filters, the last
//! deep-link path and the cached user profile. Nothing cryptographic is ever
//! persisted; keys and shared secrets live only as long as the session.
//!
//! # Storage structure
//!
//! ```text
//! ~/.config/alternator/
//!     store.json      # {"CurrentEnvironment": "...", "CurrentUserFilters": "{...}", ...}
//! ```
//!
//! Values are strings. Structured values (filters, saved path) are JSON
//! documents stored inside those strings.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::constants::SAVED_PATH_MAX_AGE_HOURS;

/// Fixed storage keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    /// Last deep-link path reported by the page ([`SavedPath`]).
    SavedPath,
    /// Selected [`crate::env::Environment`].
    Environment,
    /// Charging filters ([`crate::bridge::Filters`]).
    Filters,
    /// Cached user profile blob.
    UserProfile,
}

impl StorageKey {
    /// Persisted key string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SavedPath => "CurrentUserAlternatorPath",
            Self::Environment => "CurrentEnvironment",
            Self::Filters => "CurrentUserFilters",
            Self::UserProfile => "UserProfile",
        }
    }
}

/// String key-value store.
pub trait KeyValueStore: Send + Sync {
    /// Read a raw value.
    fn get_string(&self, key: StorageKey) -> Option<String>;

    /// Write a raw value.
    fn set_string(&self, key: StorageKey, value: &str) -> Result<()>;

    /// Delete a value. Deleting a missing key is not an error.
    fn remove(&self, key: StorageKey) -> Result<()>;
}

impl<'a> dyn KeyValueStore + 'a {
    /// Read and decode a JSON value. Undecodable values read as `None`.
    pub fn get<T: DeserializeOwned>(&self, key: StorageKey) -> Option<T> {
        let raw = self.get_string(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("Ignoring undecodable {} value: {e}", key.as_str());
                None
            }
        }
    }

    /// Encode and write a JSON value.
    pub fn set<T: Serialize>(&self, key: StorageKey, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)
            .with_context(|| format!("Failed to serialize {}", key.as_str()))?;
        self.set_string(key, &raw)
    }
}

/// In-memory store. Used by tests and hosts that bring their own persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<StorageKey, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_string(&self, key: StorageKey) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    fn set_string(&self, key: StorageKey, value: &str) -> Result<()> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<()> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        Ok(())
    }
}

/// Store backed by a single JSON document on disk.
///
/// The document is read once on open and rewritten on every mutation.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: RwLock<HashMap<String, String>>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read store file {}", path.display()))?;
            serde_json::from_str(&content).context("Failed to parse store file")?
        } else {
            HashMap::new()
        };

        log::debug!("Opened store at {} ({} keys)", path.display(), values.len());
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create store directory")?;
        }

        let content = serde_json::to_string_pretty(values).context("Failed to serialize store")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).context("Failed to write store file")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))
                .context("Failed to set store file permissions")?;
        }

        fs::rename(&tmp, &self.path).context("Failed to replace store file")?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get_string(&self, key: StorageKey) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key.as_str())
            .cloned()
    }

    fn set_string(&self, key: StorageKey, value: &str) -> Result<()> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.as_str().to_string(), value.to_string());
        self.persist(&values)
    }

    fn remove(&self, key: StorageKey) -> Result<()> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        if values.remove(key.as_str()).is_some() {
            self.persist(&values)?;
        }
        Ok(())
    }
}

// ============================================================================
// Saved path
// ============================================================================

/// Deep-link path the page asked to resume on next launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedPath {
    /// Path relative to the web base URL.
    pub path: String,
    /// When the path was reported.
    #[serde(rename = "date")]
    pub created_at: DateTime<Utc>,
}

impl SavedPath {
    /// Record `path` as of now.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self::created_at(path, Utc::now())
    }

    /// Record `path` with an explicit timestamp.
    #[must_use]
    pub fn created_at(path: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            created_at,
        }
    }

    /// Usable while fewer than 12 whole hours have elapsed.
    #[must_use]
    pub fn can_be_used(&self, now: DateTime<Utc>) -> bool {
        (now - self.created_at).num_hours() < SAVED_PATH_MAX_AGE_HOURS
    }
}

/// Consume the saved path.
///
/// The stored value is removed whether or not it is still fresh; the path is
/// returned only when fresh.
pub fn take_start_path(store: &dyn KeyValueStore, now: DateTime<Utc>) -> Option<String> {
    let saved: SavedPath = store.get(StorageKey::SavedPath)?;

    if let Err(e) = store.remove(StorageKey::SavedPath) {
        log::warn!("Failed to clear saved path: {e:#}");
    }

    if saved.can_be_used(now) {
        Some(saved.path)
    } else {
        log::debug!("Discarding stale saved path from {}", saved.created_at);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    // ========== SavedPath Tests ==========

    #[test]
    fn test_saved_path_freshness() {
        let now = Utc::now();
        assert!(SavedPath::created_at("/map", now).can_be_used(now));
        assert!(SavedPath::created_at("/map", now - Duration::minutes(11 * 60 + 59)).can_be_used(now));
        assert!(!SavedPath::created_at("/map", now - Duration::hours(12)).can_be_used(now));
        assert!(!SavedPath::created_at("/map", now - Duration::hours(13)).can_be_used(now));
    }

    #[test]
    fn test_take_start_path_consumes_once() {
        let store = MemoryStore::new();
        let store: &dyn KeyValueStore = &store;
        store
            .set(StorageKey::SavedPath, &SavedPath::new("/locations/42"))
            .unwrap();

        let now = Utc::now();
        assert_eq!(take_start_path(store, now).as_deref(), Some("/locations/42"));
        assert_eq!(take_start_path(store, now), None);
        assert!(store.get_string(StorageKey::SavedPath).is_none());
    }

    #[test]
    fn test_take_start_path_clears_stale_entry() {
        let store = MemoryStore::new();
        let store: &dyn KeyValueStore = &store;
        let now = Utc::now();
        store
            .set(
                StorageKey::SavedPath,
                &SavedPath::created_at("/old", now - Duration::hours(13)),
            )
            .unwrap();

        assert_eq!(take_start_path(store, now), None);
        assert!(store.get_string(StorageKey::SavedPath).is_none());
    }

    // ========== Store Tests ==========

    #[test]
    fn test_typed_get_ignores_garbage() {
        let store = MemoryStore::new();
        store.set_string(StorageKey::Filters, "not json").unwrap();
        let store: &dyn KeyValueStore = &store;
        assert_eq!(store.get::<crate::bridge::Filters>(StorageKey::Filters), None);
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/store.json");

        {
            let store = FileStore::open(&path).unwrap();
            store.set_string(StorageKey::Environment, "staging").unwrap();
            store.set_string(StorageKey::UserProfile, r#"{"name":"Ana"}"#).unwrap();
            store.remove(StorageKey::UserProfile).unwrap();
        }

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(
            reopened.get_string(StorageKey::Environment).as_deref(),
            Some("staging")
        );
        assert_eq!(reopened.get_string(StorageKey::UserProfile), None);

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("CurrentEnvironment"));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = FileStore::open(&path).unwrap();
        store.set_string(StorageKey::Environment, "production").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
