//! Host-facing entry point.
//!
//! [`Alternator`] wires one bridge lifetime together: the key-value store,
//! the session running on its [`BridgeRuntime`], and the location tracker
//! feeding it. The host supplies the token provider, the transport into its
//! web view and the handler that renders bridge events.
//!
//! # Usage
//!
//! ```ignore
//! let (queue, mut scripts) = ScriptQueue::channel();
//! let alternator = Alternator::open(Config::load()?, tokens, Arc::new(queue), handler)?;
//!
//! let url = alternator.prepare().await;   // load this in the web view
//! alternator.handle().on_script_message(channel, Some(body))?;
//! alternator.location().report(coordinate);
//!
//! alternator.shutdown().await;
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::bridge::{
    BridgeHandle, BridgeHandler, BridgeRuntime, SecureBridgeSession, TokenProvider,
    TransportAdapter,
};
use crate::config::Config;
use crate::env::{self, Environment};
use crate::location::LocationTracker;
use crate::profile::ProfileClient;
use crate::storage::{FileStore, KeyValueStore};

/// One bridge lifetime, from web view creation to teardown.
pub struct Alternator {
    config: Config,
    store: Arc<dyn KeyValueStore>,
    tokens: Arc<dyn TokenProvider>,
    handle: BridgeHandle,
    location: LocationTracker,
}

impl std::fmt::Debug for Alternator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Alternator")
            .field("app_id", &self.config.app_id)
            .field("environment", &self.active_environment())
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl Alternator {
    /// Start a bridge backed by the file store from `config`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(
        config: Config,
        tokens: Arc<dyn TokenProvider>,
        transport: Arc<dyn TransportAdapter>,
        handler: Arc<dyn BridgeHandler>,
    ) -> Result<Self> {
        let path = config.storage_path()?;
        let store = FileStore::open(&path)
            .with_context(|| format!("Failed to open store at {}", path.display()))?;
        Self::new(config, Arc::new(store), tokens, transport, handler)
    }

    /// Start a bridge on an explicit store.
    ///
    /// Activates `config.environment` when set. Must be called from within
    /// a tokio runtime.
    pub fn new(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        tokens: Arc<dyn TokenProvider>,
        transport: Arc<dyn TransportAdapter>,
        handler: Arc<dyn BridgeHandler>,
    ) -> Result<Self> {
        if let Some(environment) = config.environment {
            environment.activate(store.as_ref())?;
        }

        let session = SecureBridgeSession::new(
            config.app_id.clone(),
            Arc::clone(&tokens),
            Arc::clone(&store),
            transport,
            handler,
        )
        .with_token_timeout(config.token_timeout());

        let handle = BridgeRuntime::start(session);
        let location = LocationTracker::for_bridge(handle.clone(), config.location_debounce());

        Ok(Self {
            config,
            store,
            tokens,
            handle,
            location,
        })
    }

    /// Handle to the running bridge.
    #[must_use]
    pub fn handle(&self) -> &BridgeHandle {
        &self.handle
    }

    /// Location tracker feeding the bridge.
    #[must_use]
    pub fn location(&self) -> &LocationTracker {
        &self.location
    }

    /// Backing store.
    #[must_use]
    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    /// Persisted environment selection.
    #[must_use]
    pub fn active_environment(&self) -> Environment {
        Environment::active(self.store.as_ref())
    }

    /// Persist a new environment selection. Takes effect on the next
    /// [`Self::prepare`].
    pub fn set_environment(&self, environment: Environment) -> Result<()> {
        environment.activate(self.store.as_ref())
    }

    /// Web page base URL for the active environment.
    #[must_use]
    pub fn web_url(&self) -> String {
        self.config.web_url(self.active_environment())
    }

    /// URL the web view should load, consuming any saved path.
    #[must_use]
    pub fn start_url(&self) -> String {
        env::page_url(&self.web_url(), self.store.as_ref(), Utc::now())
    }

    /// Preload the user profile, then return the start URL.
    ///
    /// A failed preload is logged and otherwise ignored; the handshake then
    /// goes out with whatever profile was cached before.
    pub async fn prepare(&self) -> String {
        if let Err(e) = self.preload_profile().await {
            log::warn!("Profile preload failed: {e:#}");
        }
        self.start_url()
    }

    async fn preload_profile(&self) -> Result<()> {
        let timeout = self.config.token_timeout();
        let token = tokio::time::timeout(timeout, self.tokens.refresh_token())
            .await
            .context("Token refresh timed out")??;

        let url = self.config.profile_url(self.active_environment());
        let client = ProfileClient::new(url, self.config.http_timeout())?;
        client
            .preload_and_cache(self.store.as_ref(), &token, &self.config.app_id)
            .await?;
        Ok(())
    }

    /// Stop location updates, release the shared secret and stop the
    /// runtime.
    pub async fn shutdown(&self) {
        self.location.cancel();
        self.handle.shutdown().await;
    }
}
