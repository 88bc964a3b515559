//! Secure bridge session: handshake state machine and message dispatch.
//!
//! # States
//!
//! ```text
//!                 inbound HANDSHAKE {key}
//!   ┌──────────────┐  begin   ┌──────────────────┐ complete ┌─────────────┐
//!   │ Unestablished│─────────▶│ HandshakePending │─────────▶│ Established │
//!   └──────────────┘          └──────────────────┘          └─────────────┘
//!          ▲        token / key failure  │                         │
//!          └─────────────────────────────┘                         │
//!          ▲                 any inbound HANDSHAKE restarts        │
//!          └───────────────────────────────────────────────────────┘
//! ```
//!
//! Exactly one shared secret is held at a time. A new handshake discards it
//! before anything else happens, so ciphertext sealed under an earlier
//! secret never decrypts after a restart.
//!
//! The session is driven by [`super::runtime::BridgeRuntime`], which owns it
//! exclusively and feeds it one inbound message at a time.

use std::sync::Arc;
use std::time::Duration;

use super::codec::{self, InboundFrame};
use super::error::{BridgeError, CipherError, KeyAgreementError, TokenError};
use super::handler::{BridgeHandler, TokenProvider};
use super::key_exchange::{self, KeyPair};
use super::transport::TransportAdapter;
use super::types::{Coordinate, Envelope, Filters, MessageType, Payload};
use crate::constants::TOKEN_REFRESH_TIMEOUT;
use crate::crypto::{self, SharedSecret};
use crate::storage::{KeyValueStore, SavedPath, StorageKey};

/// Handshake progress.
#[derive(Debug, Default)]
pub enum SessionState {
    /// No key material.
    #[default]
    Unestablished,
    /// Local key pair generated, waiting for agreement.
    HandshakePending(KeyPair),
    /// Shared secret derived; application messages flow.
    Established(SharedSecret),
}

impl SessionState {
    /// Short name for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unestablished => "unestablished",
            Self::HandshakePending(_) => "handshake_pending",
            Self::Established(_) => "established",
        }
    }
}

/// One bridge session per web view.
pub struct SecureBridgeSession {
    state: SessionState,
    app_id: String,
    last_coordinate: Option<Coordinate>,
    token_timeout: Duration,
    tokens: Arc<dyn TokenProvider>,
    store: Arc<dyn KeyValueStore>,
    transport: Arc<dyn TransportAdapter>,
    handler: Arc<dyn BridgeHandler>,
}

impl std::fmt::Debug for SecureBridgeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureBridgeSession")
            .field("state", &self.state.name())
            .field("app_id", &self.app_id)
            .field("last_coordinate", &self.last_coordinate)
            .finish_non_exhaustive()
    }
}

impl SecureBridgeSession {
    /// Create an unestablished session.
    pub fn new(
        app_id: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn TransportAdapter>,
        handler: Arc<dyn BridgeHandler>,
    ) -> Self {
        Self {
            state: SessionState::Unestablished,
            app_id: app_id.into(),
            last_coordinate: None,
            token_timeout: TOKEN_REFRESH_TIMEOUT,
            tokens,
            store,
            transport,
            handler,
        }
    }

    /// Bound each token refresh by `timeout`.
    #[must_use]
    pub fn with_token_timeout(mut self, timeout: Duration) -> Self {
        self.token_timeout = timeout;
        self
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Whether application messages can be sent.
    #[must_use]
    pub fn is_established(&self) -> bool {
        matches!(self.state, SessionState::Established(_))
    }

    /// Last coordinate reported by the host, sent with the next handshake.
    #[must_use]
    pub fn last_coordinate(&self) -> Option<Coordinate> {
        self.last_coordinate
    }

    /// Record the latest user coordinate.
    pub fn set_last_coordinate(&mut self, coordinate: Coordinate) {
        self.last_coordinate = Some(coordinate);
    }

    // ========================================================================
    // Handshake
    // ========================================================================

    /// Discard any secret and generate a fresh local key pair.
    ///
    /// Returns the local public key in wire encoding.
    pub fn begin_handshake(&mut self) -> String {
        let pair = key_exchange::generate_key_pair();
        let public_key = pair.public_key_string();
        if self.is_established() {
            log::info!("Restarting handshake, previous shared secret discarded");
        }
        self.state = SessionState::HandshakePending(pair);
        public_key
    }

    /// Agree on a shared secret with `remote_public_key` and become
    /// established.
    ///
    /// Starts a fresh key pair first when no handshake is pending. Returns
    /// the local public key. On failure the session is left unestablished.
    pub fn complete_handshake(&mut self, remote_public_key: &str) -> Result<String, KeyAgreementError> {
        let pair = match std::mem::take(&mut self.state) {
            SessionState::HandshakePending(pair) => pair,
            SessionState::Unestablished | SessionState::Established(_) => {
                key_exchange::generate_key_pair()
            }
        };

        let secret = key_exchange::derive_shared_secret(&pair, remote_public_key)?;
        self.state = SessionState::Established(secret);
        log::info!("Shared secret established");
        Ok(pair.public_key_string())
    }

    /// Run the full native side of a handshake requested by the page.
    ///
    /// Token or key failures are reported through
    /// [`BridgeHandler::on_error`] and leave the session unestablished.
    async fn handle_handshake(&mut self, remote_public_key: &str) {
        self.begin_handshake();

        let token = match self.fetch_token().await {
            Ok(token) => token,
            Err(e) => {
                log::warn!("Handshake aborted, token refresh failed: {e}");
                self.state = SessionState::Unestablished;
                self.handler.on_error(&e.to_string());
                return;
            }
        };

        let public_key = match self.complete_handshake(remote_public_key) {
            Ok(key) => key,
            Err(e) => {
                log::warn!("Handshake aborted: {e}");
                self.handler.on_error(&BridgeError::from(e).to_string());
                return;
            }
        };

        let filters: Option<Filters> = self.store.get(StorageKey::Filters);
        if filters.is_some() {
            log::debug!("Attaching persisted filters to handshake");
        }

        let response = Envelope::new(
            MessageType::Handshake,
            Payload {
                key: Some(public_key),
                jwt: Some(token),
                coordinates: self.last_coordinate,
                user: self.cached_profile(),
                filters,
                ..Payload::default()
            },
        );

        match self.send_clear(response) {
            Ok(()) => self.handler.on_established(),
            Err(e) => {
                log::warn!("Failed to deliver handshake response: {e}");
                self.state = SessionState::Unestablished;
                self.handler.on_error(&e.to_string());
            }
        }
    }

    fn cached_profile(&self) -> Option<serde_json::Value> {
        let raw = self.store.get_string(StorageKey::UserProfile)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                log::warn!("Cached profile is not JSON, omitting it: {e}");
                None
            }
        }
    }

    async fn fetch_token(&self) -> Result<String, TokenError> {
        match tokio::time::timeout(self.token_timeout, self.tokens.refresh_token()).await {
            Ok(Ok(token)) if token.is_empty() => Err(TokenError::Empty),
            Ok(result) => result,
            Err(_elapsed) => Err(TokenError::TimedOut),
        }
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Seal and deliver an application message.
    ///
    /// Fails with [`CipherError::NoKey`] unless established. `app_id` is
    /// filled in when absent.
    pub fn send(&self, message_type: MessageType, data: Payload) -> Result<(), BridgeError> {
        self.send_envelope(Envelope::new(message_type, data))
    }

    /// Seal and deliver a prebuilt envelope. See [`Self::send`].
    pub fn send_envelope(&self, mut envelope: Envelope) -> Result<(), BridgeError> {
        let SessionState::Established(secret) = &self.state else {
            return Err(CipherError::NoKey.into());
        };

        self.fill_app_id(&mut envelope);
        let json = codec::encode(&envelope)?;
        let sealed = crypto::encrypt(&json, secret)?;
        self.transport.send(&sealed)?;

        log::debug!("Sent {} message", envelope.message_type);
        Ok(())
    }

    fn send_clear(&self, mut envelope: Envelope) -> Result<(), BridgeError> {
        self.fill_app_id(&mut envelope);
        let json = codec::encode(&envelope)?;
        self.transport.send(&codec::escape(&json))?;
        Ok(())
    }

    fn fill_app_id(&self, envelope: &mut Envelope) {
        if envelope.data.app_id.is_none() {
            envelope.data.app_id = Some(self.app_id.clone());
        }
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Handle one raw string from the envelope channel.
    ///
    /// Never fails: problems are reported through the handler and the
    /// message is dropped.
    pub async fn handle_inbound(&mut self, raw: &str) {
        match codec::try_decode(raw) {
            InboundFrame::Plain(envelope) => match (envelope.message_type, envelope.data.key) {
                (MessageType::Handshake, Some(key)) => {
                    log::info!("Handshake requested by {:?} page", envelope.platform);
                    self.handle_handshake(&key).await;
                }
                (message_type, _) => {
                    log::debug!("Dropping cleartext {message_type} message");
                }
            },
            InboundFrame::Cipher(ciphertext) => match self.open(&ciphertext) {
                Ok(envelope) => self.dispatch(envelope).await,
                Err(e) => {
                    log::warn!("Dropping undecryptable message: {e}");
                    self.handler.on_error(&format!("Decrypted error: {e}"));
                }
            },
        }
    }

    /// Report a body that was not a string.
    pub fn handle_corrupted(&self) {
        log::warn!("Envelope channel delivered a non-string body");
        self.handler.on_error("Body message corrupted");
    }

    fn open(&self, ciphertext: &str) -> Result<Envelope, BridgeError> {
        let SessionState::Established(secret) = &self.state else {
            return Err(CipherError::NoKey.into());
        };
        let plaintext = crypto::decrypt(ciphertext, secret)?;
        Ok(codec::decode(&plaintext)?)
    }

    async fn dispatch(&mut self, envelope: Envelope) {
        log::debug!("Received {} message", envelope.message_type);

        match envelope.message_type {
            MessageType::Token => self.renew_token().await,
            MessageType::Loading => {
                self.handler
                    .on_loading_changed(envelope.data.setting.unwrap_or(false));
            }
            MessageType::Filters => {
                if let Some(filters) = &envelope.data.filters {
                    if let Err(e) = self.store.set(StorageKey::Filters, filters) {
                        log::warn!("Failed to persist filters: {e:#}");
                    }
                }
            }
            MessageType::Path => match &envelope.data.value {
                Some(path) => {
                    if let Err(e) = self.store.set(StorageKey::SavedPath, &SavedPath::new(path.as_str())) {
                        log::warn!("Failed to persist path: {e:#}");
                    }
                    self.handler.on_message(&envelope);
                }
                None => log::debug!("PATH without value ignored"),
            },
            MessageType::Navigate => match envelope.data.coordinate() {
                Some(coordinate) => self
                    .handler
                    .on_navigate(coordinate, envelope.data.operator.as_deref()),
                None => log::debug!("NAVIGATE without coordinates ignored"),
            },
            MessageType::Browser => match envelope.data.value.as_deref() {
                Some(url) => self.handler.on_open_url(url),
                None => log::debug!("BROWSER without URL ignored"),
            },
            MessageType::Intercom => {
                if let Some(open) = envelope.data.setting {
                    self.handler.on_intercom_changed(open);
                }
            }
            MessageType::Unrecognized => {
                log::debug!("Dropping message with unrecognized type");
            }
            MessageType::Handshake
            | MessageType::Sample
            | MessageType::UserLocation => self.handler.on_message(&envelope),
        }
    }

    /// Token renewal ping-pong: fetch a fresh token and send it back.
    async fn renew_token(&mut self) {
        let result = match self.fetch_token().await {
            Ok(token) => self.send(MessageType::Token, Payload::value(token)),
            Err(e) => Err(e.into()),
        };

        if let Err(e) = result {
            log::warn!("Token renewal failed: {e}");
            self.handler.on_error(&e.to_string());
        }
    }

    /// Release the shared secret.
    pub fn teardown(&mut self) {
        self.state = SessionState::Unestablished;
        log::debug!("Bridge session torn down");
    }
}
