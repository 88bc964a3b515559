//! In-process stand-in for the web counterpart.
//!
//! Speaks the page's side of the protocol: posts a cleartext handshake with
//! its own public key, derives the shared secret from the native response,
//! then seals and opens application envelopes. Used by the `simulate`
//! command and by tests that need a real counterpart.

use super::codec;
use super::error::{BridgeError, CipherError, CodecError};
use super::key_exchange::{self, KeyPair};
use super::types::{Envelope, MessageType, Payload, Platform};
use crate::crypto::{self, SharedSecret};

/// The page's side of a bridge session.
#[derive(Debug)]
pub struct WebPeer {
    key_pair: KeyPair,
    secret: Option<SharedSecret>,
}

impl Default for WebPeer {
    fn default() -> Self {
        Self::new()
    }
}

impl WebPeer {
    /// Fresh peer with its own key pair.
    #[must_use]
    pub fn new() -> Self {
        Self {
            key_pair: key_exchange::generate_key_pair(),
            secret: None,
        }
    }

    /// Cleartext handshake request as the page would post it.
    #[must_use]
    pub fn handshake_request(&self) -> String {
        let envelope = Envelope {
            message_type: MessageType::Handshake,
            platform: Platform::Web,
            data: Payload {
                key: Some(self.key_pair.public_key_string()),
                ..Payload::default()
            },
        };
        // Serializing a plain struct with string members cannot fail.
        codec::encode(&envelope).unwrap_or_default()
    }

    /// Take the native handshake response (as delivered, still escaped) and
    /// derive the shared secret from it.
    pub fn accept_response(&mut self, delivered: &str) -> Result<Envelope, BridgeError> {
        let response = codec::decode(codec::unescape(delivered).as_bytes())?;
        let key = response
            .data
            .key
            .as_deref()
            .ok_or_else(|| CodecError::MissingField("key".into()))?;
        self.secret = Some(key_exchange::derive_shared_secret(&self.key_pair, key)?);
        Ok(response)
    }

    /// Derived secret, once the handshake completed.
    #[must_use]
    pub fn secret(&self) -> Option<&SharedSecret> {
        self.secret.as_ref()
    }

    /// Seal an envelope for delivery to the native side.
    pub fn seal(&self, envelope: &Envelope) -> Result<String, BridgeError> {
        self.seal_raw(&codec::encode(envelope)?)
    }

    /// Seal arbitrary plaintext.
    pub fn seal_raw(&self, plaintext: &str) -> Result<String, BridgeError> {
        let secret = self.secret.as_ref().ok_or(CipherError::NoKey)?;
        Ok(crypto::encrypt(plaintext, secret)?)
    }

    /// Open a payload delivered by the native side.
    pub fn open(&self, delivered: &str) -> Result<Envelope, BridgeError> {
        let secret = self.secret.as_ref().ok_or(CipherError::NoKey)?;
        let plaintext = crypto::decrypt(&codec::unescape(delivered), secret)?;
        Ok(codec::decode(&plaintext)?)
    }
}
