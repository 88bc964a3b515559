//! Error taxonomy for the secure bridge.
//!
//! None of these errors are fatal to the host. Handshake-time errors leave
//! the session unestablished, per-message errors drop only that message.
//! Everything is surfaced through [`BridgeHandler::on_error`] as a
//! human-readable string.
//!
//! [`BridgeHandler::on_error`]: super::handler::BridgeHandler::on_error

use thiserror::Error;

/// The remote public key could not be used for key agreement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyAgreementError {
    /// Key string is not valid base64.
    #[error("public key is not valid base64")]
    Encoding,
    /// Decoded key has the wrong length.
    #[error("public key must be 32 bytes, got {0}")]
    Length(usize),
    /// Agreement produced the all-zero output (low-order point).
    #[error("public key is a low-order point")]
    LowOrder,
    /// The agreement output could not be expanded into a cipher key.
    #[error("key derivation failed")]
    Derivation,
}

/// Symmetric encryption failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    /// No shared secret has been established yet.
    #[error("Not connection established")]
    NoKey,
    /// Ciphertext was tampered with, truncated, or sealed under another key.
    #[error("authentication failed")]
    AuthenticationFailed,
}

/// Envelope (de)serialization failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Input is not JSON, or not a JSON object.
    #[error("Data Corrupted: {0}")]
    Malformed(String),
    /// A required member is absent.
    #[error("Key not found: {0}")]
    MissingField(String),
    /// A member has the wrong JSON type or an unknown enum value.
    #[error("Type Mismatch: {0}")]
    TypeMismatch(String),
}

/// Token provider failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// The provider reported an error.
    #[error("{0}")]
    Failed(String),
    /// The provider returned an empty token or is not configured.
    #[error("We couldn't refresh the session")]
    Empty,
    /// The provider did not answer in time.
    #[error("token refresh timed out")]
    TimedOut,
}

/// Transport adapter failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The web view (or its script queue) is gone.
    #[error("transport unavailable")]
    Unavailable,
    /// The bridge runtime has been torn down.
    #[error("bridge closed")]
    Closed,
}

/// Umbrella error for bridge operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// See [`KeyAgreementError`].
    #[error("key agreement failed: {0}")]
    KeyAgreement(#[from] KeyAgreementError),
    /// See [`CipherError`].
    #[error(transparent)]
    Cipher(#[from] CipherError),
    /// See [`CodecError`].
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// See [`TokenError`].
    #[error(transparent)]
    Token(#[from] TokenError),
    /// See [`TransportError`].
    #[error(transparent)]
    Transport(#[from] TransportError),
}
