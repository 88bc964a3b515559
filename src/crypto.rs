//! Shared AES-256-GCM encryption primitives for the bridge.
//!
//! The shared secret produced by X25519 agreement is stretched with
//! HKDF-SHA256 into an AES-256-GCM key. Every application message is sealed
//! with a fresh random nonce.
//!
//! # Wire Format
//!
//! ```text
//! base64( nonce[12] || ciphertext || tag[16] )
//! ```
//!
//! Standard alphabet with padding, the same layout as a "combined" sealed
//! box, so the web counterpart can split it without any framing.

use aes_gcm::{
    aead::{self, Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::bridge::codec;
use crate::bridge::error::{CipherError, KeyAgreementError};

/// Nonce size for AES-GCM (96 bits = 12 bytes).
const NONCE_SIZE: usize = 12;

/// Authentication tag size for AES-GCM.
const TAG_SIZE: usize = 16;

/// HKDF info string binding derived keys to this protocol version.
const KDF_INFO: &[u8] = b"alternator-bridge-v1";

/// Symmetric key derived from the handshake. Zeroed on drop.
#[derive(Clone)]
pub struct SharedSecret {
    key: Zeroizing<[u8; 32]>,
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

impl SharedSecret {
    /// Derive the AES key from raw key-agreement output.
    pub fn derive(agreement: &[u8; 32]) -> Result<Self, KeyAgreementError> {
        let hk = Hkdf::<Sha256>::new(None, agreement);
        let mut key = Zeroizing::new([0u8; 32]);
        hk.expand(KDF_INFO, &mut key[..])
            .map_err(|hkdf::InvalidLength| KeyAgreementError::Derivation)?;
        Ok(Self { key })
    }

    /// Wrap an already-derived key.
    #[must_use]
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self {
            key: Zeroizing::new(key),
        }
    }

    fn cipher(&self) -> Aes256Gcm {
        let key: &[u8; 32] = &self.key;
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key))
    }
}

impl PartialEq for SharedSecret {
    fn eq(&self, other: &Self) -> bool {
        self.key[..] == other.key[..]
    }
}

impl Eq for SharedSecret {}

/// Seal a UTF-8 payload.
///
/// The result is base64 and already escaped for single-quoted script
/// interpolation.
pub fn encrypt(plaintext: &str, key: &SharedSecret) -> Result<String, CipherError> {
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let sealed = key
        .cipher()
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|aead::Error| CipherError::AuthenticationFailed)?;

    let mut combined = Vec::with_capacity(NONCE_SIZE + sealed.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&sealed);

    Ok(codec::escape(&BASE64.encode(combined)))
}

/// Open a sealed payload.
///
/// Any corruption (bad base64, truncation, wrong key, flipped bit) fails
/// with [`CipherError::AuthenticationFailed`]; garbage is never returned.
pub fn decrypt(ciphertext: &str, key: &SharedSecret) -> Result<Vec<u8>, CipherError> {
    let combined = BASE64
        .decode(ciphertext.trim())
        .map_err(|e| {
            log::debug!("Ciphertext is not valid base64: {e}");
            CipherError::AuthenticationFailed
        })?;

    if combined.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CipherError::AuthenticationFailed);
    }

    let (nonce_bytes, sealed) = combined.split_at(NONCE_SIZE);
    key.cipher()
        .decrypt(Nonce::from_slice(nonce_bytes), sealed)
        .map_err(|aead::Error| CipherError::AuthenticationFailed)
}
