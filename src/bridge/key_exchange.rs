//! X25519 key exchange for the bridge handshake.
//!
//! Keys are regenerated for every handshake and never persisted. Public keys
//! travel as the raw 32-byte Montgomery u-coordinate, standard base64.
//!
//! # Protocol Flow
//!
//! ```text
//! Native (this side)                         Web page
//! ──────────────────────────────────────────────────────────
//!                                   1. Generate key pair
//!                        ◄── 2. HANDSHAKE {key} (cleartext)
//! 3. Generate key pair
//! 4. Derive shared secret
//! 5. HANDSHAKE {key, jwt, ...} ──►
//!                                   6. Derive shared secret
//!    ◄── AES-256-GCM sealed envelopes ──►
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use x25519_dalek::{PublicKey, StaticSecret};

use super::error::KeyAgreementError;
use crate::crypto::SharedSecret;

/// Length of a raw X25519 key.
pub const KEY_LENGTH: usize = 32;

/// Local X25519 key pair. The private half is zeroed on drop.
pub struct KeyPair {
    private_key: StaticSecret,
    public_key: PublicKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let public = export_public_key(&self.public_key);
        f.debug_struct("KeyPair")
            .field("public_key", &&public[..public.len().min(8)])
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Local public key.
    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Local public key in wire encoding.
    #[must_use]
    pub fn public_key_string(&self) -> String {
        export_public_key(&self.public_key)
    }
}

/// Generate a fresh key pair from the OS RNG.
#[must_use]
pub fn generate_key_pair() -> KeyPair {
    let mut bytes = [0u8; KEY_LENGTH];
    rand::rng().fill_bytes(&mut bytes);
    let private_key = StaticSecret::from(bytes);
    let public_key = PublicKey::from(&private_key);
    KeyPair {
        private_key,
        public_key,
    }
}

/// Canonical wire encoding of a public key.
#[must_use]
pub fn export_public_key(public_key: &PublicKey) -> String {
    BASE64.encode(public_key.as_bytes())
}

/// Decode a wire public key.
pub fn import_public_key(encoded: &str) -> Result<PublicKey, KeyAgreementError> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|_decode_error| KeyAgreementError::Encoding)?;
    let raw: [u8; KEY_LENGTH] = bytes
        .as_slice()
        .try_into()
        .map_err(|_length_error| KeyAgreementError::Length(bytes.len()))?;
    Ok(PublicKey::from(raw))
}

/// Agree on a shared secret with the remote public key.
///
/// Fails if the key does not decode to 32 bytes or is a low-order point.
pub fn derive_shared_secret(
    local: &KeyPair,
    remote_public_key: &str,
) -> Result<SharedSecret, KeyAgreementError> {
    let remote = import_public_key(remote_public_key)?;
    let agreement = local.private_key.diffie_hellman(&remote);

    if !agreement.was_contributory() {
        return Err(KeyAgreementError::LowOrder);
    }

    SharedSecret::derive(agreement.as_bytes())
}
