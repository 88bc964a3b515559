//! Alternator bridge - encrypted channel between a native host and the
//! hosted EV-charging web page.
//!
//! The host embeds the web page in a web view. This crate owns everything
//! between the two: the X25519 handshake, AES-256-GCM sealing of every
//! application message, the envelope codec, and per-message dispatch into
//! host callbacks.
//!
//! # Architecture
//!
//! - **Bridge** - Protocol core: session state machine, codec, key exchange
//! - **Runtime** - Background task that owns the session, plus a cloneable handle
//! - **Storage** - Persisted environment, filters, saved path and profile
//! - **Location** - Distance-filtered, debounced location forwarding
//! - **Profile** - One-shot profile preload before the page loads
//!
//! # Modules
//!
//! - [`bridge`] - Secure bridge protocol
//! - [`crypto`] - AES-256-GCM sealing and HKDF key derivation
//! - [`alternator`] - Host-facing facade
//! - [`config`] - Configuration loading/saving

// Library modules
pub mod alternator;
pub mod bridge;
pub mod location;
pub mod profile;

pub mod config;
pub mod constants;
pub mod crypto;
pub mod debounce;
pub mod env;
pub mod storage;

// Re-export commonly used types
pub use alternator::Alternator;
pub use bridge::{BridgeHandle, BridgeHandler, Envelope, MessageType, Payload, TokenProvider};
pub use config::Config;
pub use env::Environment;
