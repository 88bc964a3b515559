//! Secure bridge between the native host and the hosted web page.
//!
//! This module provides an encrypted, typed message channel carried over a
//! web view's untyped script-messaging mechanism.
//!
//! # Architecture
//!
//! ```text
//! Web page ──(string)──▶ BridgeHandle ──▶ BridgeRuntime task
//!                                              │
//!                                   SecureBridgeSession
//!                                     │  try_decode ─▶ Plain: handshake
//!                                     │            └─▶ Cipher: decrypt + decode
//!                                     ▼
//!                              dispatch by MessageType ──▶ BridgeHandler
//!                                     │
//!                    encode + encrypt + escape ──▶ TransportAdapter ──▶ Web page
//! ```
//!
//! # Modules
//!
//! - [`types`] - Envelope, payload and filter records
//! - [`codec`] - JSON encoding, decode error classification, quote escaping
//! - [`key_exchange`] - X25519 key pairs and agreement
//! - [`session`] - Handshake state machine and dispatch
//! - [`runtime`] - Background task and cloneable handle
//! - [`transport`] - Web view boundary and script queue
//! - [`handler`] - Host callbacks and token provider
//! - [`peer`] - In-process web counterpart
//! - [`error`] - Error taxonomy

pub mod codec;
pub mod error;
pub mod handler;
pub mod key_exchange;
pub mod peer;
pub mod runtime;
pub mod session;
pub mod transport;
pub mod types;

pub use error::{BridgeError, CipherError, CodecError, KeyAgreementError, TokenError, TransportError};
pub use handler::{allows_keyboard_changes, BridgeHandler, TokenProvider};
pub use runtime::{BridgeHandle, BridgeRuntime};
pub use session::{SecureBridgeSession, SessionState};
pub use transport::{ScriptQueue, ScriptReceiver, TransportAdapter, LOG_CHANNEL, MESSAGE_CHANNEL};
pub use types::{Coordinate, Envelope, Filters, MessageType, Payload, Platform};
