//! Bridge runtime - drives a session from a background task.
//!
//! The session owns mutable key state and must see inbound messages one at
//! a time. The runtime moves it onto a dedicated tokio task and exposes a
//! cloneable, `Send + Sync` [`BridgeHandle`] that the web view callbacks,
//! the location tracker and the host UI use to talk to it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐        ┌──────────────────────────────────┐
//! │ web view     │──cmd──▶│         BRIDGE RUNTIME TASK       │
//! │ callbacks    │        │                                  │
//! └──────────────┘        │  SecureBridgeSession             │
//! ┌──────────────┐        │  run() loop                      │──▶ TransportAdapter
//! │ location     │──cmd──▶│                                  │
//! │ tracker      │        │                                  │
//! └──────────────┘        └──────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let handle = BridgeRuntime::start(session);
//!
//! // From the script-message callback
//! handle.on_script_message("toggleMessageHandler", Some(body))?;
//!
//! // From anywhere
//! handle.send(MessageType::Sample, Payload::value("hi")).await?;
//! handle.shutdown().await;
//! ```

use tokio::sync::{mpsc, oneshot};

use super::error::{BridgeError, TransportError};
use super::session::SecureBridgeSession;
use super::transport::{self, ScriptMessage};
use super::types::{Coordinate, Envelope, MessageType, Payload};
use crate::constants::COMMAND_QUEUE_CAPACITY;

/// Commands processed by the runtime task.
pub enum BridgeCommand {
    /// Raw string from the envelope channel.
    Inbound(String),
    /// The envelope channel delivered a non-string body.
    Corrupted,
    /// Seal and deliver an application message.
    Send {
        /// Envelope to send.
        envelope: Envelope,
        /// Channel to send the result.
        reply: oneshot::Sender<Result<(), BridgeError>>,
    },
    /// Record the user's coordinate and forward it once established.
    UpdateLocation(Coordinate),
    /// Query whether the handshake has completed.
    IsEstablished {
        /// Channel to send the result.
        reply: oneshot::Sender<bool>,
    },
    /// Release the shared secret and stop.
    Shutdown,
}

impl std::fmt::Debug for BridgeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inbound(raw) => f
                .debug_struct("Inbound")
                .field("len", &raw.len())
                .finish_non_exhaustive(),
            Self::Corrupted => write!(f, "Corrupted"),
            Self::Send { envelope, .. } => f
                .debug_struct("Send")
                .field("message_type", &envelope.message_type)
                .finish_non_exhaustive(),
            Self::UpdateLocation(_) => write!(f, "UpdateLocation"),
            Self::IsEstablished { .. } => write!(f, "IsEstablished"),
            Self::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Handle for talking to a running bridge.
///
/// This is Send + Sync and can be cloned and shared across threads.
#[derive(Clone, Debug)]
pub struct BridgeHandle {
    tx: mpsc::Sender<BridgeCommand>,
}

impl BridgeHandle {
    /// Route a script message posted by the page.
    ///
    /// Console lines are logged here and never reach the session. Safe to
    /// call from a non-async UI callback.
    pub fn on_script_message(&self, channel: &str, body: Option<&str>) -> Result<(), TransportError> {
        match ScriptMessage::classify(channel, body) {
            Some(ScriptMessage::Envelope(raw)) => self.enqueue(BridgeCommand::Inbound(raw)),
            Some(ScriptMessage::Corrupted) => self.enqueue(BridgeCommand::Corrupted),
            Some(ScriptMessage::Log(line)) => {
                transport::forward_console_line(&line);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Record a coordinate; forwarded as `USER_LOCATION` once established.
    pub fn update_location(&self, coordinate: Coordinate) -> Result<(), TransportError> {
        self.enqueue(BridgeCommand::UpdateLocation(coordinate))
    }

    /// Seal and deliver an application message.
    pub async fn send(&self, message_type: MessageType, data: Payload) -> Result<(), BridgeError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(BridgeCommand::Send {
                envelope: Envelope::new(message_type, data),
                reply: reply_tx,
            })
            .await
            .map_err(|_closed| TransportError::Closed)?;

        reply_rx.await.map_err(|_closed| TransportError::Closed)?
    }

    /// Whether the handshake has completed. `false` once shut down.
    pub async fn is_established(&self) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(BridgeCommand::IsEstablished { reply: reply_tx })
            .await
            .is_err()
        {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    /// Tear the bridge down. Idempotent.
    pub async fn shutdown(&self) {
        if self.tx.send(BridgeCommand::Shutdown).await.is_err() {
            log::debug!("Bridge runtime already shut down");
        }
    }

    /// Whether the runtime task has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn enqueue(&self, command: BridgeCommand) -> Result<(), TransportError> {
        self.tx.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(command) => {
                log::warn!("Bridge command queue full, dropping {command:?}");
                TransportError::Unavailable
            }
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }
}

/// Runs a [`SecureBridgeSession`] on its own task.
#[derive(Debug)]
pub struct BridgeRuntime;

impl BridgeRuntime {
    /// Spawn the runtime task. Must be called from within a tokio runtime.
    pub fn start(session: SecureBridgeSession) -> BridgeHandle {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        tokio::spawn(Self::run(session, rx));
        log::info!("Started bridge runtime");
        BridgeHandle { tx }
    }

    async fn run(mut session: SecureBridgeSession, mut rx: mpsc::Receiver<BridgeCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                BridgeCommand::Inbound(raw) => session.handle_inbound(&raw).await,

                BridgeCommand::Corrupted => session.handle_corrupted(),

                BridgeCommand::Send { envelope, reply } => {
                    let _ = reply.send(session.send_envelope(envelope));
                }

                BridgeCommand::UpdateLocation(coordinate) => {
                    session.set_last_coordinate(coordinate);
                    if session.is_established() {
                        if let Err(e) =
                            session.send(MessageType::UserLocation, Payload::location(coordinate))
                        {
                            log::warn!("Failed to forward location: {e}");
                        }
                    }
                }

                BridgeCommand::IsEstablished { reply } => {
                    let _ = reply.send(session.is_established());
                }

                BridgeCommand::Shutdown => {
                    log::info!("Bridge runtime shutting down");
                    break;
                }
            }
        }

        session.teardown();
    }
}
