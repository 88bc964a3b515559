//! Transport boundary to the web view.
//!
//! Outbound, the session hands a ready payload string to a
//! [`TransportAdapter`], which wraps it in a `window.postMessage('...')`
//! script call. Inbound, the page posts to two named script-message
//! channels: one for envelopes and one for free-text console output.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐  script   ┌──────────────┐  evaluate  ┌──────────┐
//! │ bridge runtime │──────────▶│ ScriptQueue  │───────────▶│ web view │
//! │ (background)   │           │ (UI thread)  │            │          │
//! └────────────────┘           └──────────────┘            └──────────┘
//!         ▲                                                      │
//!         └──────── toggleMessageHandler / logHandler ◀──────────┘
//! ```
//!
//! Script evaluation is UI-thread affine. Everything before it (JSON,
//! encryption, key agreement) runs on the runtime task; [`ScriptQueue`]
//! is the hand-off point the host drains on its UI thread.

use tokio::sync::mpsc;

use super::error::TransportError;

/// Script-message channel carrying envelopes.
pub const MESSAGE_CHANNEL: &str = "toggleMessageHandler";

/// Script-message channel carrying console output.
pub const LOG_CHANNEL: &str = "logHandler";

/// User script the host installs at document end so `console.log` reaches
/// [`LOG_CHANNEL`].
pub const LOG_CAPTURE_SCRIPT: &str = "function captureLog(msg) { window.webkit.messageHandlers.logHandler.postMessage(msg); } window.console.log = captureLog;";

/// Delivers payload strings into the page.
pub trait TransportAdapter: Send + Sync {
    /// Deliver `payload` unmodified to the page's `postMessage` entry point.
    ///
    /// `payload` must already be quote-escaped.
    fn send(&self, payload: &str) -> Result<(), TransportError>;
}

/// Build the script that hands `payload` to the page.
#[must_use]
pub fn post_message_script(payload: &str) -> String {
    format!(
        "javascript:(function() {{ if (typeof window.postMessage === 'function') {{ window.postMessage('{payload}'); }} }})()"
    )
}

/// A message posted by the page, classified by channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptMessage {
    /// Raw envelope string (cleartext handshake or ciphertext).
    Envelope(String),
    /// Console line.
    Log(String),
    /// The envelope channel delivered a non-string body.
    Corrupted,
}

impl ScriptMessage {
    /// Classify a script message by channel name.
    ///
    /// `body` is `None` when the page posted something other than a string.
    /// Returns `None` for channels the bridge does not own.
    #[must_use]
    pub fn classify(channel: &str, body: Option<&str>) -> Option<Self> {
        match (channel, body) {
            (MESSAGE_CHANNEL, Some(body)) => Some(Self::Envelope(body.to_string())),
            (MESSAGE_CHANNEL, None) => Some(Self::Corrupted),
            (LOG_CHANNEL, body) => Some(Self::Log(body.unwrap_or_default().to_string())),
            _ => {
                log::warn!("Ignoring script message on unknown channel {channel}");
                None
            }
        }
    }
}

/// Whether a console line may be written to the host log.
///
/// Lines mentioning a `"key"` member are dropped so key material never
/// lands in logs.
#[must_use]
pub fn is_loggable(line: &str) -> bool {
    !line.contains("\"key\"")
}

/// Forward a console line to the host log, unless it carries key material.
pub fn forward_console_line(line: &str) {
    if is_loggable(line) {
        log::debug!("[web] {line}");
    }
}

/// [`TransportAdapter`] that queues scripts for evaluation on the UI thread.
#[derive(Debug, Clone)]
pub struct ScriptQueue {
    tx: mpsc::UnboundedSender<String>,
}

impl ScriptQueue {
    /// Create a queue and the receiver the UI thread drains.
    #[must_use]
    pub fn channel() -> (Self, ScriptReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, ScriptReceiver { rx })
    }
}

impl TransportAdapter for ScriptQueue {
    fn send(&self, payload: &str) -> Result<(), TransportError> {
        self.tx
            .send(post_message_script(payload))
            .map_err(|_closed| TransportError::Unavailable)
    }
}

/// UI-side end of a [`ScriptQueue`].
#[derive(Debug)]
pub struct ScriptReceiver {
    rx: mpsc::UnboundedReceiver<String>,
}

impl ScriptReceiver {
    /// Wait for the next script. `None` once every queue handle is dropped.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Take the next script if one is ready.
    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    /// Take every script that is ready.
    pub fn drain(&mut self) -> Vec<String> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

/// Extract the payload from a script built by [`post_message_script`].
///
/// The result is still quote-escaped.
#[must_use]
pub fn payload_from_script(script: &str) -> Option<&str> {
    let start = script.find("window.postMessage('")? + "window.postMessage('".len();
    let end = script.rfind("'); }")?;
    script.get(start..end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_message_script_format() {
        assert_eq!(
            post_message_script("abc"),
            "javascript:(function() { if (typeof window.postMessage === 'function') { window.postMessage('abc'); } })()"
        );
    }

    #[test]
    fn test_payload_from_script_roundtrip() {
        let payload = r#"{"value":"o\'brien"}"#;
        let script = post_message_script(payload);
        assert_eq!(payload_from_script(&script), Some(payload));
        assert_eq!(payload_from_script("alert(1)"), None);
    }

    #[test]
    fn test_classify_channels() {
        assert_eq!(
            ScriptMessage::classify(MESSAGE_CHANNEL, Some("x")),
            Some(ScriptMessage::Envelope("x".into()))
        );
        assert_eq!(
            ScriptMessage::classify(MESSAGE_CHANNEL, None),
            Some(ScriptMessage::Corrupted)
        );
        assert_eq!(
            ScriptMessage::classify(LOG_CHANNEL, Some("hello")),
            Some(ScriptMessage::Log("hello".into()))
        );
        assert_eq!(ScriptMessage::classify("somethingElse", Some("x")), None);
    }

    #[test]
    fn test_key_lines_are_not_loggable() {
        assert!(is_loggable("page loaded"));
        assert!(is_loggable("keyboard shown"));
        assert!(!is_loggable(r#"{"type":"HANDSHAKE","data":{"key":"abc"}}"#));
    }

    #[tokio::test]
    async fn test_script_queue_delivers_in_order() {
        let (queue, mut receiver) = ScriptQueue::channel();
        queue.send("one").unwrap();
        queue.send("two").unwrap();

        let first = receiver.recv().await.unwrap();
        assert_eq!(payload_from_script(&first), Some("one"));
        let rest = receiver.drain();
        assert_eq!(rest.len(), 1);
        assert_eq!(payload_from_script(&rest[0]), Some("two"));
    }

    #[test]
    fn test_script_queue_unavailable_after_receiver_dropped() {
        let (queue, receiver) = ScriptQueue::channel();
        drop(receiver);
        assert_eq!(queue.send("x"), Err(TransportError::Unavailable));
    }
}
