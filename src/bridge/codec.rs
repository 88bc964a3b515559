//! Envelope codec.
//!
//! Serializes [`Envelope`]s to compact JSON and back, classifies decode
//! failures into [`CodecError`], and provides the quote escaping required
//! before a payload is interpolated into a single-quoted script string.

use serde_json::error::Category;

use super::error::CodecError;
use super::types::Envelope;

/// Result of classifying a raw inbound string.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// The string parsed as a cleartext envelope.
    Plain(Envelope),
    /// The string did not parse; treat it as ciphertext.
    Cipher(String),
}

/// Serialize an envelope, omitting absent payload members.
pub fn encode(envelope: &Envelope) -> Result<String, CodecError> {
    serde_json::to_string(envelope).map_err(|e| CodecError::Malformed(e.to_string()))
}

/// Deserialize an envelope.
///
/// Unknown `type` tags decode to [`MessageType::Unrecognized`]. Any other
/// structural problem is reported with a coarse reason.
///
/// [`MessageType::Unrecognized`]: super::types::MessageType::Unrecognized
pub fn decode(bytes: &[u8]) -> Result<Envelope, CodecError> {
    serde_json::from_slice(bytes).map_err(classify)
}

/// Try a cleartext parse first, falling back to ciphertext.
///
/// Cleartext is only expected for handshakes; everything else arrives
/// sealed and will not parse as JSON.
#[must_use]
pub fn try_decode(raw: &str) -> InboundFrame {
    match decode(raw.as_bytes()) {
        Ok(envelope) => InboundFrame::Plain(envelope),
        Err(e) => {
            log::trace!("Inbound frame is not cleartext ({e}), treating as ciphertext");
            InboundFrame::Cipher(raw.to_string())
        }
    }
}

/// Escape single quotes for embedding in a single-quoted script string.
#[must_use]
pub fn escape(content: &str) -> String {
    content.replace('\'', "\\'")
}

/// Inverse of [`escape`].
#[must_use]
pub fn unescape(content: &str) -> String {
    content.replace("\\'", "'")
}

fn classify(err: serde_json::Error) -> CodecError {
    let message = err.to_string();
    match err.classify() {
        Category::Data if message.starts_with("missing field") => CodecError::MissingField(message),
        Category::Data => CodecError::TypeMismatch(message),
        Category::Syntax | Category::Eof | Category::Io => CodecError::Malformed(message),
    }
}
