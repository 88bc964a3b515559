//! Collaborator interfaces implemented by the host application.
//!
//! - [`BridgeHandler`] receives everything the session wants the UI to act on.
//! - [`TokenProvider`] supplies bearer tokens on demand.

use async_trait::async_trait;

use super::error::TokenError;
use super::types::{Coordinate, Envelope};

/// Receiver for bridge events, implemented by whatever owns UI state.
///
/// Methods are invoked from the bridge runtime task; implementations that
/// touch UI must hop to their UI thread themselves.
pub trait BridgeHandler: Send + Sync {
    /// An envelope with no dedicated callback (e.g. `PATH`, `SAMPLE`).
    fn on_message(&self, envelope: &Envelope);

    /// A handshake or per-message failure. Never fatal.
    fn on_error(&self, message: &str);

    /// Web page loading indicator changed.
    fn on_loading_changed(&self, loading: bool);

    /// Handshake completed; the bridge can carry application messages.
    fn on_established(&self) {}

    /// Open external maps with driving directions to `coordinate`.
    fn on_navigate(&self, coordinate: Coordinate, label: Option<&str>) {
        log::debug!(
            "Navigate to {},{} ({}) ignored by handler",
            coordinate.latitude,
            coordinate.longitude,
            label.unwrap_or("unnamed")
        );
    }

    /// Open `url` in the external browser.
    fn on_open_url(&self, url: &str) {
        log::debug!("Open URL {url} ignored by handler");
    }

    /// Support widget opened (`true`) or closed (`false`).
    ///
    /// Hosts suppress their own keyboard avoidance while it is open.
    fn on_intercom_changed(&self, open: bool) {
        log::debug!("Intercom open={open} ignored by handler");
    }
}

/// Supplies and refreshes bearer tokens.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a fresh token. May hit the network.
    async fn refresh_token(&self) -> Result<String, TokenError>;
}

/// Whether the host should keep its keyboard avoidance enabled on `path`.
///
/// Location details pages manage the keyboard themselves.
#[must_use]
pub fn allows_keyboard_changes(path: &str) -> bool {
    !path.contains("/locations/")
}
