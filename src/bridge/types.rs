//! Data types for the bridge protocol.
//!
//! This module defines the envelope exchanged with the hosted web page and
//! the records carried inside it.
//!
//! # Wire Format
//!
//! ```json
//! {"type":"LOADING","platform":"ios","data":{"setting":true}}
//! ```
//!
//! Every payload member is optional and omitted when absent. The handshake
//! travels in clear; every other envelope is sealed with
//! [`crate::crypto::encrypt`] before it reaches the transport.

// Rust guideline compliant 2025-01

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Envelope message type.
///
/// Unknown wire tags decode to [`MessageType::Unrecognized`] instead of
/// failing, so a newer web page never breaks an older host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Public key exchange (cleartext).
    Handshake,
    /// Test message used by the web team.
    Sample,
    /// Token renewal ping-pong.
    Token,
    /// Native → web location update.
    UserLocation,
    /// Deep-link path to restore on next launch.
    Path,
    /// Launch external maps with directions.
    Navigate,
    /// Launch the external browser.
    Browser,
    /// Web page loading indicator.
    Loading,
    /// User charging filters to persist.
    Filters,
    /// Support widget opened/closed.
    Intercom,
    /// Any tag this build does not know.
    Unrecognized,
}

impl MessageType {
    /// Wire tag for this type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Handshake => "HANDSHAKE",
            Self::Sample => "SAMPLE",
            Self::Token => "TOKEN",
            Self::UserLocation => "USER_LOCATION",
            Self::Path => "PATH",
            Self::Navigate => "NAVIGATE",
            Self::Browser => "BROWSER",
            Self::Loading => "LOADING",
            Self::Filters => "FILTER",
            Self::Intercom => "INTERCOM",
            Self::Unrecognized => "UNRECOGNIZED",
        }
    }

    /// Map a wire tag to a type. Never fails.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "HANDSHAKE" => Self::Handshake,
            "SAMPLE" => Self::Sample,
            "TOKEN" => Self::Token,
            "USER_LOCATION" => Self::UserLocation,
            "PATH" => Self::Path,
            "NAVIGATE" => Self::Navigate,
            "BROWSER" => Self::Browser,
            "LOADING" => Self::Loading,
            "FILTER" => Self::Filters,
            "INTERCOM" => Self::Intercom,
            _ => Self::Unrecognized,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::from_tag(&tag))
    }
}

/// Sender platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Native iOS host (this side).
    #[default]
    Ios,
    /// Hosted web page.
    Web,
    /// Native Android host.
    Android,
}

/// A latitude/longitude pair in degrees.
///
/// Two coordinates are equal iff both components are bit-for-bit equal,
/// which keeps `Eq` and `Hash` consistent for floating point values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl PartialEq for Coordinate {
    fn eq(&self, other: &Self) -> bool {
        self.latitude.to_bits() == other.latitude.to_bits()
            && self.longitude.to_bits() == other.longitude.to_bits()
    }
}

impl Eq for Coordinate {}

impl Hash for Coordinate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.latitude.to_bits().hash(state);
        self.longitude.to_bits().hash(state);
    }
}

/// User charging filters.
///
/// Opaque to the protocol: persisted from a `FILTER` message and sent back
/// verbatim in the next handshake. Members this build does not model are
/// kept in `extra` so nothing is lost on the round trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filters {
    /// Identity of the user the filters belong to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firebase_uid: Option<String>,
    /// Only show available chargers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
    /// Connector types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plug: Option<Vec<String>>,
    /// Minimum charger power in kW.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_power: Option<i64>,
    /// Minimum number of EVSEs at the location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evse_count: Option<i64>,
    /// Unmodelled members, preserved as-is.
    #[serde(flatten, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Envelope payload.
///
/// A superset record: each message type uses a subset of these members.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Host application identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    /// Sender's X25519 public key (base64), handshake only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<String>,
    /// Last known user coordinate, handshake only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinate>,
    /// Cached user profile (arbitrary JSON object), handshake only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<serde_json::Value>,
    /// Persisted charging filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Filters>,
    /// Free-form string (token, URL, path).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Latitude in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    /// Longitude in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Charge point operator name (used as the map pin label).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    /// Boolean flag (loading, intercom open).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting: Option<bool>,
}

impl Payload {
    /// Payload carrying only `value`.
    #[must_use]
    pub fn value(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    /// Payload carrying only `setting`.
    #[must_use]
    pub fn setting(setting: bool) -> Self {
        Self {
            setting: Some(setting),
            ..Self::default()
        }
    }

    /// Payload carrying `latitude`/`longitude`.
    #[must_use]
    pub fn location(coordinate: Coordinate) -> Self {
        Self {
            latitude: Some(coordinate.latitude),
            longitude: Some(coordinate.longitude),
            ..Self::default()
        }
    }

    /// The `latitude`/`longitude` pair, if both are present.
    #[must_use]
    pub fn coordinate(&self) -> Option<Coordinate> {
        Some(Coordinate::new(self.latitude?, self.longitude?))
    }
}

/// Tagged message exchanged over the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type.
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Sender platform. Defaults to the native platform.
    #[serde(default)]
    pub platform: Platform,
    /// Payload.
    #[serde(default)]
    pub data: Payload,
}

impl Envelope {
    /// Create a native (iOS) envelope.
    #[must_use]
    pub fn new(message_type: MessageType, data: Payload) -> Self {
        Self {
            message_type,
            platform: Platform::Ios,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    // ========== MessageType Tests ==========

    #[test]
    fn test_message_type_tags() {
        let all = [
            MessageType::Handshake,
            MessageType::Sample,
            MessageType::Token,
            MessageType::UserLocation,
            MessageType::Path,
            MessageType::Navigate,
            MessageType::Browser,
            MessageType::Loading,
            MessageType::Filters,
            MessageType::Intercom,
        ];
        for t in all {
            assert_eq!(MessageType::from_tag(t.as_str()), t);
        }
        assert_eq!(MessageType::Filters.as_str(), "FILTER");
    }

    #[test]
    fn test_unknown_tag_is_unrecognized() {
        assert_eq!(MessageType::from_tag("SOMETHING_NEW"), MessageType::Unrecognized);
        assert_eq!(MessageType::from_tag("handshake"), MessageType::Unrecognized);
        assert_eq!(MessageType::from_tag(""), MessageType::Unrecognized);
    }

    // ========== Serialization Tests ==========

    #[test]
    fn test_envelope_serialization_omits_absent_fields() {
        let env = Envelope::new(MessageType::Loading, Payload::setting(true));
        let json = serde_json::to_string(&env).unwrap();
        assert_eq!(json, r#"{"type":"LOADING","platform":"ios","data":{"setting":true}}"#);
    }

    #[test]
    fn test_platform_defaults_to_ios() {
        let env: Envelope = serde_json::from_str(r#"{"type":"TOKEN","data":{}}"#).unwrap();
        assert_eq!(env.platform, Platform::Ios);

        let env: Envelope =
            serde_json::from_str(r#"{"type":"TOKEN","platform":"web"}"#).unwrap();
        assert_eq!(env.platform, Platform::Web);
        assert_eq!(env.data, Payload::default());
    }

    #[test]
    fn test_filters_preserve_unknown_members() {
        let json = r#"{"firebase_uid":"u1","plug":["CCS","Type2"],"min_power":50,"sort":"distance"}"#;
        let filters: Filters = serde_json::from_str(json).unwrap();
        assert_eq!(filters.firebase_uid.as_deref(), Some("u1"));
        assert_eq!(filters.min_power, Some(50));
        assert_eq!(filters.extra.get("sort"), Some(&serde_json::json!("distance")));

        let back: serde_json::Value = serde_json::to_value(&filters).unwrap();
        assert_eq!(back, serde_json::from_str::<serde_json::Value>(json).unwrap());
    }

    #[test]
    fn test_payload_coordinate_requires_both_components() {
        let mut payload = Payload {
            latitude: Some(51.5),
            ..Payload::default()
        };
        assert_eq!(payload.coordinate(), None);
        payload.longitude = Some(-0.12);
        assert_eq!(payload.coordinate(), Some(Coordinate::new(51.5, -0.12)));
    }

    // ========== Coordinate Equality Tests ==========

    #[test]
    fn test_coordinate_equality_is_exact() {
        let a = Coordinate::new(51.5074, -0.1278);
        let b = Coordinate::new(51.5074, -0.1278);
        let c = Coordinate::new(51.5074, -0.127_800_000_000_1);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<Coordinate> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }
}
