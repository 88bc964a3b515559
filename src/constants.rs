//! Crate-wide constants.
//!
//! Timeouts, retry policy and location filtering thresholds live here so
//! the defaults used by [`crate::config::Config`] are discoverable in one
//! place.
//!
//! # Categories
//!
//! - **Timeouts**: network and token refresh bounds
//! - **Retry**: profile preload retry policy
//! - **Location**: fix filtering and debounce
//! - **Storage**: saved path freshness
//! - **Runtime**: bridge command queue sizing

use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// HTTP client request timeout for the profile preload.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Upper bound on a single token refresh during a handshake or renewal.
pub const TOKEN_REFRESH_TIMEOUT: Duration = Duration::from_secs(15);

// ============================================================================
// Retry
// ============================================================================

/// Extra attempts after the first failed profile request.
pub const PROFILE_RETRY_COUNT: u32 = 2;

/// Fixed delay between profile request attempts.
pub const PROFILE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Message shown when the profile service fails without a usable body.
pub const GENERIC_FAILURE_MESSAGE: &str = "Sorry something went wrong. Please try again later.";

// ============================================================================
// Location
// ============================================================================

/// Quiet period before an accepted location fix is forwarded.
pub const LOCATION_DEBOUNCE: Duration = Duration::from_secs(1);

/// Fixes closer than this to the last accepted fix are dropped.
pub const LOCATION_MIN_DISTANCE_METERS: f64 = 5.0;

/// Mean earth radius used by the haversine distance.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

// ============================================================================
// Storage
// ============================================================================

/// A saved deep-link path is usable for this many whole hours.
pub const SAVED_PATH_MAX_AGE_HOURS: i64 = 12;

// ============================================================================
// Runtime
// ============================================================================

/// Capacity of the bridge runtime's command queue.
pub const COMMAND_QUEUE_CAPACITY: usize = 256;
