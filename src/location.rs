//! User location tracking.
//!
//! The host feeds raw fixes from its platform location service into a
//! [`LocationTracker`]. Fixes that barely moved are dropped, the rest are
//! debounced, and the settled coordinate is handed to the bridge, which
//! remembers it for the next handshake and forwards it as `USER_LOCATION`
//! once established.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::bridge::{BridgeHandle, Coordinate};
use crate::constants::{EARTH_RADIUS_METERS, LOCATION_DEBOUNCE, LOCATION_MIN_DISTANCE_METERS};
use crate::debounce::Debouncer;

/// Great-circle distance between two coordinates (haversine).
#[must_use]
pub fn distance_meters(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Filters and debounces location fixes.
#[derive(Debug)]
pub struct LocationTracker {
    last_accepted: Mutex<Option<Coordinate>>,
    min_distance: f64,
    debouncer: Debouncer<Coordinate>,
}

impl LocationTracker {
    /// Tracker delivering settled coordinates to `sink`.
    ///
    /// Must be created and fed from within a tokio runtime.
    pub fn new(debounce: Duration, sink: impl Fn(Coordinate) + Send + Sync + 'static) -> Self {
        Self {
            last_accepted: Mutex::new(None),
            min_distance: LOCATION_MIN_DISTANCE_METERS,
            debouncer: Debouncer::new(debounce, sink),
        }
    }

    /// Tracker feeding a running bridge.
    pub fn for_bridge(handle: BridgeHandle, debounce: Duration) -> Self {
        Self::new(debounce, move |coordinate| {
            if let Err(e) = handle.update_location(coordinate) {
                log::debug!("Dropping location update: {e}");
            }
        })
    }

    /// Tracker feeding a running bridge with the default quiet period.
    pub fn with_defaults(handle: BridgeHandle) -> Self {
        Self::for_bridge(handle, LOCATION_DEBOUNCE)
    }

    /// Submit a raw fix. Returns `false` if it was within the minimum
    /// distance of the last accepted fix and dropped.
    pub fn report(&self, coordinate: Coordinate) -> bool {
        let mut last = self
            .last_accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(previous) = *last {
            if distance_meters(previous, coordinate) <= self.min_distance {
                return false;
            }
        }

        *last = Some(coordinate);
        drop(last);
        self.debouncer.send(coordinate);
        true
    }

    /// Last fix that passed the distance filter.
    #[must_use]
    pub fn last_accepted(&self) -> Option<Coordinate> {
        *self
            .last_accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop any pending update. Called on teardown.
    pub fn cancel(&self) {
        self.debouncer.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    // ========== Distance Tests ==========

    #[test]
    fn test_distance_zero_for_same_point() {
        let p = Coordinate::new(51.5074, -0.1278);
        assert!(distance_meters(p, p).abs() < 1e-9);
    }

    #[test]
    fn test_distance_known_values() {
        // One degree of latitude is about 111.19 km on a 6371 km sphere.
        let d = distance_meters(Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 0.0));
        assert!((d - 111_194.9).abs() < 1.0, "got {d}");

        let london = Coordinate::new(51.5074, -0.1278);
        let paris = Coordinate::new(48.8566, 2.3522);
        let d = distance_meters(london, paris);
        assert!((d - 343_500.0).abs() < 1_000.0, "got {d}");
    }

    // ========== Tracker Tests ==========

    fn recording_tracker() -> (LocationTracker, Arc<Mutex<Vec<Coordinate>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let tracker = LocationTracker::new(Duration::from_secs(1), move |c| {
            sink.lock().unwrap().push(c);
        });
        (tracker, seen)
    }

    #[tokio::test(start_paused = true)]
    async fn test_small_moves_are_dropped() {
        let (tracker, seen) = recording_tracker();
        let start = Coordinate::new(51.5, -0.12);

        assert!(tracker.report(start));
        // ~1.1 m north.
        assert!(!tracker.report(Coordinate::new(51.500_01, -0.12)));
        assert_eq!(tracker.last_accepted(), Some(start));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(*seen.lock().unwrap(), vec![start]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_fixes_are_debounced() {
        let (tracker, seen) = recording_tracker();
        let a = Coordinate::new(51.5, -0.12);
        let b = Coordinate::new(51.6, -0.12);
        let c = Coordinate::new(51.7, -0.12);

        tracker.report(a);
        tracker.report(b);
        tokio::time::sleep(Duration::from_millis(500)).await;
        tracker.report(c);
        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(*seen.lock().unwrap(), vec![c]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_fix() {
        let (tracker, seen) = recording_tracker();
        tracker.report(Coordinate::new(10.0, 10.0));
        tracker.cancel();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(seen.lock().unwrap().is_empty());
    }
}
