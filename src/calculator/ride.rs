//! Ride geometry and fare math.

use crate::config::FareConfig;
use crate::error::{Axis, CoreError, CoreResult};
use crate::model::Coordinates;

/// Mean earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

const MS_PER_MINUTE: f64 = 60_000.0;

/// Check that a coordinate pair is on the globe.
///
/// Latitude must be within [-90, 90] and longitude within [-180, 180];
/// NaN is rejected as out of range.
pub fn validate_coordinates(point: Coordinates) -> CoreResult<()> {
    if !(-90.0..=90.0).contains(&point.latitude) {
        return Err(CoreError::InvalidCoordinate {
            axis: Axis::Latitude,
            value: point.latitude,
        });
    }
    if !(-180.0..=180.0).contains(&point.longitude) {
        return Err(CoreError::InvalidCoordinate {
            axis: Axis::Longitude,
            value: point.longitude,
        });
    }
    Ok(())
}

/// Great-circle distance between two points in kilometres.
///
/// Exactly 0 for identical points and symmetric in its arguments.
pub fn compute_distance_km(from: Coordinates, to: Coordinates) -> f64 {
    if from == to {
        return 0.0;
    }

    // abs() keeps d(a, b) and d(b, a) bit-identical.
    let delta_lat = (to.latitude - from.latitude).abs().to_radians();
    let delta_lng = (to.longitude - from.longitude).abs().to_radians();
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Fare in cents for a ride of the given length and distance.
///
/// `base + minutes * time_rate + km * distance_rate`, rounded to the cent.
/// A ride with no elapsed time and no distance costs nothing. Negative
/// inputs count as zero.
pub fn compute_fare(fare: &FareConfig, elapsed_ms: i64, distance_km: f64) -> i64 {
    let elapsed_ms = elapsed_ms.max(0);
    let distance_km = if distance_km.is_finite() {
        distance_km.max(0.0)
    } else {
        0.0
    };

    if elapsed_ms == 0 && distance_km == 0.0 {
        return 0;
    }

    let minutes = elapsed_ms as f64 / MS_PER_MINUTE;
    let cents = fare.base_fare_cents
        + minutes * fare.time_rate_cents_per_min
        + distance_km * fare.distance_rate_cents_per_km;

    cents.round() as i64
}
