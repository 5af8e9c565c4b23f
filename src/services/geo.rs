//! Distance, duration and elevation figures derived from a point sequence.

use crate::models::TrackPoint;

/// Mean Earth radius used for haversine distances (km).
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two coordinates in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Cumulative haversine distance along the points. Zero for fewer than two points.
pub fn total_distance_km(points: &[TrackPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_km(w[0].lat, w[0].lon, w[1].lat, w[1].lon))
        .sum()
}

/// Minutes needed to cover `distance_km` at `speed_kmh`, rounded to the nearest minute.
///
/// Returns 0 for a non-positive or non-finite speed.
pub fn duration_minutes(distance_km: f64, speed_kmh: f64) -> i32 {
    if !speed_kmh.is_finite() || speed_kmh <= 0.0 {
        tracing::warn!("duration_minutes called with speed {}, returning 0", speed_kmh);
        return 0;
    }
    (distance_km / speed_kmh * 60.0).round() as i32
}

/// Lowest elevation along the points, or 0.0 for an empty sequence.
pub fn min_elevation(points: &[TrackPoint]) -> f64 {
    points
        .iter()
        .map(|p| p.elevation)
        .reduce(f64::min)
        .unwrap_or(0.0)
}

/// Highest elevation along the points, or 0.0 for an empty sequence.
pub fn max_elevation(points: &[TrackPoint]) -> f64 {
    points
        .iter()
        .map(|p| p.elevation)
        .reduce(f64::max)
        .unwrap_or(0.0)
}
