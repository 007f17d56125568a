pub mod analysis;
pub mod config;
pub mod error;
pub mod format;
pub mod gpxxml;
pub mod model;

pub use analysis::{MetricsReport, analyze_document, analyze_track};
pub use config::{AnalysisConfig, DistanceUnit};
pub use error::{AnalysisError, ConfigError, ParseError, ParseErrorKind, Warning, WarningKind};
pub use gpxxml::{Decoded, decode};
pub use model::{Document, Point, PointLocation, Route, Segment, Track};

/// Mean Earth radius in meters (WGS84 mean: 6371008.8m).
pub const EARTH_RADIUS_METERS: f64 = 6371000.0;

/// Great circle distance in meters between two coordinates, using the haversine formula.
///
/// A spherical Earth is accurate enough for activity tracks; ellipsoid
/// formulas such as Vincenty's only pay off over long distances.
///
/// References:
/// - R.W. Sinnott, "Virtues of the Haversine", Sky and Telescope, vol. 68, no. 2, 1984, p. 159
/// - https://www.movable-type.co.uk/scripts/latlong.html
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    // a = sin²(Δφ/2) + cos φ1 ⋅ cos φ2 ⋅ sin²(Δλ/2)
    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);

    // c = 2 ⋅ atan2(√a, √(1−a))
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

pub fn distance_between(p1: &Point, p2: &Point) -> f64 {
    haversine_distance(p1.lat(), p1.lon(), p2.lat(), p2.lon())
}

/// Seconds elapsed from `p1` to `p2`, if both carry a timestamp.
pub fn seconds_between(p1: &Point, p2: &Point) -> Option<f64> {
    match (p1.time(), p2.time()) {
        (Some(t1), Some(t2)) => Some((t2 - t1).as_seconds_f64()),
        _ => None,
    }
}

/// Speed in m/s between two timestamped points.
///
/// `None` when a timestamp is missing or time does not advance, so callers
/// never divide by zero.
pub fn calculate_speed(p1: &Point, p2: &Point) -> Option<f64> {
    let time_diff = seconds_between(p1, p2)?;

    if time_diff > 0.0 {
        Some(distance_between(p1, p2) / time_diff)
    } else {
        None
    }
}
