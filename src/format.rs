//! Human-readable rendering of report values.

use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

use crate::config::DistanceUnit;

const FEET_PER_METER: f64 = 3.280_839_895;

pub fn format_distance(meters: f64, unit: DistanceUnit) -> String {
    let symbol = unit.symbol();
    match unit {
        DistanceUnit::Meters => format!("{meters:.1} {symbol}"),
        // Short distances fall back to the smaller unit of the same system.
        DistanceUnit::Kilometers if meters < unit.meters_per_unit() => {
            format!("{meters:.1} {}", DistanceUnit::Meters.symbol())
        }
        DistanceUnit::Miles if meters < unit.meters_per_unit() => {
            format!("{:.0} ft", meters * FEET_PER_METER)
        }
        DistanceUnit::Kilometers | DistanceUnit::Miles => {
            format!("{:.2} {symbol}", unit.from_meters(meters))
        }
    }
}

/// `H:MM:SS`, or `M:SS` below one hour.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.whole_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

pub fn format_speed(mps: f64, unit: DistanceUnit) -> String {
    if unit.is_imperial() {
        format!("{:.1} mph", unit.from_meters(mps * 3600.0))
    } else {
        format!("{:.1} km/h", mps * 3.6)
    }
}

/// Renders a pace given in seconds per mile (imperial) or per kilometer.
pub fn format_pace(seconds: f64, unit: DistanceUnit) -> String {
    let total = seconds.round().max(0.0) as u64;
    let label = if unit.is_imperial() { "min/mi" } else { "min/km" };
    format!("{}:{:02} {label}", total / 60, total % 60)
}

pub fn format_elevation(meters: f64, unit: DistanceUnit) -> String {
    if unit.is_imperial() {
        format!("{:.0} ft", meters * FEET_PER_METER)
    } else {
        format!("{meters:.0} m")
    }
}

pub fn format_heart_rate(bpm: f64) -> String {
    format!("{bpm:.0} bpm")
}

/// `road_biking` becomes `Road Biking`.
pub fn format_activity_type(activity: &str) -> String {
    activity
        .split(|c: char| c == '_' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn format_instant(instant: OffsetDateTime) -> String {
    instant
        .format(&Rfc3339)
        .unwrap_or_else(|_| instant.to_string())
}
