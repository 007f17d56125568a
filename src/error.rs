use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::PointLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Latitude,
    Longitude,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latitude => f.write_str("latitude"),
            Self::Longitude => f.write_str("longitude"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinateError {
    #[error("missing {axis}")]
    Missing { axis: Axis },
    #[error("{axis} '{value}' is not a number")]
    NotNumeric { axis: Axis, value: String },
    #[error("{axis} {value} is outside the valid range")]
    OutOfRange { axis: Axis, value: f64 },
}

/// Fatal decoding failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("malformed XML at byte {position}: {message}")]
    MalformedXml { position: u64, message: String },
    #[error("not a GPX document: root element is <{found}>")]
    WrongSchema { found: String },
    #[error("invalid coordinate at {location}: {reason}")]
    InvalidCoordinate {
        location: PointLocation,
        reason: CoordinateError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    MalformedXml,
    WrongSchema,
    InvalidCoordinate,
}

impl ParseError {
    pub fn kind(&self) -> ParseErrorKind {
        match self {
            Self::MalformedXml { .. } => ParseErrorKind::MalformedXml,
            Self::WrongSchema { .. } => ParseErrorKind::WrongSchema,
            Self::InvalidCoordinate { .. } => ParseErrorKind::InvalidCoordinate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("track has {points} point(s), at least 2 are needed for analysis")]
    EmptyTrack { points: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Non-fatal problems found on individual track points.
///
/// The affected field is treated as absent and decoding continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    MissingTimestamp {
        location: PointLocation,
    },
    InvalidTimestamp {
        location: PointLocation,
        value: String,
    },
    MissingElevation {
        location: PointLocation,
    },
    InvalidElevation {
        location: PointLocation,
        value: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WarningKind {
    MissingTimestamp,
    InvalidTimestamp,
    MissingElevation,
    InvalidElevation,
}

impl Warning {
    pub fn kind(&self) -> WarningKind {
        match self {
            Self::MissingTimestamp { .. } => WarningKind::MissingTimestamp,
            Self::InvalidTimestamp { .. } => WarningKind::InvalidTimestamp,
            Self::MissingElevation { .. } => WarningKind::MissingElevation,
            Self::InvalidElevation { .. } => WarningKind::InvalidElevation,
        }
    }

    pub fn location(&self) -> PointLocation {
        match self {
            Self::MissingTimestamp { location }
            | Self::InvalidTimestamp { location, .. }
            | Self::MissingElevation { location }
            | Self::InvalidElevation { location, .. } => *location,
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTimestamp { location } => write!(f, "{location}: no timestamp"),
            Self::InvalidTimestamp { location, value } => {
                write!(f, "{location}: '{value}' is not an ISO-8601 timestamp")
            }
            Self::MissingElevation { location } => write!(f, "{location}: no elevation"),
            Self::InvalidElevation { location, value } => {
                write!(f, "{location}: elevation '{value}' is not a number")
            }
        }
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::MissingTimestamp => "points without timestamp",
            Self::InvalidTimestamp => "points with an unreadable timestamp",
            Self::MissingElevation => "points without elevation",
            Self::InvalidElevation => "points with an unreadable elevation",
        };
        f.write_str(label)
    }
}
