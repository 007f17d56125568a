use std::fmt;

use time::OffsetDateTime;

use crate::error::{Axis, CoordinateError};

/// A single recorded or planned position.
///
/// Shared payload of waypoints, route points and track points. Which of
/// the three a point is follows from where it lives in the [`Document`]
/// and is spelled out by [`PointLocation`].
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    lat: f64,
    lon: f64,
    elevation: Option<f64>,
    time: Option<OffsetDateTime>,
    heart_rate: Option<f64>,
    name: Option<String>,
}

impl Point {
    /// Creates a point, rejecting coordinates outside the WGS84 range.
    pub fn new(lat: f64, lon: f64) -> Result<Self, CoordinateError> {
        check_range(Axis::Latitude, lat, 90.0)?;
        check_range(Axis::Longitude, lon, 180.0)?;

        Ok(Self {
            lat,
            lon,
            elevation: None,
            time: None,
            heart_rate: None,
            name: None,
        })
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    pub fn with_time(mut self, time: OffsetDateTime) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_heart_rate(mut self, bpm: f64) -> Self {
        self.heart_rate = Some(bpm);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    /// Elevation in meters. `None` means unknown, `Some(0.0)` is sea level.
    pub fn elevation(&self) -> Option<f64> {
        self.elevation
    }

    pub fn time(&self) -> Option<OffsetDateTime> {
        self.time
    }

    /// Heart rate in beats per minute, read from the point's extensions.
    pub fn heart_rate(&self) -> Option<f64> {
        self.heart_rate
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

fn check_range(axis: Axis, value: f64, limit: f64) -> Result<(), CoordinateError> {
    if (-limit..=limit).contains(&value) {
        Ok(())
    } else {
        Err(CoordinateError::OutOfRange { axis, value })
    }
}

/// A continuous run of track points. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    points: Vec<Point>,
}

impl Segment {
    /// Returns `None` for an empty point list.
    pub fn new(points: Vec<Point>) -> Option<Self> {
        if points.is_empty() {
            None
        } else {
            Some(Self { points })
        }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    name: Option<String>,
    activity_type: Option<String>,
    segments: Vec<Segment>,
}

impl Track {
    pub fn new(name: Option<String>, activity_type: Option<String>, segments: Vec<Segment>) -> Self {
        Self {
            name,
            activity_type,
            segments,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Free-form `<type>` value, e.g. `cycling` or `running`.
    pub fn activity_type(&self) -> Option<&str> {
        self.activity_type.as_deref()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn points(&self) -> impl Iterator<Item = &Point> {
        self.segments.iter().flat_map(|s| s.points.iter())
    }

    pub fn point_count(&self) -> usize {
        self.segments.iter().map(|s| s.points.len()).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Route {
    name: Option<String>,
    points: Vec<Point>,
}

impl Route {
    pub fn new(name: Option<String>, points: Vec<Point>) -> Self {
        Self { name, points }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }
}

/// A decoded GPX file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub(crate) version: Option<String>,
    pub(crate) creator: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) activity_hint: Option<String>,
    pub(crate) tracks: Vec<Track>,
    pub(crate) routes: Vec<Route>,
    pub(crate) waypoints: Vec<Point>,
}

impl Document {
    pub fn from_tracks(tracks: Vec<Track>) -> Self {
        Self {
            tracks,
            ..Self::default()
        }
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn creator(&self) -> Option<&str> {
        self.creator.as_deref()
    }

    /// `<metadata><name>`, when present.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Sport or activity name found in the root `<extensions>` block.
    pub fn activity_hint(&self) -> Option<&str> {
        self.activity_hint.as_deref()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn waypoints(&self) -> &[Point] {
        &self.waypoints
    }
}

/// Where a point sits in the source document.
///
/// Indices are zero-based ordinals of the elements as they appear in the
/// file, so empty `<trkseg>` elements still take up an index. `Display`
/// prints them one-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointLocation {
    Waypoint {
        index: usize,
    },
    RoutePoint {
        route: usize,
        point: usize,
    },
    TrackPoint {
        track: usize,
        segment: usize,
        point: usize,
    },
}

impl fmt::Display for PointLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waypoint { index } => write!(f, "waypoint #{}", index + 1),
            Self::RoutePoint { route, point } => {
                write!(f, "route #{}, point #{}", route + 1, point + 1)
            }
            Self::TrackPoint {
                track,
                segment,
                point,
            } => write!(
                f,
                "track #{}, segment #{}, point #{}",
                track + 1,
                segment + 1,
                point + 1
            ),
        }
    }
}
