//! Activity metrics computed from decoded tracks.
//!
//! Reports are plain values: they are computed from a borrowed [`Track`] or
//! [`Document`] and never updated afterwards. Analyze again if the input
//! changes.

use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::config::{AnalysisConfig, DistanceUnit};
use crate::error::AnalysisError;
use crate::model::{Document, Point, Segment, Track};
use crate::{calculate_speed, distance_between, seconds_between};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    fn around(point: &Point) -> Self {
        Self {
            min_lat: point.lat(),
            min_lon: point.lon(),
            max_lat: point.lat(),
            max_lon: point.lon(),
        }
    }

    fn extend(&mut self, point: &Point) {
        self.min_lat = self.min_lat.min(point.lat());
        self.min_lon = self.min_lon.min(point.lon());
        self.max_lat = self.max_lat.max(point.lat());
        self.max_lon = self.max_lon.max(point.lon());
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElevationRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeartRateSummary {
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub samples: usize,
}

/// Summary of one track, or of every track in a document.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsReport {
    tracks: usize,
    segments: usize,
    points: usize,
    distance_meters: f64,
    distance_unit: DistanceUnit,
    ascent_meters: Option<f64>,
    descent_meters: Option<f64>,
    elevation: Option<ElevationRange>,
    start_time: Option<OffsetDateTime>,
    end_time: Option<OffsetDateTime>,
    elapsed_time: Option<Duration>,
    moving_time: Option<Duration>,
    average_speed_mps: Option<f64>,
    max_speed_mps: Option<f64>,
    bounds: BoundingBox,
    heart_rate: Option<HeartRateSummary>,
    activity_type: Option<String>,
}

impl MetricsReport {
    pub fn track_count(&self) -> usize {
        self.tracks
    }

    pub fn segment_count(&self) -> usize {
        self.segments
    }

    pub fn point_count(&self) -> usize {
        self.points
    }

    pub fn distance_meters(&self) -> f64 {
        self.distance_meters
    }

    pub fn distance_unit(&self) -> DistanceUnit {
        self.distance_unit
    }

    /// Total distance in the configured unit.
    pub fn distance(&self) -> f64 {
        self.distance_unit.from_meters(self.distance_meters)
    }

    /// Noise-filtered elevation gain. `None` without two points of known elevation in a segment.
    pub fn ascent_meters(&self) -> Option<f64> {
        self.ascent_meters
    }

    pub fn descent_meters(&self) -> Option<f64> {
        self.descent_meters
    }

    pub fn elevation(&self) -> Option<ElevationRange> {
        self.elevation
    }

    /// Earliest timestamp of any point, which is the first one for ordered input.
    pub fn start_time(&self) -> Option<OffsetDateTime> {
        self.start_time
    }

    /// Latest timestamp of any point.
    pub fn end_time(&self) -> Option<OffsetDateTime> {
        self.end_time
    }

    /// Latest minus earliest timestamp.
    ///
    /// For ordered input this is the last timestamp minus the first. Out of
    /// order points do not make it shrink or go negative: `10:00:30`,
    /// `10:00:00`, `10:00:10` give 30 s starting at `10:00:00`, not 20 s.
    pub fn elapsed_time(&self) -> Option<Duration> {
        self.elapsed_time
    }

    pub fn moving_time(&self) -> Option<Duration> {
        self.moving_time
    }

    /// Distance over moving time. `None` when moving time is zero or unknown.
    pub fn average_speed_mps(&self) -> Option<f64> {
        self.average_speed_mps
    }

    pub fn max_speed_mps(&self) -> Option<f64> {
        self.max_speed_mps
    }

    /// Seconds per mile with imperial units, seconds per kilometer otherwise.
    pub fn average_pace_seconds(&self) -> Option<f64> {
        self.average_speed_mps
            .filter(|speed| *speed > 0.0)
            .map(|speed| self.distance_unit.pace_meters() / speed)
    }

    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    pub fn heart_rate(&self) -> Option<HeartRateSummary> {
        self.heart_rate
    }

    pub fn activity_type(&self) -> Option<&str> {
        self.activity_type.as_deref()
    }
}

/// Computes the metrics of a single track.
pub fn analyze_track(track: &Track, config: &AnalysisConfig) -> Result<MetricsReport, AnalysisError> {
    analyze_tracks([track], track.activity_type(), config)
}

/// Computes metrics over every track of a document.
///
/// Segments are still measured independently, so the gaps between tracks
/// and between segments do not count as travel.
pub fn analyze_document(
    document: &Document,
    config: &AnalysisConfig,
) -> Result<MetricsReport, AnalysisError> {
    let activity_type = document
        .tracks()
        .iter()
        .find_map(Track::activity_type)
        .or(document.activity_hint());
    analyze_tracks(document.tracks(), activity_type, config)
}

fn analyze_tracks<'t>(
    tracks: impl IntoIterator<Item = &'t Track>,
    activity_type: Option<&str>,
    config: &AnalysisConfig,
) -> Result<MetricsReport, AnalysisError> {
    let mut totals = Totals::new(config);
    for track in tracks {
        totals.tracks += 1;
        for segment in track.segments() {
            totals.add_segment(segment);
        }
    }

    let report = totals.finish(activity_type)?;
    debug!(
        tracks = report.tracks,
        points = report.points,
        distance_m = report.distance_meters,
        moving_s = report.moving_time.map(|d| d.whole_seconds()),
        "analyzed activity"
    );
    Ok(report)
}

struct Totals<'c> {
    config: &'c AnalysisConfig,
    tracks: usize,
    segments: usize,
    points: usize,
    distance: f64,
    ascent: f64,
    descent: f64,
    has_elevation_delta: bool,
    elevation: Option<ElevationRange>,
    earliest: Option<OffsetDateTime>,
    latest: Option<OffsetDateTime>,
    moving_seconds: f64,
    max_speed: Option<f64>,
    bounds: Option<BoundingBox>,
    heart_rate_sum: f64,
    heart_rate: Option<HeartRateSummary>,
}

impl<'c> Totals<'c> {
    fn new(config: &'c AnalysisConfig) -> Self {
        Self {
            config,
            tracks: 0,
            segments: 0,
            points: 0,
            distance: 0.0,
            ascent: 0.0,
            descent: 0.0,
            has_elevation_delta: false,
            elevation: None,
            earliest: None,
            latest: None,
            moving_seconds: 0.0,
            max_speed: None,
            bounds: None,
            heart_rate_sum: 0.0,
            heart_rate: None,
        }
    }

    fn add_segment(&mut self, segment: &Segment) {
        let points = segment.points();
        self.segments += 1;

        for point in points {
            self.add_point(point);
        }
        self.add_elevation_changes(points);

        for pair in points.windows(2) {
            let (prev, curr) = (&pair[0], &pair[1]);
            let distance = distance_between(prev, curr);
            self.distance += distance;

            let Some(speed) = calculate_speed(prev, curr) else {
                continue;
            };
            if speed > self.config.moving_speed_threshold_mps {
                self.moving_seconds += seconds_between(prev, curr).unwrap_or_default();
            }
            if speed <= self.config.max_speed_mps && self.max_speed.is_none_or(|max| speed > max) {
                self.max_speed = Some(speed);
            }
        }
    }

    fn add_point(&mut self, point: &Point) {
        self.points += 1;

        match &mut self.bounds {
            Some(bounds) => bounds.extend(point),
            None => self.bounds = Some(BoundingBox::around(point)),
        }

        if let Some(ele) = point.elevation() {
            let range = self.elevation.get_or_insert(ElevationRange { min: ele, max: ele });
            range.min = range.min.min(ele);
            range.max = range.max.max(ele);
        }

        if let Some(time) = point.time() {
            if self.earliest.is_none_or(|t| time < t) {
                self.earliest = Some(time);
            }
            if self.latest.is_none_or(|t| time > t) {
                self.latest = Some(time);
            }
        }

        if let Some(bpm) = point.heart_rate() {
            self.heart_rate_sum += bpm;
            let summary = self.heart_rate.get_or_insert(HeartRateSummary {
                average: bpm,
                min: bpm,
                max: bpm,
                samples: 0,
            });
            summary.samples += 1;
            summary.min = summary.min.min(bpm);
            summary.max = summary.max.max(bpm);
            summary.average = self.heart_rate_sum / summary.samples as f64;
        }
    }

    /// Accumulates gain and loss against a running baseline.
    ///
    /// The baseline only moves when a change reaches the noise threshold, so
    /// small oscillations neither count nor shift the reference point.
    fn add_elevation_changes(&mut self, points: &[Point]) {
        let threshold = self.config.elevation_threshold_meters;
        let mut baseline: Option<f64> = None;

        for ele in points.iter().filter_map(Point::elevation) {
            let Some(base) = baseline else {
                baseline = Some(ele);
                continue;
            };
            self.has_elevation_delta = true;

            let delta = ele - base;
            if delta.abs() >= threshold {
                if delta > 0.0 {
                    self.ascent += delta;
                } else {
                    self.descent -= delta;
                }
                baseline = Some(ele);
            }
        }
    }

    fn finish(self, activity_type: Option<&str>) -> Result<MetricsReport, AnalysisError> {
        let bounds = match self.bounds {
            Some(bounds) if self.points >= 2 => bounds,
            _ => return Err(AnalysisError::EmptyTrack { points: self.points }),
        };

        let timed = self.earliest.is_some();
        let elapsed_time = match (self.earliest, self.latest) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        };
        let average_speed_mps = (self.moving_seconds > 0.0).then(|| self.distance / self.moving_seconds);

        Ok(MetricsReport {
            tracks: self.tracks,
            segments: self.segments,
            points: self.points,
            distance_meters: self.distance,
            distance_unit: self.config.distance_unit,
            ascent_meters: self.has_elevation_delta.then_some(self.ascent),
            descent_meters: self.has_elevation_delta.then_some(self.descent),
            elevation: self.elevation,
            start_time: self.earliest,
            end_time: self.latest,
            elapsed_time,
            moving_time: timed.then(|| Duration::seconds_f64(self.moving_seconds)),
            average_speed_mps,
            max_speed_mps: self.max_speed,
            bounds,
            heart_rate: self.heart_rate,
            activity_type: activity_type.map(str::to_owned),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::format_description::well_known::Iso8601;

    fn start() -> OffsetDateTime {
        OffsetDateTime::parse("2024-05-04T08:00:00Z", &Iso8601::DEFAULT).unwrap()
    }

    fn point(lat: f64, lon: f64) -> Point {
        Point::new(lat, lon).unwrap()
    }

    fn timed(lat: f64, lon: f64, seconds: i64) -> Point {
        point(lat, lon).with_time(start() + Duration::seconds(seconds))
    }

    fn track(segments: Vec<Vec<Point>>) -> Track {
        Track::new(
            None,
            None,
            segments
                .into_iter()
                .filter_map(Segment::new)
                .collect(),
        )
    }

    fn profile(elevations: &[f64]) -> Track {
        track(vec![
            elevations
                .iter()
                .enumerate()
                .map(|(i, ele)| point(0.0, i as f64 * 0.001).with_elevation(*ele))
                .collect(),
        ])
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig::default()
    }

    #[test]
    fn test_two_point_scenario() {
        let track = track(vec![vec![
            point(0.0, 0.0).with_elevation(0.0),
            point(0.0, 0.01).with_elevation(10.0),
        ]]);
        let config = AnalysisConfig {
            elevation_threshold_meters: 10.0,
            ..config()
        };

        let report = analyze_track(&track, &config).unwrap();
        assert!(
            (report.distance() - 1.11).abs() < 1.11 * 0.01,
            "Expected ~1.11 km, got {}",
            report.distance()
        );
        assert_eq!(report.ascent_meters(), Some(10.0));
        assert_eq!(report.descent_meters(), Some(0.0));
        assert_eq!(report.elapsed_time(), None);
        assert_eq!(report.moving_time(), None);
        assert_eq!(report.average_speed_mps(), None);
    }

    #[test]
    fn test_empty_and_single_point_tracks() {
        let empty = Track::default();
        assert_eq!(
            analyze_track(&empty, &config()),
            Err(AnalysisError::EmptyTrack { points: 0 })
        );

        let single = track(vec![vec![point(1.0, 1.0)]]);
        assert_eq!(
            analyze_track(&single, &config()),
            Err(AnalysisError::EmptyTrack { points: 1 })
        );

        assert_eq!(
            analyze_document(&Document::default(), &config()),
            Err(AnalysisError::EmptyTrack { points: 0 })
        );
    }

    #[test]
    fn test_identical_timestamps_leave_speed_undefined() {
        let track = track(vec![vec![
            timed(0.0, 0.0, 0),
            timed(0.0, 0.001, 0),
            timed(0.0, 0.002, 0),
        ]]);

        let report = analyze_track(&track, &config()).unwrap();
        assert!(report.distance_meters() > 200.0);
        assert_eq!(report.elapsed_time(), Some(Duration::ZERO));
        assert_eq!(report.moving_time(), Some(Duration::ZERO));
        assert_eq!(report.average_speed_mps(), None);
        assert_eq!(report.average_pace_seconds(), None);
        assert_eq!(report.max_speed_mps(), None);
    }

    #[test]
    fn test_moving_time_skips_stationary_intervals() {
        let track = track(vec![vec![
            timed(0.0, 0.0, 0),
            timed(0.0, 0.0, 10),
            timed(0.0, 0.001, 20),
            timed(0.0, 0.002, 30),
            timed(0.0, 0.002, 40),
        ]]);

        let report = analyze_track(&track, &config()).unwrap();
        assert_eq!(report.elapsed_time(), Some(Duration::seconds(40)));
        assert_eq!(report.moving_time(), Some(Duration::seconds(20)));
        assert_eq!(report.start_time(), Some(start()));
        assert_eq!(report.end_time(), Some(start() + Duration::seconds(40)));

        let speed = report.average_speed_mps().unwrap();
        assert!((speed - 11.12).abs() < 0.01, "Expected ~11.12 m/s, got {speed}");
        let max = report.max_speed_mps().unwrap();
        assert!((max - speed).abs() < 0.01);

        // 1 km at 11.12 m/s
        let pace = report.average_pace_seconds().unwrap();
        assert!((pace - 89.9).abs() < 0.2, "Expected ~90 s/km, got {pace}");
    }

    #[test]
    fn test_max_speed_ignores_gps_spikes() {
        let track = track(vec![vec![
            timed(0.0, 0.0, 0),
            timed(0.0, 0.001, 10),
            // ~11 km in 10 s
            timed(0.0, 0.101, 20),
        ]]);

        let report = analyze_track(&track, &config()).unwrap();
        let max = report.max_speed_mps().unwrap();
        assert!(max < 12.0, "Spike should be excluded, got {max}");
        assert_eq!(report.moving_time(), Some(Duration::seconds(20)));
    }

    #[test]
    fn test_segment_gaps_are_not_travel() {
        let joined = track(vec![vec![point(0.0, 0.0), point(0.0, 0.001)]]);
        let split = track(vec![
            vec![point(0.0, 0.0), point(0.0, 0.001)],
            vec![point(10.0, 10.0), point(10.0, 10.001)],
        ]);

        let one = analyze_track(&joined, &config()).unwrap().distance_meters();
        let two = analyze_track(&split, &config()).unwrap().distance_meters();
        assert!(two < one * 2.1, "Gap between segments was counted: {two}");
        assert_eq!(analyze_track(&split, &config()).unwrap().segment_count(), 2);
    }

    #[test]
    fn test_small_oscillations_are_noise() {
        let report = analyze_track(&profile(&[100.0, 100.5, 100.0, 100.5, 100.0]), &config()).unwrap();
        assert_eq!(report.ascent_meters(), Some(0.0));
        assert_eq!(report.descent_meters(), Some(0.0));
    }

    #[test]
    fn test_noise_filter_keeps_running_baseline() {
        // Slow drift: each step is below the threshold, the sum is not.
        let report = analyze_track(&profile(&[100.0, 100.6, 101.2, 101.8]), &config()).unwrap();
        assert!((report.ascent_meters().unwrap() - 1.2).abs() < 1e-9);

        let elevations = [100.0, 100.4, 99.8, 103.0, 102.5, 107.0, 90.0, 90.3];
        let report = analyze_track(&profile(&elevations), &config()).unwrap();
        let ascent = report.ascent_meters().unwrap();
        let descent = report.descent_meters().unwrap();
        assert!((ascent - 7.0).abs() < 1e-9, "ascent {ascent}");
        assert!((descent - 17.0).abs() < 1e-9, "descent {descent}");

        let net = elevations[elevations.len() - 1] - elevations[0];
        assert!(((ascent - descent) - net).abs() < config().elevation_threshold_meters);
        assert_eq!(
            report.elevation(),
            Some(ElevationRange {
                min: 90.0,
                max: 107.0
            })
        );
    }

    #[test]
    fn test_ascent_minus_descent_tracks_net_change() {
        let thresholds = [0.0, 0.5, 1.0, 3.0];
        // Deterministic bumpy profile
        let elevations: Vec<f64> = (0..200)
            .map(|i| {
                let x = i as f64;
                300.0 + 40.0 * (x / 17.0).sin() + 2.5 * (x * 1.7).cos()
            })
            .collect();
        let net = elevations[elevations.len() - 1] - elevations[0];

        for threshold in thresholds {
            let config = AnalysisConfig {
                elevation_threshold_meters: threshold,
                ..config()
            };
            let report = analyze_track(&profile(&elevations), &config).unwrap();
            let ascent = report.ascent_meters().unwrap();
            let descent = report.descent_meters().unwrap();

            assert!(ascent >= 0.0 && descent >= 0.0);
            let drift = ((ascent - descent) - net).abs();
            assert!(
                drift < threshold.max(1e-9),
                "threshold {threshold}: drift {drift}"
            );
        }
    }

    #[test]
    fn test_missing_elevations_are_skipped() {
        let track = track(vec![vec![
            point(0.0, 0.0).with_elevation(10.0),
            point(0.0, 0.001),
            point(0.0, 0.002).with_elevation(15.0),
        ]]);
        let report = analyze_track(&track, &config()).unwrap();
        assert_eq!(report.ascent_meters(), Some(5.0));

        let flat = track_without_elevation();
        let report = analyze_track(&flat, &config()).unwrap();
        assert_eq!(report.ascent_meters(), None);
        assert_eq!(report.descent_meters(), None);
        assert_eq!(report.elevation(), None);
    }

    fn track_without_elevation() -> Track {
        track(vec![vec![point(0.0, 0.0), point(0.0, 0.001)]])
    }

    #[test]
    fn test_distance_grows_as_points_are_appended() {
        let path: Vec<Point> = (0..50)
            .map(|i| {
                let x = i as f64;
                point(45.0 + 0.0003 * (x / 3.0).sin(), 7.0 + 0.0004 * x)
            })
            .collect();

        let mut previous = 0.0;
        for len in 2..=path.len() {
            let report = analyze_track(&track(vec![path[..len].to_vec()]), &config()).unwrap();
            let distance = report.distance_meters();
            assert!(distance >= 0.0);
            assert!(distance >= previous, "{distance} < {previous} at {len} points");
            previous = distance;
        }
    }

    #[test]
    fn test_partial_timestamps_are_best_effort() {
        let track = track(vec![vec![
            timed(0.0, 0.0, 0),
            point(0.0, 0.001),
            timed(0.0, 0.002, 20),
            timed(0.0, 0.003, 30),
        ]]);

        let report = analyze_track(&track, &config()).unwrap();
        assert_eq!(report.elapsed_time(), Some(Duration::seconds(30)));
        // Only the last interval has timestamps on both ends.
        assert_eq!(report.moving_time(), Some(Duration::seconds(10)));
        assert!((report.distance_meters() - 333.6).abs() < 0.5);
    }

    #[test]
    fn test_out_of_order_timestamps_use_earliest_and_latest() {
        let track = track(vec![vec![
            timed(0.0, 0.0, 30),
            timed(0.0, 0.001, 0),
            timed(0.0, 0.002, 10),
        ]]);

        let report = analyze_track(&track, &config()).unwrap();
        assert_eq!(report.elapsed_time(), Some(Duration::seconds(30)));
        assert_eq!(report.start_time(), Some(start()));
        assert_eq!(report.end_time(), Some(start() + Duration::seconds(30)));
        // Only the forward interval counts.
        assert_eq!(report.moving_time(), Some(Duration::seconds(10)));
    }

    #[test]
    fn test_heart_rate_and_bounds() {
        let track = track(vec![vec![
            point(45.0, 7.0).with_heart_rate(120.0),
            point(45.5, 6.5),
            point(44.5, 7.5).with_heart_rate(150.0),
        ]]);

        let report = analyze_track(&track, &config()).unwrap();
        assert_eq!(
            report.heart_rate(),
            Some(HeartRateSummary {
                average: 135.0,
                min: 120.0,
                max: 150.0,
                samples: 2
            })
        );
        assert_eq!(
            report.bounds(),
            BoundingBox {
                min_lat: 44.5,
                min_lon: 6.5,
                max_lat: 45.5,
                max_lon: 7.5
            }
        );

        let report = analyze_track(&track_without_elevation(), &config()).unwrap();
        assert_eq!(report.heart_rate(), None);
    }

    #[test]
    fn test_document_aggregates_tracks() {
        let segment = |points| Segment::new(points).unwrap();
        let first = Track::new(
            Some("Out".to_string()),
            None,
            vec![segment(vec![timed(0.0, 0.0, 0), timed(0.0, 0.001, 10)])],
        );
        let second = Track::new(
            Some("Back".to_string()),
            Some("hiking".to_string()),
            vec![segment(vec![timed(1.0, 0.0, 100), timed(1.0, 0.001, 110)])],
        );
        let out = analyze_track(&first, &config()).unwrap();
        let back = analyze_track(&second, &config()).unwrap();

        let document = Document::from_tracks(vec![first, second]);
        let report = analyze_document(&document, &config()).unwrap();

        assert_eq!(report.track_count(), 2);
        assert_eq!(report.point_count(), 4);
        let sum = out.distance_meters() + back.distance_meters();
        assert!((report.distance_meters() - sum).abs() < 1e-6);
        assert_eq!(report.elapsed_time(), Some(Duration::seconds(110)));
        assert_eq!(report.moving_time(), Some(Duration::seconds(20)));
        assert_eq!(report.activity_type(), Some("hiking"));
        assert_eq!(out.activity_type(), None);
        assert_eq!(back.activity_type(), Some("hiking"));
    }

    #[test]
    fn test_distance_unit_conversion() {
        let track = track(vec![vec![point(0.0, 0.0), point(0.0, 0.01)]]);
        let miles = AnalysisConfig {
            distance_unit: DistanceUnit::Miles,
            ..config()
        };

        let report = analyze_track(&track, &miles).unwrap();
        assert!((report.distance() - 0.691).abs() < 0.001);
        assert_eq!(report.distance_unit(), DistanceUnit::Miles);
    }
}
