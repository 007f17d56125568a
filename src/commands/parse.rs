use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::debug;

use gpxtools::format::{
    format_activity_type, format_distance, format_duration, format_elevation, format_heart_rate,
    format_instant, format_pace, format_speed,
};
use gpxtools::{
    AnalysisConfig, Document, DistanceUnit, MetricsReport, Warning, WarningKind,
    analyze_document, analyze_track, decode,
};

#[derive(Args)]
pub struct ParseArgs {
    /// GPX file to parse, or `-` to read standard input
    pub file: PathBuf,

    /// Unit for distances (miles also switches speeds, paces and elevations to imperial)
    #[arg(long, value_enum)]
    pub units: Option<DistanceUnit>,

    /// Ignore elevation changes smaller than this many meters
    #[arg(long, value_name = "METERS")]
    pub elevation_threshold: Option<f64>,

    /// Minimum speed in m/s for an interval to count as moving
    #[arg(long, value_name = "M/S")]
    pub moving_speed: Option<f64>,

    /// Interval speeds above this (m/s) are ignored when finding the maximum
    #[arg(long, value_name = "M/S")]
    pub max_speed: Option<f64>,

    /// TOML file with analysis settings; flags override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Also print statistics for each track separately
    #[arg(long)]
    pub per_track: bool,
}

impl ParseArgs {
    fn analysis_config(&self) -> Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::load(path)?,
            None => AnalysisConfig::default(),
        };

        if let Some(unit) = self.units {
            config.distance_unit = unit;
        }
        if let Some(threshold) = self.elevation_threshold {
            config.elevation_threshold_meters = threshold;
        }
        if let Some(speed) = self.moving_speed {
            config.moving_speed_threshold_mps = speed;
        }
        if let Some(speed) = self.max_speed {
            config.max_speed_mps = speed;
        }

        config.validate()?;
        Ok(config)
    }
}

pub fn parse_command(args: &ParseArgs) -> Result<()> {
    let config = args.analysis_config()?;
    let input = read_input(&args.file)?;

    let decoded = decode(&input).with_context(|| format!("failed to parse {}", args.file.display()))?;
    let document = &decoded.document;
    for warning in &decoded.warnings {
        debug!("{warning}");
    }

    let mut lines = header_lines(&args.file, document);

    if document.tracks().is_empty() {
        if let Some(activity) = document.activity_hint() {
            lines.push(format!("Activity: {}", format_activity_type(activity)));
        }
        lines.push(String::new());
        lines.push("No track data to analyze.".to_string());
    } else {
        let report = analyze_document(document, &config)
            .with_context(|| format!("failed to analyze {}", args.file.display()))?;
        lines.extend(report_lines(&report));

        if args.per_track {
            for (i, track) in document.tracks().iter().enumerate() {
                lines.push(String::new());
                lines.push(match track.name() {
                    Some(name) => format!("Track {}: {name}", i + 1),
                    None => format!("Track {}", i + 1),
                });
                match analyze_track(track, &config) {
                    Ok(report) => lines.extend(report_lines(&report)),
                    Err(e) => lines.push(format!("Skipped: {e}")),
                }
            }
        }
    }

    lines.extend(warning_lines(&decoded.warnings));

    let mut stdout = io::stdout().lock();
    for line in lines {
        writeln!(stdout, "{line}")?;
    }

    Ok(())
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut input = Vec::new();
        io::stdin()
            .lock()
            .read_to_end(&mut input)
            .context("failed to read standard input")?;
        return Ok(input);
    }

    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn header_lines(path: &Path, document: &Document) -> Vec<String> {
    let mut lines = vec![format!("GPX File: {}", path.display())];
    if let Some(name) = document.name() {
        lines.push(format!("Name: {name}"));
    }
    lines.push(format!("Tracks: {}", document.tracks().len()));
    lines.push(format!("Routes: {}", document.routes().len()));
    lines.push(format!("Waypoints: {}", document.waypoints().len()));
    lines
}

fn report_lines(report: &MetricsReport) -> Vec<String> {
    let unit = report.distance_unit();
    let mut lines = Vec::new();

    if let Some(activity) = report.activity_type() {
        lines.push(format!("Activity: {}", format_activity_type(activity)));
    }
    lines.push(String::new());
    lines.push(format!(
        "Points: {} in {} segment(s)",
        report.point_count(),
        report.segment_count()
    ));
    lines.push(format!(
        "Distance: {}",
        format_distance(report.distance_meters(), unit)
    ));

    if let Some(elapsed) = report.elapsed_time() {
        lines.push(format!("Time: {}", format_duration(elapsed)));
    }
    if let Some(moving) = report.moving_time() {
        lines.push(format!("Moving Time: {}", format_duration(moving)));
        // Timestamps exist, so a missing average means nothing moved.
        lines.push(match report.average_speed_mps() {
            Some(speed) => format!("Average Speed: {}", format_speed(speed, unit)),
            None => "Average Speed: undefined".to_string(),
        });
    }
    if let Some(speed) = report.max_speed_mps() {
        lines.push(format!("Max Speed: {}", format_speed(speed, unit)));
    }
    if let Some(pace) = report.average_pace_seconds() {
        lines.push(format!("Average Pace: {}", format_pace(pace, unit)));
    }

    if let Some(hr) = report.heart_rate() {
        lines.push(format!("Average Heart Rate: {}", format_heart_rate(hr.average)));
        lines.push(format!("Max Heart Rate: {}", format_heart_rate(hr.max)));
    }

    if let Some(range) = report.elevation() {
        lines.push(format!(
            "Elevation: {} - {}",
            format_elevation(range.min, unit),
            format_elevation(range.max, unit)
        ));
    }
    if let Some(ascent) = report.ascent_meters() {
        lines.push(format!("Uphill: {}", format_elevation(ascent, unit)));
    }
    if let Some(descent) = report.descent_meters() {
        lines.push(format!("Downhill: {}", format_elevation(descent, unit)));
    }

    if let Some(start) = report.start_time() {
        lines.push(format!("Start: {}", format_instant(start)));
    }
    if let Some(end) = report.end_time() {
        lines.push(format!("End: {}", format_instant(end)));
    }

    let bounds = report.bounds();
    lines.push(format!(
        "Bounds: {:.5},{:.5} to {:.5},{:.5}",
        bounds.min_lat, bounds.min_lon, bounds.max_lat, bounds.max_lon
    ));

    lines
}

fn warning_lines(warnings: &[Warning]) -> Vec<String> {
    if warnings.is_empty() {
        return Vec::new();
    }

    let mut counts: BTreeMap<WarningKind, usize> = BTreeMap::new();
    for warning in warnings {
        *counts.entry(warning.kind()).or_default() += 1;
    }

    let mut lines = vec![String::new(), "Warnings:".to_string()];
    lines.extend(
        counts
            .into_iter()
            .map(|(kind, count)| format!("  {count} {kind}")),
    );
    lines
}
