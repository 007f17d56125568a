use std::fs;
use std::path::Path;

use clap::ValueEnum;
use serde::Deserialize;

use crate::error::ConfigError;

const METERS_PER_KILOMETER: f64 = 1000.0;
const METERS_PER_MILE: f64 = 1609.344;

/// Speed below which an interval counts as stationary: 1 km/h.
pub const DEFAULT_MOVING_SPEED_THRESHOLD_MPS: f64 = 1.0 / 3.6;
pub const DEFAULT_ELEVATION_THRESHOLD_METERS: f64 = 1.0;
/// Interval speeds above this are treated as GPS spikes when looking for the maximum.
pub const DEFAULT_MAX_SPEED_MPS: f64 = 50.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    Meters,
    #[default]
    Kilometers,
    Miles,
}

impl DistanceUnit {
    pub fn meters_per_unit(self) -> f64 {
        match self {
            Self::Meters => 1.0,
            Self::Kilometers => METERS_PER_KILOMETER,
            Self::Miles => METERS_PER_MILE,
        }
    }

    pub fn from_meters(self, meters: f64) -> f64 {
        meters / self.meters_per_unit()
    }

    /// Distance a pace value refers to. Metric pace is always per kilometer.
    pub fn pace_meters(self) -> f64 {
        match self {
            Self::Miles => METERS_PER_MILE,
            Self::Meters | Self::Kilometers => METERS_PER_KILOMETER,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Meters => "m",
            Self::Kilometers => "km",
            Self::Miles => "mi",
        }
    }

    pub fn is_imperial(self) -> bool {
        matches!(self, Self::Miles)
    }
}

/// Knobs for the activity analyzer.
///
/// Every field has a default, so a config file only needs the values it
/// changes:
///
/// ```toml
/// elevation_threshold_meters = 2.5
/// distance_unit = "miles"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Elevation changes smaller than this are sensor noise and not accumulated.
    pub elevation_threshold_meters: f64,
    pub distance_unit: DistanceUnit,
    /// Intervals at or below this speed do not count towards moving time.
    pub moving_speed_threshold_mps: f64,
    pub max_speed_mps: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            elevation_threshold_meters: DEFAULT_ELEVATION_THRESHOLD_METERS,
            distance_unit: DistanceUnit::default(),
            moving_speed_threshold_mps: DEFAULT_MOVING_SPEED_THRESHOLD_MPS,
            max_speed_mps: DEFAULT_MAX_SPEED_MPS,
        }
    }
}

impl AnalysisConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative(
            "elevation_threshold_meters",
            self.elevation_threshold_meters,
        )?;
        non_negative(
            "moving_speed_threshold_mps",
            self.moving_speed_threshold_mps,
        )?;
        if !(self.max_speed_mps.is_finite() && self.max_speed_mps > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "max_speed_mps",
                reason: format!("{} must be a positive number", self.max_speed_mps),
            });
        }
        Ok(())
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field,
            reason: format!("{value} must be zero or a positive number"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.distance_unit, DistanceUnit::Kilometers);
        assert!((config.moving_speed_threshold_mps - 0.2777).abs() < 0.001);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AnalysisConfig::from_toml_str(
            r#"
elevation_threshold_meters = 2.5
distance_unit = "miles"
"#,
        )
        .unwrap();
        assert_eq!(config.elevation_threshold_meters, 2.5);
        assert_eq!(config.distance_unit, DistanceUnit::Miles);
        assert_eq!(config.max_speed_mps, DEFAULT_MAX_SPEED_MPS);
    }

    #[test]
    fn test_toml_rejects_unknown_fields_and_units() {
        assert!(matches!(
            AnalysisConfig::from_toml_str("speed_limit = 3.0"),
            Err(ConfigError::Toml(_))
        ));
        assert!(matches!(
            AnalysisConfig::from_toml_str(r#"distance_unit = "furlongs""#),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_validate_rejects_negative_threshold() {
        let err = AnalysisConfig::from_toml_str("elevation_threshold_meters = -1.0").unwrap_err();
        match err {
            ConfigError::InvalidValue { field, .. } => {
                assert_eq!(field, "elevation_threshold_meters")
            }
            other => panic!("Expected InvalidValue, got {other:?}"),
        }

        let config = AnalysisConfig {
            max_speed_mps: 0.0,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "moving_speed_threshold_mps = 0.5").unwrap();

        let config = AnalysisConfig::load(file.path()).unwrap();
        assert_eq!(config.moving_speed_threshold_mps, 0.5);
    }

    #[test]
    fn test_load_missing_file() {
        let result = AnalysisConfig::load(Path::new("/nonexistent/gpxtools.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_unit_conversion() {
        assert_eq!(DistanceUnit::Kilometers.from_meters(1500.0), 1.5);
        assert_eq!(DistanceUnit::Meters.from_meters(1500.0), 1500.0);
        assert!((DistanceUnit::Miles.from_meters(1609.344) - 1.0).abs() < 1e-12);
        assert_eq!(DistanceUnit::Miles.symbol(), "mi");
        assert_eq!(DistanceUnit::Meters.pace_meters(), 1000.0);
    }
}
