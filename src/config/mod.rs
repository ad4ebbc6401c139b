//! Configuration types for the survey tools.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Build a timestamp from calendar fields known to be valid.
pub(crate) fn ymd_hms(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, min, sec))
        .unwrap_or_default()
}

/// Time-zone handling for raw theodolite exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeConfig {
    /// Hours added to the recorded UTC timestamps to get local time
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i64,

    /// Label used for local time on plot axes
    #[serde(default = "default_local_label")]
    pub local_label: String,

    /// Candidate time columns in raw files; the last one present wins
    #[serde(default = "default_time_columns")]
    pub time_columns: Vec<String>,
}

fn default_utc_offset_hours() -> i64 {
    -8
}

fn default_local_label() -> String {
    "AKST".to_string()
}

fn default_time_columns() -> Vec<String> {
    vec![
        "Unnamed: 0".to_string(),
        "Time Stamp".to_string(),
        "Time".to_string(),
    ]
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: default_utc_offset_hours(),
            local_label: default_local_label(),
            time_columns: default_time_columns(),
        }
    }
}

/// Albers equal-area conic parameters (defaults are EPSG:3338).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionConfig {
    /// Latitude of origin in degrees
    #[serde(default = "default_lat_origin")]
    pub lat_origin: f64,

    /// Central meridian in degrees
    #[serde(default = "default_lon_origin")]
    pub lon_origin: f64,

    /// First standard parallel in degrees
    #[serde(default = "default_parallel_1")]
    pub standard_parallel_1: f64,

    /// Second standard parallel in degrees
    #[serde(default = "default_parallel_2")]
    pub standard_parallel_2: f64,

    #[serde(default)]
    pub false_easting: f64,

    #[serde(default)]
    pub false_northing: f64,

    /// Ellipsoid semi-major axis in meters
    #[serde(default = "default_semi_major")]
    pub semi_major_axis: f64,

    /// Ellipsoid inverse flattening
    #[serde(default = "default_inverse_flattening")]
    pub inverse_flattening: f64,
}

fn default_lat_origin() -> f64 {
    50.0
}

fn default_lon_origin() -> f64 {
    -154.0
}

fn default_parallel_1() -> f64 {
    55.0
}

fn default_parallel_2() -> f64 {
    65.0
}

fn default_semi_major() -> f64 {
    6_378_137.0
}

fn default_inverse_flattening() -> f64 {
    298.257_222_101
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            lat_origin: default_lat_origin(),
            lon_origin: default_lon_origin(),
            standard_parallel_1: default_parallel_1(),
            standard_parallel_2: default_parallel_2(),
            false_easting: 0.0,
            false_northing: 0.0,
            semi_major_axis: default_semi_major(),
            inverse_flattening: default_inverse_flattening(),
        }
    }
}

/// Settings for the coordinate absolutizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbsoluteConfig {
    /// Reference time for the elapsed-hours `idx` column
    #[serde(default = "default_epoch")]
    pub epoch: NaiveDateTime,
}

fn default_epoch() -> NaiveDateTime {
    ymd_hms(2013, 6, 24, 0, 0, 0)
}

impl Default for AbsoluteConfig {
    fn default() -> Self {
        Self {
            epoch: default_epoch(),
        }
    }
}

/// Reference timestamps and columns for the re-leveling correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftConfig {
    /// A time before the shift used to estimate the pre-shift rate (UTC)
    #[serde(default = "default_avg_date")]
    pub avg_date: NaiveDateTime,

    /// Last sample before the shift (UTC)
    #[serde(default = "default_before_shift")]
    pub before_shift: NaiveDateTime,

    /// First sample after the shift (UTC)
    #[serde(default = "default_after_shift")]
    pub after_shift: NaiveDateTime,

    /// Columns to correct
    #[serde(default = "default_shift_columns")]
    pub columns: Vec<String>,
}

fn default_avg_date() -> NaiveDateTime {
    ymd_hms(2013, 6, 27, 1, 48, 29)
}

fn default_before_shift() -> NaiveDateTime {
    ymd_hms(2013, 6, 27, 3, 4, 17)
}

fn default_after_shift() -> NaiveDateTime {
    ymd_hms(2013, 6, 27, 3, 19, 7)
}

fn default_shift_columns() -> Vec<String> {
    vec![
        "Target Easting [m]".to_string(),
        "Target Northing [m]".to_string(),
        "Target Elevation [m]".to_string(),
    ]
}

impl Default for ShiftConfig {
    fn default() -> Self {
        Self {
            avg_date: default_avg_date(),
            before_shift: default_before_shift(),
            after_shift: default_after_shift(),
            columns: default_shift_columns(),
        }
    }
}

/// Settings for reading raw theodolite station files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    /// Columns that are always empty in the exports and get dropped
    #[serde(default = "default_unused_columns")]
    pub unused_columns: Vec<String>,

    /// Column holding the target name used as the station key
    #[serde(default = "default_point_id_column")]
    pub point_id_column: String,

    /// Resample rule applied when differencing against a reference
    #[serde(default = "default_resample_rule")]
    pub resample_rule: String,
}

fn default_unused_columns() -> Vec<String> {
    vec!["Vel Limit Diff [m]".to_string(), "Profile Name".to_string()]
}

fn default_point_id_column() -> String {
    "Point ID".to_string()
}

fn default_resample_rule() -> String {
    "5Min".to_string()
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            unused_columns: default_unused_columns(),
            point_id_column: default_point_id_column(),
            resample_rule: default_resample_rule(),
        }
    }
}

/// A named time window rendered in addition to the full range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotWindow {
    pub name: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Plot output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotConfig {
    /// Pixels per inch of figure size
    #[serde(default = "default_dpi")]
    pub dpi: u32,

    /// Hours between major ticks on time axes
    #[serde(default = "default_hour_interval")]
    pub hour_interval: u32,

    /// Windows rendered alongside the full range
    #[serde(default = "default_windows")]
    pub windows: Vec<PlotWindow>,
}

fn default_dpi() -> u32 {
    150
}

fn default_hour_interval() -> u32 {
    6
}

fn default_windows() -> Vec<PlotWindow> {
    vec![PlotWindow {
        name: "drainage".to_string(),
        start: ymd_hms(2013, 6, 27, 0, 0, 0),
        end: ymd_hms(2013, 6, 28, 0, 0, 0),
    }]
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            dpi: default_dpi(),
            hour_interval: default_hour_interval(),
            windows: default_windows(),
        }
    }
}

/// Main configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SurveyConfig {
    #[serde(default)]
    pub time: TimeConfig,

    #[serde(default)]
    pub projection: ProjectionConfig,

    #[serde(default)]
    pub absolute: AbsoluteConfig,

    #[serde(default)]
    pub shift: ShiftConfig,

    #[serde(default)]
    pub stations: StationConfig,

    #[serde(default)]
    pub plot: PlotConfig,
}

impl SurveyConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: SurveyConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_shift_config() {
        let config = ShiftConfig::default();
        assert_eq!(config.avg_date, ymd_hms(2013, 6, 27, 1, 48, 29));
        assert_eq!(config.before_shift, ymd_hms(2013, 6, 27, 3, 4, 17));
        assert_eq!(config.after_shift, ymd_hms(2013, 6, 27, 3, 19, 7));
        assert_eq!(config.columns.len(), 3);
    }

    #[test]
    fn test_default_survey_config() {
        let config = SurveyConfig::default();
        assert_eq!(config.time.utc_offset_hours, -8);
        assert_eq!(config.time.time_columns.last().map(String::as_str), Some("Time"));
        assert_eq!(config.projection.lon_origin, -154.0);
        assert_eq!(config.stations.resample_rule, "5Min");
        assert_eq!(config.plot.windows[0].name, "drainage");
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "time:\n  utc_offset_hours: -9\nplot:\n  dpi: 72\n";
        let config: SurveyConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.time.utc_offset_hours, -9);
        assert_eq!(config.time.local_label, "AKST");
        assert_eq!(config.plot.dpi, 72);
        assert_eq!(config.plot.hour_interval, 6);
        assert_eq!(config.absolute.epoch, ymd_hms(2013, 6, 24, 0, 0, 0));
    }

    #[test]
    fn test_yaml_round_trip_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("survey.yaml");

        let mut config = SurveyConfig::default();
        config.stations.resample_rule = "10Min".to_string();
        config.to_yaml(&path).unwrap();

        let loaded = SurveyConfig::from_yaml(&path).unwrap();
        assert_eq!(loaded.stations.resample_rule, "10Min");
        assert_eq!(loaded.shift.before_shift, config.shift.before_shift);
        assert_eq!(loaded.plot.windows, config.plot.windows);
    }
}
