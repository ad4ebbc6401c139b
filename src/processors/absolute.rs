//! Anchoring relative displacements to absolute coordinates.
//!
//! The GPS marker gives one absolute position for the target; the relative
//! easting/northing series is pinned to it in EPSG:3338 and converted back
//! to longitude/latitude.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use thiserror::Error;

use crate::config::SurveyConfig;
use crate::core::loaders::{load_survey_csv, SurveyTable};
use crate::core::projection::AlbersEqualArea;
use crate::core::transforms::{first_valid_index, hours_since};
use crate::core::writers::write_survey_csv;

/// Output columns, after the `Time` index.
pub const OUTPUT_COLUMNS: [&str; 6] = ["idx", "lon", "lat", "elevation", "easting", "northing"];

/// Errors specific to absolutizing a series.
#[derive(Debug, Error)]
pub enum AbsoluteError {
    #[error("no complete rows left after dropping missing values")]
    NoCompleteRows,

    #[error("latitude {0} is outside [-90, 90]")]
    InvalidLatitude(f64),
}

/// Known absolute position of the first sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoAnchor {
    pub lat: f64,
    pub lon: f64,
}

impl GeoAnchor {
    pub fn new(lat: f64, lon: f64) -> std::result::Result<Self, AbsoluteError> {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(AbsoluteError::InvalidLatitude(lat));
        }
        Ok(Self { lat, lon })
    }
}

/// Summary of an absolutize run.
#[derive(Debug, Clone)]
pub struct AbsoluteSummary {
    pub rows_in: usize,
    pub rows_out: usize,
    pub anchor_x: f64,
    pub anchor_y: f64,
}

/// Convert a relative series into absolute coordinates.
///
/// Rows with any missing value are dropped first. The returned table has the
/// columns in [`OUTPUT_COLUMNS`], where `easting`/`northing` are absolute
/// projected meters and `idx` is hours since `epoch`.
pub fn absolutize(
    table: &SurveyTable,
    anchor: GeoAnchor,
    projection: &AlbersEqualArea,
    epoch: NaiveDateTime,
) -> Result<SurveyTable> {
    let clean = table.drop_na();
    if clean.is_empty() {
        return Err(AbsoluteError::NoCompleteRows.into());
    }

    let easting = clean.require("easting")?;
    let northing = clean.require("northing")?;
    let elevation = clean.require("elevation")?.to_vec();

    let (x0, y0) = projection.forward(anchor.lon, anchor.lat);

    let shift = |values: &[f64], origin: f64| -> Vec<f64> {
        let first = first_valid_index(values).map_or(0.0, |i| values[i]);
        values.iter().map(|v| origin + (v - first)).collect()
    };
    let x = shift(easting, x0);
    let y = shift(northing, y0);

    let mut lon = Vec::with_capacity(x.len());
    let mut lat = Vec::with_capacity(x.len());
    for (&xi, &yi) in x.iter().zip(&y) {
        let (lo, la) = projection.inverse(xi, yi)?;
        lon.push(lo);
        lat.push(la);
    }

    let mut out = SurveyTable::new(clean.times.clone());
    out.set_numeric("idx", hours_since(&clean.times, epoch));
    out.set_numeric("lon", lon);
    out.set_numeric("lat", lat);
    out.set_numeric("elevation", elevation);
    out.set_numeric("easting", x);
    out.set_numeric("northing", y);
    Ok(out)
}

/// Read `input`, absolutize it, and write `output`.
pub fn absolutize_file(
    input: &Path,
    output: &Path,
    anchor: GeoAnchor,
    epoch: NaiveDateTime,
    config: &SurveyConfig,
) -> Result<AbsoluteSummary> {
    let table = load_survey_csv(input, &["Time"])
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let projection = AlbersEqualArea::new(&config.projection)?;
    let out = absolutize(&table, anchor, &projection, epoch)
        .with_context(|| format!("Failed to absolutize {}", input.display()))?;

    write_survey_csv(output, &out, Some(&OUTPUT_COLUMNS[..]), "Time")
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let (anchor_x, anchor_y) = projection.forward(anchor.lon, anchor.lat);
    log::info!(
        "Absolutized {} of {} rows from {} (anchor {:.3}, {:.3})",
        out.len(),
        table.len(),
        input.display(),
        anchor_x,
        anchor_y
    );

    Ok(AbsoluteSummary {
        rows_in: table.len(),
        rows_out: out.len(),
        anchor_x,
        anchor_y,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::parse_timestamp;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    fn t(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    fn relative_table() -> SurveyTable {
        let mut table = SurveyTable::new(vec![
            t("2013-06-24 00:00:00"),
            t("2013-06-24 06:00:00"),
            t("2013-06-24 12:00:00"),
        ]);
        table.set_numeric("easting", vec![10.0, 11.0, f64::NAN]);
        table.set_numeric("northing", vec![-5.0, -3.0, 1.0]);
        table.set_numeric("elevation", vec![500.0, 500.5, 501.0]);
        table
    }

    #[test]
    fn test_absolutize_pins_first_row_to_anchor() {
        let proj = AlbersEqualArea::alaska().unwrap();
        let anchor = GeoAnchor::new(61.2, -147.7).unwrap();
        let out = absolutize(&relative_table(), anchor, &proj, t("2013-06-24 00:00:00")).unwrap();

        // Row with missing easting is dropped.
        assert_eq!(out.len(), 2);
        assert_eq!(out.column_names(), OUTPUT_COLUMNS.to_vec());

        let lat = out.numeric("lat").unwrap();
        let lon = out.numeric("lon").unwrap();
        assert!((lat[0] - 61.2).abs() < 1e-9);
        assert!((lon[0] + 147.7).abs() < 1e-9);

        let (x0, y0) = proj.forward(-147.7, 61.2);
        let easting = out.numeric("easting").unwrap();
        let northing = out.numeric("northing").unwrap();
        assert!((easting[1] - (x0 + 1.0)).abs() < 1e-6);
        assert!((northing[1] - (y0 + 2.0)).abs() < 1e-6);

        assert_eq!(out.numeric("idx").unwrap(), &[0.0, 6.0]);
        assert_eq!(out.numeric("elevation").unwrap(), &[500.0, 500.5]);
    }

    #[test]
    fn test_absolutize_all_rows_missing() {
        let mut table = SurveyTable::new(vec![t("2013-06-24 00:00:00")]);
        table.set_numeric("easting", vec![f64::NAN]);
        table.set_numeric("northing", vec![1.0]);
        table.set_numeric("elevation", vec![1.0]);

        let result = absolutize(
            &table,
            GeoAnchor::new(61.0, -147.0).unwrap(),
            &AlbersEqualArea::alaska().unwrap(),
            t("2013-06-24 00:00:00"),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_latitude() {
        assert!(matches!(
            GeoAnchor::new(91.0, 0.0),
            Err(AbsoluteError::InvalidLatitude(_))
        ));
    }

    #[test]
    fn test_absolutize_file() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("relative.csv");
        {
            let mut file = File::create(&input).unwrap();
            writeln!(file, "Time,easting,northing,elevation").unwrap();
            writeln!(file, "2013-06-25 00:00:00,0.0,0.0,400.0").unwrap();
            writeln!(file, "2013-06-25 01:30:00,,0.2,400.1").unwrap();
            writeln!(file, "2013-06-25 03:00:00,0.5,0.4,400.2").unwrap();
        }
        let output = temp_dir.path().join("absolute.csv");

        let config = SurveyConfig::default();
        let summary = absolutize_file(
            &input,
            &output,
            GeoAnchor::new(61.0, -147.0).unwrap(),
            config.absolute.epoch,
            &config,
        )
        .unwrap();

        assert_eq!(summary.rows_in, 3);
        assert_eq!(summary.rows_out, 2);

        let content = fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Time,idx,lon,lat,elevation,easting,northing");
        assert!(lines[1].starts_with("2013-06-25 00:00:00,24,"));
        assert!(lines[2].starts_with("2013-06-25 03:00:00,27,"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_absolutize_file_missing_columns() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("relative.csv");
        fs::write(&input, "Time,easting\n2013-06-25 00:00:00,1.0\n").unwrap();

        let config = SurveyConfig::default();
        let result = absolutize_file(
            &input,
            &temp_dir.path().join("out.csv"),
            GeoAnchor::new(61.0, -147.0).unwrap(),
            config.absolute.epoch,
            &config,
        );
        assert!(result.is_err());
    }
}
