//! Multi-station theodolite processing.
//!
//! Reads raw TM30 exports (one file per target), converts them to local
//! time, derives target-minus-station vectors and slope distance, and
//! optionally removes the motion of the instrument itself by differencing
//! against a fixed reference target.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::{info, warn};
use rayon::prelude::*;

use crate::config::SurveyConfig;
use crate::core::loaders::{load_survey_csv_with_text, SurveyTable};
use crate::core::transforms::{add_station_vectors, resample_mean, subtract, ResampleRule};
use crate::core::writers::{format_value, write_survey_csv};

/// Stations keyed by point id, in key order.
pub type StationSet = BTreeMap<String, SurveyTable>;

/// Columns written to the per-station CSVs.
pub const STATION_CSV_COLUMNS: [&str; 2] = ["easting", "northing"];

/// Read one raw theodolite file into local time with derived vectors.
pub fn read_station_file(path: &Path, config: &SurveyConfig) -> Result<SurveyTable> {
    let time_columns: Vec<&str> = config.time.time_columns.iter().map(String::as_str).collect();
    let text_columns = [config.stations.point_id_column.as_str()];
    let mut table = load_survey_csv_with_text(path, &time_columns, &text_columns)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    for name in &config.stations.unused_columns {
        table.remove_column(name);
    }

    table.shift_hours(config.time.utc_offset_hours);

    add_station_vectors(&mut table)
        .with_context(|| format!("Cannot derive station vectors for {}", path.display()))?;

    Ok(table)
}

/// Name of a station: its first `Point ID`, or the file stem if absent.
pub fn station_key(table: &SurveyTable, path: &Path, config: &SurveyConfig) -> String {
    let column = &config.stations.point_id_column;
    let from_column = table
        .text(column)
        .and_then(|ids| ids.first())
        .map(|id| id.trim().to_string())
        .or_else(|| table.numeric(column).and_then(|ids| ids.first()).map(|&id| format_value(id)))
        .filter(|id| !id.is_empty());

    from_column.unwrap_or_else(|| {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "station".to_string());
        warn!(
            "{} has no '{}' column, using '{}' as station name",
            path.display(),
            config.stations.point_id_column,
            stem
        );
        stem
    })
}

/// File name of the per-station CSV.
pub fn station_csv_name(key: &str) -> String {
    format!("{}_ref.csv", key.to_lowercase())
}

/// Read every station file, optionally difference against a reference,
/// and write one `<key>_ref.csv` per station into `output_dir`.
///
/// With a reference file, each station and the reference are resampled to
/// `rule` before subtraction so they share a time axis.
///
/// # Errors
///
/// Fails if any file cannot be read, if two files share a station key, or
/// if an output CSV cannot be written.
pub fn create_station_set(
    files: &[PathBuf],
    reference: Option<&Path>,
    rule: ResampleRule,
    config: &SurveyConfig,
    output_dir: &Path,
) -> Result<StationSet> {
    let reference_resampled = match reference {
        Some(path) => {
            info!("Reading reference file {}", path.display());
            let table = read_station_file(path, config)?;
            Some(resample_mean(&table, rule))
        }
        None => None,
    };

    let loaded: Vec<(String, SurveyTable)> = files
        .par_iter()
        .map(|path| -> Result<(String, SurveyTable)> {
            info!("Reading file {}", path.display());
            let table = read_station_file(path, config)?;
            let key = station_key(&table, path, config);
            let table = match &reference_resampled {
                Some(reference) => subtract(&resample_mean(&table, rule), reference),
                None => table,
            };
            Ok((key, table))
        })
        .collect::<Result<_>>()?;

    let mut set = StationSet::new();
    for ((key, table), path) in loaded.into_iter().zip(files) {
        if set.contains_key(&key) {
            bail!(
                "Duplicate station '{}' (second occurrence in {})",
                key,
                path.display()
            );
        }

        let csv_path = output_dir.join(station_csv_name(&key));
        write_survey_csv(&csv_path, &table, Some(&STATION_CSV_COLUMNS[..]), "Time Stamp")
            .with_context(|| format!("Failed to write {}", csv_path.display()))?;
        info!("Wrote {} ({} rows)", csv_path.display(), table.len());

        set.insert(key, table);
    }

    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::parse_timestamp;
    use std::fs::{self, File};
    use std::io::Write as IoWrite;
    use tempfile::TempDir;

    const HEADER: &str = "Time,Point ID,Target Easting [m],Target Northing [m],Target Elevation [m],\
                          Station Easting [m],Station Northing [m],Station Height [m],Profile Name";

    fn create_station_csv(dir: &Path, name: &str, point_id: &str, rows: &[(&str, f64, f64)]) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        writeln!(file, "{}", HEADER).unwrap();
        for (time, e, n) in rows {
            writeln!(file, "{},{},{},{},110,100,200,100,", time, point_id, e, n).unwrap();
        }
        path
    }

    #[test]
    fn test_read_station_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = create_station_csv(
            temp_dir.path(),
            "olga1.csv",
            "OLGA1",
            &[("2013-06-27 08:00:00", 103.0, 204.0)],
        );

        let config = SurveyConfig::default();
        let table = read_station_file(&path, &config).unwrap();

        // UTC to local.
        assert_eq!(table.times[0], parse_timestamp("2013-06-27 00:00:00").unwrap());
        assert!(!table.has_column("Profile Name"));
        assert_eq!(table.numeric("easting").unwrap(), &[3.0]);
        assert_eq!(table.numeric("northing").unwrap(), &[4.0]);
        assert_eq!(table.numeric("elevation").unwrap(), &[10.0]);
        let slope = table.numeric("slope_distance").unwrap()[0];
        assert!((slope - 125.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_station_key_fallback() {
        let config = SurveyConfig::default();
        let table = SurveyTable::new(vec![parse_timestamp("2013-06-27").unwrap()]);
        assert_eq!(station_key(&table, Path::new("/data/ref_rock.csv"), &config), "ref_rock");
        assert_eq!(station_csv_name("OLGA1"), "olga1_ref.csv");
    }

    #[test]
    fn test_numeric_point_id_names_the_station() {
        let temp_dir = TempDir::new().unwrap();
        let path = create_station_csv(
            temp_dir.path(),
            "station_a.csv",
            "007",
            &[("2013-06-27 08:00:00", 101.0, 201.0)],
        );

        let config = SurveyConfig::default();
        let table = read_station_file(&path, &config).unwrap();
        assert_eq!(station_key(&table, &path, &config), "007");

        // A numeric id column built in memory is still used.
        let mut numeric = SurveyTable::new(table.times.clone());
        numeric.set_numeric("Point ID", vec![101.0]);
        assert_eq!(station_key(&numeric, &path, &config), "101");
    }

    #[test]
    fn test_create_station_set_without_reference() {
        let temp_dir = TempDir::new().unwrap();
        let a = create_station_csv(
            temp_dir.path(),
            "a.csv",
            "OLGA2",
            &[("2013-06-27 08:00:00", 101.0, 201.0), ("2013-06-27 08:01:00", 102.0, 202.0)],
        );
        let b = create_station_csv(
            temp_dir.path(),
            "b.csv",
            "OLGA1",
            &[("2013-06-27 08:00:00", 105.0, 205.0)],
        );
        let out_dir = temp_dir.path().join("out");

        let config = SurveyConfig::default();
        let set = create_station_set(&[a, b], None, "5Min".parse().unwrap(), &config, &out_dir).unwrap();

        assert_eq!(set.keys().collect::<Vec<_>>(), vec!["OLGA1", "OLGA2"]);
        assert_eq!(set["OLGA2"].len(), 2);

        let content = fs::read_to_string(out_dir.join("olga2_ref.csv")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Time Stamp,easting,northing");
        assert_eq!(lines[1], "2013-06-27 00:00:00,1,1");
        assert_eq!(lines[2], "2013-06-27 00:01:00,2,2");
    }

    #[test]
    fn test_create_station_set_with_reference() {
        let temp_dir = TempDir::new().unwrap();
        let station = create_station_csv(
            temp_dir.path(),
            "olga1.csv",
            "OLGA1",
            &[
                ("2013-06-27 08:01:00", 110.0, 220.0),
                ("2013-06-27 08:03:00", 112.0, 222.0),
                ("2013-06-27 08:06:00", 120.0, 230.0),
            ],
        );
        let reference = create_station_csv(
            temp_dir.path(),
            "rock.csv",
            "ROCK",
            &[("2013-06-27 08:02:00", 101.0, 201.0)],
        );

        let config = SurveyConfig::default();
        let set = create_station_set(
            &[station],
            Some(reference.as_path()),
            "5Min".parse().unwrap(),
            &config,
            temp_dir.path(),
        )
        .unwrap();

        let table = &set["OLGA1"];
        assert_eq!(table.len(), 2);
        let easting = table.numeric("easting").unwrap();
        // Bin 00:00 holds mean 11 minus reference 1; bin 00:05 has no reference.
        assert_eq!(easting[0], 10.0);
        assert!(easting[1].is_nan());

        let content = fs::read_to_string(temp_dir.path().join("olga1_ref.csv")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[1], "2013-06-27 00:00:00,10,20");
        assert_eq!(lines[2], "2013-06-27 00:05:00,,");
    }

    #[test]
    fn test_duplicate_station_keys() {
        let temp_dir = TempDir::new().unwrap();
        let a = create_station_csv(temp_dir.path(), "a.csv", "OLGA1", &[("2013-06-27 08:00:00", 1.0, 1.0)]);
        let b = create_station_csv(temp_dir.path(), "b.csv", "OLGA1", &[("2013-06-27 08:00:00", 1.0, 1.0)]);

        let config = SurveyConfig::default();
        let result = create_station_set(&[a, b], None, "5Min".parse().unwrap(), &config, temp_dir.path());
        assert!(result.is_err());
    }
}
