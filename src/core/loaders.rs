//! Loaders for survey CSV time series.
//!
//! Every tool in this crate works on a [`SurveyTable`]: a table of named
//! columns indexed by timestamp. Columns are numeric when every non-empty
//! cell parses as a float, and text otherwise (e.g. `Point ID`).

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use csv::ReaderBuilder;
use thiserror::Error;

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Cannot parse timestamp '{value}' on data row {row}")]
    TimeParse { row: usize, value: String },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Values held by a single column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Floating point values, `NaN` marks a missing cell.
    Numeric(Vec<f64>),
    /// Raw strings, an empty string marks a missing cell.
    Text(Vec<String>),
}

impl ColumnData {
    fn is_missing(&self, row: usize) -> bool {
        match self {
            ColumnData::Numeric(v) => v[row].is_nan(),
            ColumnData::Text(v) => v[row].trim().is_empty(),
        }
    }

    fn select(&self, rows: &[usize]) -> ColumnData {
        match self {
            ColumnData::Numeric(v) => ColumnData::Numeric(rows.iter().map(|&i| v[i]).collect()),
            ColumnData::Text(v) => ColumnData::Text(rows.iter().map(|&i| v[i].clone()).collect()),
        }
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

/// Time-indexed table of survey measurements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurveyTable {
    /// Row index.
    pub times: Vec<NaiveDateTime>,
    columns: Vec<Column>,
}

impl SurveyTable {
    /// Creates a table with the given index and no columns.
    pub fn new(times: Vec<NaiveDateTime>) -> Self {
        Self {
            times,
            columns: Vec::new(),
        }
    }

    /// Returns the number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Returns true if the table has no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Column names in table order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Returns a numeric column by name.
    pub fn numeric(&self, name: &str) -> Option<&[f64]> {
        self.columns.iter().find(|c| c.name == name).and_then(|c| match &c.data {
            ColumnData::Numeric(v) => Some(v.as_slice()),
            ColumnData::Text(_) => None,
        })
    }

    /// Returns a mutable numeric column by name.
    pub fn numeric_mut(&mut self, name: &str) -> Option<&mut Vec<f64>> {
        self.columns
            .iter_mut()
            .find(|c| c.name == name)
            .and_then(|c| match &mut c.data {
                ColumnData::Numeric(v) => Some(v),
                ColumnData::Text(_) => None,
            })
    }

    /// Returns a text column by name.
    pub fn text(&self, name: &str) -> Option<&[String]> {
        self.columns.iter().find(|c| c.name == name).and_then(|c| match &c.data {
            ColumnData::Text(v) => Some(v.as_slice()),
            ColumnData::Numeric(_) => None,
        })
    }

    /// Returns a numeric column or a `MissingColumns` error.
    pub fn require(&self, name: &str) -> Result<&[f64]> {
        self.numeric(name)
            .ok_or_else(|| LoaderError::MissingColumns(name.to_string()))
    }

    /// Replaces a numeric column, or appends it if it does not exist yet.
    pub fn set_numeric(&mut self, name: &str, values: Vec<f64>) {
        debug_assert_eq!(values.len(), self.len(), "column length must match index");
        let data = ColumnData::Numeric(values);
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(column) => column.data = data,
            None => self.columns.push(Column {
                name: name.to_string(),
                data,
            }),
        }
    }

    /// Replaces or appends a text column.
    pub fn set_text(&mut self, name: &str, values: Vec<String>) {
        debug_assert_eq!(values.len(), self.len(), "column length must match index");
        let data = ColumnData::Text(values);
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(column) => column.data = data,
            None => self.columns.push(Column {
                name: name.to_string(),
                data,
            }),
        }
    }

    /// Removes a column, returning true if it existed.
    pub fn remove_column(&mut self, name: &str) -> bool {
        let before = self.columns.len();
        self.columns.retain(|c| c.name != name);
        self.columns.len() != before
    }

    /// Row of the first occurrence of `time` in the index.
    pub fn position(&self, time: NaiveDateTime) -> Option<usize> {
        self.times.iter().position(|&t| t == time)
    }

    /// Builds a new table from a subset of rows.
    pub fn select_rows(&self, rows: &[usize]) -> SurveyTable {
        SurveyTable {
            times: rows.iter().map(|&i| self.times[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    data: c.data.select(rows),
                })
                .collect(),
        }
    }

    /// Drops every row with a missing value in any column.
    pub fn drop_na(&self) -> SurveyTable {
        let rows: Vec<usize> = (0..self.len())
            .filter(|&i| !self.columns.iter().any(|c| c.data.is_missing(i)))
            .collect();
        self.select_rows(&rows)
    }

    /// Keeps rows with `start <= time <= end`. Missing bounds are open.
    pub fn truncate(&self, start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> SurveyTable {
        let rows: Vec<usize> = self
            .times
            .iter()
            .enumerate()
            .filter(|&(_, &t)| start.map_or(true, |s| t >= s) && end.map_or(true, |e| t <= e))
            .map(|(i, _)| i)
            .collect();
        self.select_rows(&rows)
    }

    /// Moves the whole index by a fixed number of hours.
    pub fn shift_hours(&mut self, hours: i64) {
        let delta = chrono::Duration::hours(hours);
        for t in &mut self.times {
            *t += delta;
        }
    }
}

/// Parse a timestamp in any of the layouts found in the field exports.
///
/// Date-only values resolve to midnight.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M:%S%.f",
        "%m/%d/%Y %H:%M:%S%.f",
        "%m/%d/%Y %H:%M",
    ];
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

    let value = value.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Load a survey CSV into a [`SurveyTable`].
///
/// The index comes from the last name in `time_columns` that is present in
/// the header; that column is removed from the table. A blank header cell at
/// position `i` is named `Unnamed: i`, the name an unlabelled index gets when
/// a data frame is saved.
///
/// # Errors
///
/// Returns an error if the file cannot be read, no time column is present,
/// a timestamp does not parse, or the file has no data rows.
pub fn load_survey_csv<P: AsRef<Path>>(path: P, time_columns: &[&str]) -> Result<SurveyTable> {
    load_survey_csv_with_text(path, time_columns, &[])
}

/// Like [`load_survey_csv`], but the columns named in `text_columns` are kept
/// as text even when every cell is a number (point ids such as `007`).
pub fn load_survey_csv_with_text<P: AsRef<Path>>(
    path: P,
    time_columns: &[&str],
    text_columns: &[&str],
) -> Result<SurveyTable> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| match h.trim() {
            "" => format!("Unnamed: {}", i),
            name => name.to_string(),
        })
        .collect();

    let time_idx = time_columns
        .iter()
        .filter_map(|name| headers.iter().position(|h| h == name))
        .last()
        .ok_or_else(|| LoaderError::MissingColumns(time_columns.join(" | ")))?;

    let mut times = Vec::new();
    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];

    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let stamp = record.get(time_idx).unwrap_or("");
        let time = parse_timestamp(stamp).ok_or_else(|| LoaderError::TimeParse {
            row: row + 1,
            value: stamp.to_string(),
        })?;
        times.push(time);

        for (col, column_cells) in cells.iter_mut().enumerate() {
            column_cells.push(record.get(col).unwrap_or("").trim().to_string());
        }
    }

    if times.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    let mut table = SurveyTable::new(times);
    for (col, (name, values)) in headers.into_iter().zip(cells).enumerate() {
        if col == time_idx {
            continue;
        }
        if text_columns.contains(&name.as_str()) {
            table.set_text(&name, values);
            continue;
        }
        match parse_numeric(&values) {
            Some(numbers) => table.set_numeric(&name, numbers),
            None => table.set_text(&name, values),
        }
    }

    log::debug!(
        "Loaded {} rows and {} columns from {}",
        table.len(),
        table.columns.len(),
        path.display()
    );

    Ok(table)
}

/// Parse a column as floats; `None` if any non-empty cell is not a number.
///
/// A column with no values at all stays numeric (all `NaN`).
fn parse_numeric(values: &[String]) -> Option<Vec<f64>> {
    values
        .iter()
        .map(|v| {
            if v.is_empty() || v.eq_ignore_ascii_case("nan") {
                Some(f64::NAN)
            } else {
                v.parse::<f64>().ok()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn t(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_parse_timestamp_layouts() {
        let expected = NaiveDate::from_ymd_opt(2013, 6, 27)
            .unwrap()
            .and_hms_opt(3, 4, 17)
            .unwrap();
        assert_eq!(parse_timestamp("2013-06-27 03:04:17"), Some(expected));
        assert_eq!(parse_timestamp("2013-06-27T03:04:17"), Some(expected));
        assert_eq!(parse_timestamp("6/27/2013 03:04:17"), Some(expected));
        assert_eq!(parse_timestamp(" 2013/06/27 03:04:17 "), Some(expected));
        assert_eq!(
            parse_timestamp("6/27/2013"),
            NaiveDate::from_ymd_opt(2013, 6, 27).unwrap().and_hms_opt(0, 0, 0)
        );
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_load_survey_csv_numeric_and_text() -> Result<()> {
        let file = write_csv(
            "Time,Point ID,easting,northing\n\
             2013-06-27 00:00:00,OLGA1,1.5,2.0\n\
             2013-06-27 00:05:00,OLGA1,,3.0\n",
        );

        let table = load_survey_csv(file.path(), &["Time"])?;
        assert_eq!(table.len(), 2);
        assert_eq!(table.column_names(), vec!["Point ID", "easting", "northing"]);
        assert_eq!(table.text("Point ID").unwrap()[0], "OLGA1");
        assert_eq!(table.numeric("easting").unwrap()[0], 1.5);
        assert!(table.numeric("easting").unwrap()[1].is_nan());
        assert_eq!(table.times[1], t("2013-06-27 00:05:00"));
        Ok(())
    }

    #[test]
    fn test_load_uses_last_present_time_column() -> Result<()> {
        let file = write_csv(
            "Unnamed: 0,Time,value\n\
             2013-06-01 00:00:00,2013-06-27 10:00:00,1\n",
        );

        let table = load_survey_csv(file.path(), &["Unnamed: 0", "Time Stamp", "Time"])?;
        assert_eq!(table.times[0], t("2013-06-27 10:00:00"));
        // The unused candidate stays as an ordinary text column.
        assert!(table.text("Unnamed: 0").is_some());
        Ok(())
    }

    #[test]
    fn test_load_blank_index_header() -> Result<()> {
        let file = write_csv(",easting\n2013-06-27 00:00:00,1\n");

        let table = load_survey_csv(file.path(), &["Unnamed: 0", "Time Stamp", "Time"])?;
        assert_eq!(table.times, vec![t("2013-06-27 00:00:00")]);
        assert_eq!(table.column_names(), vec!["easting"]);
        Ok(())
    }

    #[test]
    fn test_load_keeps_requested_columns_as_text() -> Result<()> {
        let file = write_csv(
            "Time,Point ID,easting\n\
             2013-06-27 00:00:00,007,1\n",
        );

        let table = load_survey_csv_with_text(file.path(), &["Time"], &["Point ID"])?;
        assert_eq!(table.text("Point ID").unwrap(), &["007".to_string()]);
        assert_eq!(table.numeric("easting").unwrap(), &[1.0]);

        let plain = load_survey_csv(file.path(), &["Time"])?;
        assert_eq!(plain.numeric("Point ID").unwrap(), &[7.0]);
        Ok(())
    }

    #[test]
    fn test_load_fractional_seconds() -> Result<()> {
        let file = write_csv(
            "Time,value\n\
             2013-06-27 03:04:17.250,1\n\
             2013-06-27 03:04:17.750,2\n",
        );

        let table = load_survey_csv(file.path(), &["Time"])?;
        assert_ne!(table.times[0], table.times[1]);
        assert_eq!((table.times[1] - table.times[0]).num_milliseconds(), 500);
        Ok(())
    }

    #[test]
    fn test_position_returns_first_duplicate() {
        let table = SurveyTable::new(vec![
            t("2013-06-27 00:00:00"),
            t("2013-06-27 01:00:00"),
            t("2013-06-27 01:00:00"),
        ]);
        assert_eq!(table.position(t("2013-06-27 01:00:00")), Some(1));
        assert_eq!(table.position(t("2013-06-27 02:00:00")), None);
    }

    #[test]
    fn test_load_missing_time_column() {
        let file = write_csv("Date,value\n2013-06-27,1\n");
        let result = load_survey_csv(file.path(), &["Time"]);
        assert!(matches!(result, Err(LoaderError::MissingColumns(_))));
    }

    #[test]
    fn test_load_empty_file() {
        let file = write_csv("Time,value\n");
        let result = load_survey_csv(file.path(), &["Time"]);
        assert!(matches!(result, Err(LoaderError::EmptyFile(_))));
    }

    #[test]
    fn test_load_bad_timestamp_reports_row() {
        let file = write_csv("Time,value\n2013-06-27 00:00:00,1\nnot a time,2\n");
        match load_survey_csv(file.path(), &["Time"]) {
            Err(LoaderError::TimeParse { row, value }) => {
                assert_eq!(row, 2);
                assert_eq!(value, "not a time");
            }
            other => panic!("Expected TimeParse error, got {:?}", other),
        }
    }

    #[test]
    fn test_drop_na_and_truncate() {
        let mut table = SurveyTable::new(vec![
            t("2013-06-27 00:00:00"),
            t("2013-06-27 01:00:00"),
            t("2013-06-27 02:00:00"),
            t("2013-06-27 03:00:00"),
        ]);
        table.set_numeric("a", vec![1.0, f64::NAN, 3.0, 4.0]);
        table.set_text("id", vec!["x".into(), "x".into(), "".into(), "x".into()]);

        let clean = table.drop_na();
        assert_eq!(clean.len(), 2);
        assert_eq!(clean.numeric("a").unwrap(), &[1.0, 4.0]);

        let window = table.truncate(Some(t("2013-06-27 01:00:00")), Some(t("2013-06-27 02:00:00")));
        assert_eq!(window.len(), 2);
        assert_eq!(window.times[0], t("2013-06-27 01:00:00"));

        let open_end = table.truncate(Some(t("2013-06-27 02:00:00")), None);
        assert_eq!(open_end.len(), 2);
    }

    #[test]
    fn test_set_remove_and_shift() {
        let mut table = SurveyTable::new(vec![t("2013-06-27 08:00:00")]);
        table.set_numeric("a", vec![1.0]);
        table.set_numeric("a", vec![2.0]);
        assert_eq!(table.column_names(), vec!["a"]);
        assert_eq!(table.numeric("a").unwrap(), &[2.0]);
        assert!(table.require("b").is_err());

        assert!(table.remove_column("a"));
        assert!(!table.remove_column("a"));

        table.shift_hours(-8);
        assert_eq!(table.times[0], t("2013-06-27 00:00:00"));
        assert_eq!(table.position(t("2013-06-27 00:00:00")), Some(0));
    }
}
