//! CSV writer for survey tables.
//!
//! Output mirrors the layout the field scripts have always produced: the
//! timestamp index first, under a caller-chosen label, then the data columns.
//! Missing values are written as empty cells.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use thiserror::Error;

use super::loaders::{ColumnData, SurveyTable};

/// Timestamp layout used for every CSV the crate writes.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// Requested column is not in the table.
    #[error("column '{0}' not found in table")]
    UnknownColumn(String),
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Format a float cell; `NaN` becomes an empty cell.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

/// Write a survey table to CSV.
///
/// # Arguments
///
/// * `path` - Output file path (parent directories will be created if needed)
/// * `table` - Table to write
/// * `columns` - Columns to write, in order; `None` writes every column
/// * `index_label` - Header of the timestamp column
///
/// # Errors
///
/// Returns an error if a requested column does not exist, or if the file
/// cannot be created or written.
pub fn write_survey_csv(
    path: &Path,
    table: &SurveyTable,
    columns: Option<&[&str]>,
    index_label: &str,
) -> Result<()> {
    let selected: Vec<&ColumnData> = match columns {
        Some(names) => names
            .iter()
            .map(|name| {
                table
                    .columns()
                    .iter()
                    .find(|c| c.name == *name)
                    .map(|c| &c.data)
                    .ok_or_else(|| WriteError::UnknownColumn(name.to_string()))
            })
            .collect::<Result<_>>()?,
        None => table.columns().iter().map(|c| &c.data).collect(),
    };
    let header_names: Vec<&str> = match columns {
        Some(names) => names.to_vec(),
        None => table.column_names(),
    };

    ensure_parent_dirs(path)?;

    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    let mut csv_writer = csv::Writer::from_writer(BufWriter::new(file));

    let path_str = path.display().to_string();

    let mut header = Vec::with_capacity(header_names.len() + 1);
    header.push(index_label);
    header.extend(header_names);
    csv_writer
        .write_record(&header)
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;

    for (row, time) in table.times.iter().enumerate() {
        let mut record = Vec::with_capacity(selected.len() + 1);
        record.push(time.format(TIME_FORMAT).to_string());
        for data in &selected {
            record.push(match data {
                ColumnData::Numeric(v) => format_value(v[row]),
                ColumnData::Text(v) => v[row].clone(),
            });
        }
        csv_writer
            .write_record(&record)
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}
