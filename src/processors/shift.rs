//! Correction of the instrument re-leveling shift.
//!
//! Re-leveling the theodolite moves every target reading by a constant
//! offset. The offset is the jump observed across the gap minus the
//! displacement the target would have made during the gap at its pre-shift
//! rate. The pre-shift segment is moved by that offset so the series joins
//! the post-shift data.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use thiserror::Error;

use crate::config::ShiftConfig;
use crate::core::loaders::{load_survey_csv, SurveyTable};
use crate::core::transforms::seconds_between;
use crate::core::writers::{write_survey_csv, TIME_FORMAT};

/// Errors that can occur while correcting a shift.
#[derive(Debug, Error)]
pub enum ShiftError {
    #[error("timestamp {0} not found in the series")]
    MissingTimestamp(String),

    #[error("reference times must satisfy avg_date < before_shift < after_shift")]
    Ordering,

    #[error("column '{column}' has no value at {time}")]
    MissingValue { column: String, time: String },

    #[error("column '{0}' not found")]
    MissingColumn(String),
}

/// The three reference timestamps of a re-leveling event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftEvent {
    /// A time before the shift; with `before_shift` it gives the pre-shift rate.
    pub avg_date: NaiveDateTime,
    /// Last sample before the shift.
    pub before_shift: NaiveDateTime,
    /// First sample after the shift.
    pub after_shift: NaiveDateTime,
}

impl ShiftEvent {
    pub fn new(
        avg_date: NaiveDateTime,
        before_shift: NaiveDateTime,
        after_shift: NaiveDateTime,
    ) -> std::result::Result<Self, ShiftError> {
        if !(avg_date < before_shift && before_shift < after_shift) {
            return Err(ShiftError::Ordering);
        }
        Ok(Self {
            avg_date,
            before_shift,
            after_shift,
        })
    }

    /// The re-leveling on 2013-06-27 (UTC), taken from the configured defaults.
    pub fn campaign_2013() -> Self {
        let config = ShiftConfig::default();
        Self {
            avg_date: config.avg_date,
            before_shift: config.before_shift,
            after_shift: config.after_shift,
        }
    }

    /// Seconds between `avg_date` and `before_shift`.
    pub fn rate_window_seconds(&self) -> f64 {
        seconds_between(self.avg_date, self.before_shift)
    }

    /// Seconds between `before_shift` and `after_shift`.
    pub fn gap_seconds(&self) -> f64 {
        seconds_between(self.before_shift, self.after_shift)
    }
}

/// Correction computed for one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftCorrection {
    pub column: String,
    /// Observed jump across the gap, `c[after] - c[before]`.
    pub step: f64,
    /// Expected movement during the gap at the pre-shift rate.
    pub drift: f64,
}

impl ShiftCorrection {
    /// Offset added to the pre-shift segment.
    pub fn offset(&self) -> f64 {
        self.step - self.drift
    }
}

/// Summary of a fix-shift run.
#[derive(Debug, Clone)]
pub struct ShiftSummary {
    pub rows: usize,
    pub rows_corrected: usize,
    pub corrections: Vec<ShiftCorrection>,
}

fn value_at(
    table: &SurveyTable,
    values: &[f64],
    column: &str,
    time: NaiveDateTime,
) -> std::result::Result<f64, ShiftError> {
    let row = table
        .position(time)
        .ok_or_else(|| ShiftError::MissingTimestamp(time.format(TIME_FORMAT).to_string()))?;
    let value = values[row];
    if value.is_nan() {
        return Err(ShiftError::MissingValue {
            column: column.to_string(),
            time: time.format(TIME_FORMAT).to_string(),
        });
    }
    Ok(value)
}

/// Compute the correction for each column.
///
/// # Errors
///
/// Fails if a reference timestamp is not in the index, or a column is
/// missing or has no value at a reference timestamp.
pub fn compute_corrections(
    table: &SurveyTable,
    event: &ShiftEvent,
    columns: &[String],
) -> std::result::Result<Vec<ShiftCorrection>, ShiftError> {
    let dt_total = event.rate_window_seconds();
    let dt_step = event.gap_seconds();

    columns
        .iter()
        .map(|column| -> std::result::Result<ShiftCorrection, ShiftError> {
            let values = table
                .numeric(column)
                .ok_or_else(|| ShiftError::MissingColumn(column.clone()))?;
            let at_avg = value_at(table, values, column, event.avg_date)?;
            let at_before = value_at(table, values, column, event.before_shift)?;
            let at_after = value_at(table, values, column, event.after_shift)?;

            Ok(ShiftCorrection {
                column: column.clone(),
                step: at_after - at_before,
                drift: (at_before - at_avg) / dt_total * dt_step,
            })
        })
        .collect()
}

/// Add each correction's offset to every row at or before `before_shift`.
///
/// Returns the number of rows moved.
pub fn apply_corrections(
    table: &mut SurveyTable,
    event: &ShiftEvent,
    corrections: &[ShiftCorrection],
) -> usize {
    let rows: Vec<usize> = table
        .times
        .iter()
        .enumerate()
        .filter(|&(_, &t)| t <= event.before_shift)
        .map(|(i, _)| i)
        .collect();

    for correction in corrections {
        let offset = correction.offset();
        if let Some(values) = table.numeric_mut(&correction.column) {
            for &i in &rows {
                values[i] += offset;
            }
        }
        log::debug!(
            "{}: step {:.4}, drift {:.4}, offset {:.4}",
            correction.column,
            correction.step,
            correction.drift,
            offset
        );
    }
    rows.len()
}

/// Read `input`, correct the shift, and write all columns to `output`.
pub fn fix_shift_file(
    input: &Path,
    output: &Path,
    event: &ShiftEvent,
    columns: &[String],
) -> Result<ShiftSummary> {
    let mut table = load_survey_csv(input, &["Time"])
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let corrections = compute_corrections(&table, event, columns)
        .with_context(|| format!("Cannot compute shift correction for {}", input.display()))?;
    let rows_corrected = apply_corrections(&mut table, event, &corrections);

    write_survey_csv(output, &table, None, "Time")
        .with_context(|| format!("Failed to write {}", output.display()))?;

    log::info!(
        "Corrected {} of {} rows in {}",
        rows_corrected,
        table.len(),
        input.display()
    );

    Ok(ShiftSummary {
        rows: table.len(),
        rows_corrected,
        corrections,
    })
}
