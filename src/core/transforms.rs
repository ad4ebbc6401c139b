//! Time-indexed arithmetic on survey tables.
//!
//! This module provides the vector and distance computations applied to raw
//! theodolite exports, elapsed-time indices, and the resample/difference
//! steps used to remove a reference station's motion.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime};
use thiserror::Error;

use super::loaders::{ColumnData, LoaderError, SurveyTable};

/// Target minus station column pairs, named by output column.
pub const STATION_VECTOR_COLUMNS: [(&str, &str, &str); 3] = [
    ("easting", "Target Easting [m]", "Station Easting [m]"),
    ("northing", "Target Northing [m]", "Station Northing [m]"),
    ("elevation", "Target Elevation [m]", "Station Height [m]"),
];

/// Errors from parsing a resample rule.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResampleError {
    #[error("invalid resample rule '{0}' (expected e.g. 5Min, 30S, 1H, 1D)")]
    InvalidRule(String),
}

/// Longest accepted resample bin, one leap year.
pub const MAX_RULE_SECONDS: i64 = 366 * 86_400;

/// Index of the first value that is not `NaN`.
pub fn first_valid_index(values: &[f64]) -> Option<usize> {
    values.iter().position(|v| !v.is_nan())
}

/// Subtract the first valid value from every element.
///
/// A column with no valid value is returned unchanged (all `NaN`).
pub fn relative_to_first_valid(values: &[f64]) -> Vec<f64> {
    match first_valid_index(values) {
        Some(idx) => {
            let origin = values[idx];
            values.iter().map(|v| v - origin).collect()
        }
        None => values.to_vec(),
    }
}

/// Hours elapsed since `epoch` for each timestamp.
pub fn hours_since(times: &[NaiveDateTime], epoch: NaiveDateTime) -> Vec<f64> {
    times
        .iter()
        .map(|&t| seconds_between(epoch, t) / 3600.0)
        .collect()
}

/// Seconds elapsed since the first timestamp.
pub fn seconds_since_start(times: &[NaiveDateTime]) -> Vec<f64> {
    match times.first() {
        Some(&start) => times.iter().map(|&t| seconds_between(start, t)).collect(),
        None => Vec::new(),
    }
}

/// Signed seconds from `from` to `to`, with sub-second precision.
pub fn seconds_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    let delta = to - from;
    delta.num_milliseconds() as f64 / 1000.0
}

/// Euclidean distance of three component vectors.
pub fn slope_distance(easting: &[f64], northing: &[f64], elevation: &[f64]) -> Vec<f64> {
    easting
        .iter()
        .zip(northing)
        .zip(elevation)
        .map(|((e, n), h)| (e * e + n * n + h * h).sqrt())
        .collect()
}

/// Add `easting`, `northing`, `elevation` (target minus station) and
/// `slope_distance` to a raw theodolite table.
///
/// # Errors
///
/// Returns `MissingColumns` if any target or station column is absent.
pub fn add_station_vectors(table: &mut SurveyTable) -> Result<(), LoaderError> {
    let mut components = Vec::with_capacity(STATION_VECTOR_COLUMNS.len());
    for (name, target, station) in STATION_VECTOR_COLUMNS {
        let target = table.require(target)?;
        let station = table.require(station)?;
        let diff: Vec<f64> = target.iter().zip(station).map(|(t, s)| t - s).collect();
        components.push((name, diff));
    }

    let distance = slope_distance(&components[0].1, &components[1].1, &components[2].1);
    for (name, values) in components {
        table.set_numeric(name, values);
    }
    table.set_numeric("slope_distance", distance);
    Ok(())
}

/// Fixed-width bin size for resampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResampleRule {
    seconds: i64,
}

impl ResampleRule {
    pub fn from_seconds(seconds: i64) -> Result<Self, ResampleError> {
        if seconds <= 0 || seconds > MAX_RULE_SECONDS {
            return Err(ResampleError::InvalidRule(format!("{}S", seconds)));
        }
        Ok(Self { seconds })
    }

    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    /// Left edge of the bin containing `t`, with bins counted from `origin`.
    fn bin_start(&self, t: NaiveDateTime, origin: NaiveDateTime) -> NaiveDateTime {
        let offset = (t - origin).num_seconds();
        origin + Duration::seconds(offset.div_euclid(self.seconds) * self.seconds)
    }
}

impl FromStr for ResampleRule {
    type Err = ResampleError;

    /// Parse pandas-style offset aliases such as `5Min`, `5T`, `30S`, `1H`, `1D`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (count, unit) = trimmed.split_at(split);

        let count: i64 = if count.is_empty() {
            1
        } else {
            count
                .parse()
                .map_err(|_| ResampleError::InvalidRule(s.to_string()))?
        };

        let unit_seconds = match unit.to_ascii_lowercase().as_str() {
            "s" | "sec" | "second" | "seconds" => 1,
            "t" | "min" | "minute" | "minutes" => 60,
            "h" | "hour" | "hours" => 3600,
            "d" | "day" | "days" => 86_400,
            _ => return Err(ResampleError::InvalidRule(s.to_string())),
        };

        count
            .checked_mul(unit_seconds)
            .ok_or_else(|| ResampleError::InvalidRule(s.to_string()))
            .and_then(Self::from_seconds)
            .map_err(|_| ResampleError::InvalidRule(s.to_string()))
    }
}

impl fmt::Display for ResampleRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.seconds % 3600 == 0 {
            write!(f, "{}H", self.seconds / 3600)
        } else if self.seconds % 60 == 0 {
            write!(f, "{}Min", self.seconds / 60)
        } else {
            write!(f, "{}S", self.seconds)
        }
    }
}

/// Downsample a table to a regular grid of bin means.
///
/// Bins are aligned to midnight of the first row's day and labelled by their
/// left edge. Every bin between the first and the last occupied one is
/// emitted; empty bins hold `NaN`. Text columns are dropped.
pub fn resample_mean(table: &SurveyTable, rule: ResampleRule) -> SurveyTable {
    let Some(&first) = table.times.iter().min() else {
        return SurveyTable::default();
    };
    let origin = first.date().and_hms_opt(0, 0, 0).unwrap_or(first);

    let bins: Vec<NaiveDateTime> = table.times.iter().map(|&t| rule.bin_start(t, origin)).collect();
    let first_bin = bins.iter().copied().min().unwrap_or(origin);
    let last_bin = bins.iter().copied().max().unwrap_or(origin);

    let step = Duration::seconds(rule.seconds);
    let mut grid = Vec::new();
    let mut t = first_bin;
    while t <= last_bin {
        grid.push(t);
        match t.checked_add_signed(step) {
            Some(next) => t = next,
            None => break,
        }
    }
    let slot = |bin: NaiveDateTime| ((bin - first_bin).num_seconds() / rule.seconds) as usize;

    let mut out = SurveyTable::new(grid.clone());
    for column in table.columns() {
        let ColumnData::Numeric(values) = &column.data else {
            continue;
        };
        let mut sums = vec![0.0; grid.len()];
        let mut counts = vec![0usize; grid.len()];
        for (&bin, &v) in bins.iter().zip(values) {
            if !v.is_nan() {
                let i = slot(bin);
                sums[i] += v;
                counts[i] += 1;
            }
        }
        let means = sums
            .iter()
            .zip(&counts)
            .map(|(&s, &c)| if c > 0 { s / c as f64 } else { f64::NAN })
            .collect();
        out.set_numeric(&column.name, means);
    }

    log::debug!(
        "Resampled {} rows to {} bins of {}",
        table.len(),
        out.len(),
        rule
    );
    out
}

/// Element-wise `a - b`, aligned on the union of both indexes and the union
/// of their numeric columns. Cells without a value on both sides are `NaN`.
pub fn subtract(a: &SurveyTable, b: &SurveyTable) -> SurveyTable {
    let index: BTreeSet<NaiveDateTime> = a.times.iter().chain(&b.times).copied().collect();
    let times: Vec<NaiveDateTime> = index.into_iter().collect();

    let lookup = |table: &SurveyTable| -> BTreeMap<NaiveDateTime, usize> {
        let mut map = BTreeMap::new();
        for (i, &t) in table.times.iter().enumerate() {
            map.entry(t).or_insert(i);
        }
        map
    };
    let rows_a = lookup(a);
    let rows_b = lookup(b);

    let mut names: Vec<&str> = Vec::new();
    for name in a.column_names().into_iter().chain(b.column_names()) {
        let numeric = a.numeric(name).is_some() || b.numeric(name).is_some();
        if numeric && !names.contains(&name) {
            names.push(name);
        }
    }

    let mut out = SurveyTable::new(times.clone());
    for name in names {
        let col_a = a.numeric(name);
        let col_b = b.numeric(name);
        let values = times
            .iter()
            .map(|t| {
                let va = col_a.zip(rows_a.get(t)).map(|(c, &i)| c[i]);
                let vb = col_b.zip(rows_b.get(t)).map(|(c, &i)| c[i]);
                match (va, vb) {
                    (Some(x), Some(y)) => x - y,
                    _ => f64::NAN,
                }
            })
            .collect();
        out.set_numeric(name, values);
    }
    out
}
