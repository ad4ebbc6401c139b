//! Post-processing for glacier theodolite and GPS surveys.
//!
//! This crate provides tools for:
//! - Loading time-indexed survey CSVs and writing them back out
//! - Anchoring relative coordinates to a GPS marker via Albers projection
//! - Removing an instrument re-leveling shift from a target series
//! - Processing multi-station theodolite exports, with reference-target
//!   differencing and diagnostic plots
//!
//! # Example
//!
//! ```no_run
//! use theo_survey::processors::{fix_shift_file, ShiftEvent};
//! use std::path::Path;
//!
//! let columns = vec!["Target Easting [m]".to_string()];
//! let summary = fix_shift_file(
//!     Path::new("olga1.csv"),
//!     Path::new("olga1_fixed.csv"),
//!     &ShiftEvent::campaign_2013(),
//!     &columns,
//! )
//! .unwrap();
//! println!("{} rows corrected", summary.rows_corrected);
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod visualization;

pub use config::{
    AbsoluteConfig, PlotConfig, PlotWindow, ProjectionConfig, ShiftConfig, StationConfig, SurveyConfig,
    TimeConfig,
};
pub use core::loaders::SurveyTable;
pub use processors::stations::StationSet;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
