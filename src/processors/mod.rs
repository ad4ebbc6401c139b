//! Data processing modules.

pub mod absolute;
pub mod shift;
pub mod stations;

// Re-export key types for convenience
pub use absolute::{absolutize, absolutize_file, AbsoluteError, AbsoluteSummary, GeoAnchor};
pub use shift::{
    apply_corrections, compute_corrections, fix_shift_file, ShiftCorrection, ShiftError,
    ShiftEvent, ShiftSummary,
};
pub use stations::{create_station_set, read_station_file, station_key, StationSet};
