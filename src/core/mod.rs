//! Core data types, I/O, projection and time-series arithmetic.

pub mod loaders;
pub mod projection;
pub mod transforms;
pub mod writers;

pub use loaders::{load_survey_csv, load_survey_csv_with_text, parse_timestamp, LoaderError, SurveyTable};
pub use projection::{AlbersEqualArea, ProjectionError};
pub use transforms::{ResampleError, ResampleRule};
pub use writers::{write_survey_csv, WriteError};
