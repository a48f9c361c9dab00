//! wear-collapse - Diurnally-adjusted collapsing of wearable accelerometer epochs
//!
//! wear-collapse turns one participant's epoch-level accelerometer table into
//! population-level summary variables through a deterministic pipeline:
//! cleaning → validity gate → temporal features → wear-time aggregation →
//! diurnal regression → optional sleep-hour imputation → summary encoding.
//!
//! ## Levels
//!
//! - **Summary**: one record per participant over the whole recording
//! - **Daily**: one record per participant per recording day

pub mod adapters;
pub mod checks;
pub mod cleaner;
pub mod config;
pub mod diurnal;
pub mod encoder;
pub mod error;
pub mod features;
pub mod gate;
pub mod imputer;
pub mod pipeline;
pub mod profile;
pub mod storage;
pub mod types;
pub mod wear;

#[cfg(test)]
mod test_support;

pub use adapters::DataSource;
pub use config::CollapseConfig;
pub use error::CollapseError;
pub use pipeline::{collapse_daily, collapse_summary, CollapseOutcome, CollapseProcessor, RunReport};
pub use storage::{CsvDirectorySink, CsvDirectorySource, RecordSink, RecordSource};
pub use types::CollapseLevel;

/// wear-collapse version recorded in every run report
pub const COLLAPSE_VERSION: &str = env!("CARGO_PKG_VERSION");
