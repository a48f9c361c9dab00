//! Upstream processing adapters
//!
//! Epoch tables come from one of two upstream processing tools. Each tool names
//! its calibration and anomaly columns differently and emits a slightly
//! different set of metadata. A [`DataSource`] tag is resolved once into a
//! [`SourceProfile`] that every later stage reads from.

mod pampro;
mod reader;
mod wave;

pub use pampro::PAMPRO_PROFILE;
pub use reader::{parse_timestamp, EpochTableReader, EpochTableWriter, MetadataReader, TIMESTAMP_OUTPUT_FORMAT};
pub use wave::WAVE_PROFILE;

use serde::{Deserialize, Serialize};

/// Upstream processing tool that produced the epoch tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    #[default]
    Wave,
    Pampro,
}

impl DataSource {
    /// Resolve the column layout and capabilities of this source
    pub fn profile(&self) -> &'static SourceProfile {
        match self {
            DataSource::Wave => &WAVE_PROFILE,
            DataSource::Pampro => &PAMPRO_PROFILE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Wave => "wave",
            DataSource::Pampro => "pampro",
        }
    }
}

/// Column names and capabilities of one upstream processing tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceProfile {
    pub source: DataSource,
    /// Anomaly flag columns in the epoch table, A first
    pub anomaly_columns: &'static [&'static str],
    /// Matching column names in the summary output
    pub anomaly_outputs: &'static [&'static str],
    /// Single-file calibration residual columns (start, end) in the epoch table
    pub calibration_error_columns: (&'static str, &'static str),
    /// Source-specific columns copied into a dummy record, in output order
    pub dummy_columns: &'static [&'static str],
    /// Emits the hourly/weekday diurnal profile in the summary
    pub emits_profile: bool,
    /// Carries `QC_anomalies_total`
    pub has_anomalies_total: bool,
    /// Carries multi-file calibration errors and calibration type
    pub has_multi_file_calibration: bool,
}

/// Identity and metadata columns leading every dummy record, in output order
pub const COMMON_DUMMY_COLUMNS: [&str; 11] = [
    "id",
    "FLAG_NO_VALID_DAYS",
    "device",
    "calibration_method",
    "noise_cutoff_mg",
    "processing_epoch",
    "generic_first_timestamp",
    "generic_last_timestamp",
    "QC_first_battery_pct",
    "QC_last_battery_pct",
    "frequency",
];
