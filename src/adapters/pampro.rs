//! Pampro processing layout
//!
//! Pampro tables carry six anomaly flags, single- and multi-file calibration
//! residuals and the calibration type. Their summaries also include the
//! hourly and weekday diurnal profile.

use super::{DataSource, SourceProfile};

pub const PAMPRO_PROFILE: SourceProfile = SourceProfile {
    source: DataSource::Pampro,
    anomaly_columns: &["Anom_A", "Anom_B", "Anom_C", "Anom_D", "Anom_E", "Anom_F"],
    anomaly_outputs: &["Anom_A", "Anom_B", "Anom_C", "Anom_D", "Anom_E", "Anom_F"],
    calibration_error_columns: ("file_start_error", "file_end_error"),
    dummy_columns: &[
        "Anom_A",
        "Anom_B",
        "Anom_C",
        "Anom_D",
        "Anom_E",
        "Anom_F",
        "calibration_type",
        "file_start_error",
        "file_end_error",
        "mf_start_error",
        "mf_end_error",
    ],
    emits_profile: true,
    has_anomalies_total: false,
    has_multi_file_calibration: true,
};
