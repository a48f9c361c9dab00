//! Wave processing layout
//!
//! Wave tables carry seven QC anomaly flags, a running anomaly total and the
//! name of the processing script.

use super::{DataSource, SourceProfile};

pub const WAVE_PROFILE: SourceProfile = SourceProfile {
    source: DataSource::Wave,
    anomaly_columns: &[
        "QC_anomaly_A",
        "QC_anomaly_B",
        "QC_anomaly_C",
        "QC_anomaly_D",
        "QC_anomaly_E",
        "QC_anomaly_F",
        "QC_anomaly_G",
    ],
    anomaly_outputs: &[
        "qc_anomaly_a",
        "qc_anomaly_b",
        "qc_anomaly_c",
        "qc_anomaly_d",
        "qc_anomaly_e",
        "qc_anomaly_f",
        "qc_anomaly_g",
    ],
    calibration_error_columns: ("start_error", "end_error"),
    dummy_columns: &[
        "QC_anomaly_A",
        "QC_anomaly_B",
        "QC_anomaly_C",
        "QC_anomaly_D",
        "QC_anomaly_E",
        "QC_anomaly_F",
        "QC_anomaly_G",
        "start_error",
        "end_error",
        "QC_anomalies_total",
        "processing_script",
    ],
    emits_profile: false,
    has_anomalies_total: true,
    has_multi_file_calibration: false,
};
