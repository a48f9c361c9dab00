//! Core types for the collapsing pipeline
//!
//! This module defines the data structures that flow through each stage:
//! raw epoch records, derived epochs, wear-time aggregates, diurnal estimates
//! and the summary/dummy records that are finally emitted.

use crate::error::CollapseError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Accelerometer summary measure carried by each epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Measure {
    Enmo,
    Hpfvm,
}

impl Measure {
    /// Column prefix used by the epoch tables (`ENMO_mean`, `ENMO_5plus`)
    pub fn input_prefix(&self) -> &'static str {
        match self {
            Measure::Enmo => "ENMO",
            Measure::Hpfvm => "HPFVM",
        }
    }

    /// Column prefix used by the summary tables (`enmo_mean`, `enmo_5plus`)
    pub fn output_prefix(&self) -> &'static str {
        match self {
            Measure::Enmo => "enmo",
            Measure::Hpfvm => "hpfvm",
        }
    }
}

/// Mean and intensity-threshold proportions for one measure in one epoch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasureValues {
    /// Mean magnitude (milli-g); `None` when missing or flagged invalid
    pub mean: Option<f64>,
    /// Proportion of the epoch at or above each configured threshold,
    /// aligned with `CollapseConfig::thresholds`
    pub at_least: Vec<Option<f64>>,
}

/// Device, calibration and QC metadata repeated on every epoch row.
///
/// Values are carried as text and passed through to the output untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceMetadata {
    pub device: Option<String>,
    pub calibration_method: Option<String>,
    pub calibration_type: Option<String>,
    pub noise_cutoff: Option<String>,
    pub processing_epoch: Option<String>,
    pub generic_first_timestamp: Option<String>,
    pub generic_last_timestamp: Option<String>,
    pub qc_first_battery_pct: Option<String>,
    pub qc_last_battery_pct: Option<String>,
    pub frequency: Option<String>,
    pub start_error: Option<String>,
    pub end_error: Option<String>,
    pub mf_start_error: Option<String>,
    pub mf_end_error: Option<String>,
    pub qc_anomalies_total: Option<String>,
    pub processing_script: Option<String>,
    /// Anomaly flags A-G
    pub anomalies: [Option<String>; 7],
}

/// Position of anomaly F in every source's anomaly columns
pub const ANOMALY_F_INDEX: usize = 5;

impl DeviceMetadata {
    /// Numeric value of anomaly F, if present and parseable
    pub fn anomaly_f(&self) -> Option<f64> {
        self.anomalies[ANOMALY_F_INDEX]
            .as_deref()
            .and_then(|v| v.trim().parse::<f64>().ok())
    }
}

/// Wear-log columns attached to each epoch when a wear log was supplied
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WearLogFields {
    /// 1 = inside logged window, 2 = no window given, 0 = outside window
    pub day_valid: Option<i64>,
    pub start: Option<String>,
    pub end: Option<String>,
    /// `flag_no_wear_info`, `flag_no_end_date`, `flag_missing_starthour`,
    /// `flag_missing_endhour`
    pub flags: [Option<f64>; 4],
}

/// Wear-log flag column names, in `WearLogFields::flags` order
pub const WEAR_LOG_FLAGS: [&str; 4] = [
    "flag_no_wear_info",
    "flag_no_end_date",
    "flag_missing_starthour",
    "flag_missing_endhour",
];

/// One fixed-duration row of a participant's recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub file_id: String,
    /// Adjusted timestamp (`DATETIME`)
    pub timestamp: NaiveDateTime,
    /// Original device timestamp (`DATETIME_ORIG`)
    pub timestamp_orig: NaiveDateTime,
    /// Calendar date as written upstream (`DATE`)
    pub date: Option<String>,
    /// Hour of day, 1-24
    pub hour_of_day: u8,
    /// Day of week, 1 (Monday) - 7 (Sunday)
    pub day_of_week: Option<u8>,
    /// Wear probability, 0-1
    pub pwear: Option<f64>,
    pub enmo: MeasureValues,
    pub hpfvm: Option<MeasureValues>,
    pub flag_mech_noise: Option<f64>,
    /// Upstream "no valid days" suppression flag
    pub flag_no_valid_days: Option<f64>,
    pub wear_log: WearLogFields,
    pub metadata: DeviceMetadata,
}

impl EpochRecord {
    pub fn measure(&self, measure: Measure) -> Option<&MeasureValues> {
        match measure {
            Measure::Enmo => Some(&self.enmo),
            Measure::Hpfvm => self.hpfvm.as_ref(),
        }
    }

    /// Value of an output variable in this epoch
    pub fn value(&self, variable: &OutputVariable) -> Option<f64> {
        let values = self.measure(variable.measure)?;
        match variable.kind {
            VariableKind::Mean => values.mean,
            VariableKind::AtLeast { index, .. } => values.at_least.get(index).copied().flatten(),
        }
    }
}

/// All epochs of one participant, sorted by (`file_id`, `DATETIME`)
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantEpochs {
    pub file_id: String,
    pub records: Vec<EpochRecord>,
}

impl ParticipantEpochs {
    pub fn new(file_id: impl Into<String>, mut records: Vec<EpochRecord>) -> Self {
        records.sort_by(|a, b| {
            a.file_id
                .cmp(&b.file_id)
                .then_with(|| a.timestamp.cmp(&b.timestamp))
        });
        Self {
            file_id: file_id.into(),
            records,
        }
    }

    /// Epoch length in minutes, from the gap between the first two original
    /// timestamps. `None` when fewer than two rows exist.
    pub fn time_resolution(&self) -> Result<Option<f64>, CollapseError> {
        let (first, second) = match (self.records.first(), self.records.get(1)) {
            (Some(first), Some(second)) => (first, second),
            _ => return Ok(None),
        };

        let minutes = (second.timestamp_orig - first.timestamp_orig).num_seconds() as f64 / 60.0;
        if minutes <= 0.0 {
            return Err(CollapseError::InvalidTimeResolution(format!(
                "{}: first two epochs are {} minutes apart",
                self.file_id, minutes
            )));
        }
        Ok(Some(minutes))
    }
}

/// Converts a sum of per-epoch wear probabilities into hours: `hours = sum / formula`
pub fn wear_formula(time_resolution_minutes: f64) -> f64 {
    60.0 / time_resolution_minutes
}

/// Six-hour bucket of the day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quadrant {
    Morning,
    Noon,
    Afternoon,
    Night,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [
        Quadrant::Morning,
        Quadrant::Noon,
        Quadrant::Afternoon,
        Quadrant::Night,
    ];

    /// Quadrant containing an hour of day (1-24)
    pub fn from_hour(hour_of_day: u8) -> Option<Self> {
        match hour_of_day {
            1..=6 => Some(Quadrant::Morning),
            7..=12 => Some(Quadrant::Noon),
            13..=18 => Some(Quadrant::Afternoon),
            19..=24 => Some(Quadrant::Night),
            _ => None,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Quadrant::Morning => 0,
            Quadrant::Noon => 1,
            Quadrant::Afternoon => 2,
            Quadrant::Night => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Quadrant::Morning => "morning",
            Quadrant::Noon => "noon",
            Quadrant::Afternoon => "afternoon",
            Quadrant::Night => "night",
        }
    }

    /// Hour range in the notation used by the data dictionaries
    pub fn hour_range(&self) -> &'static str {
        match self {
            Quadrant::Morning => "hourofday>0 & hourofday<=6",
            Quadrant::Noon => "hourofday>6 & hourofday<=12",
            Quadrant::Afternoon => "hourofday>12 & hourofday<=18",
            Quadrant::Night => "hourofday>18 & hourofday<=24",
        }
    }
}

/// Weekday (Mon-Fri) or weekend (Sat-Sun)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayType {
    Weekday,
    Weekend,
}

impl DayType {
    pub const ALL: [DayType; 2] = [DayType::Weekday, DayType::Weekend];

    /// Classify an ISO day of week (1 = Monday); `None` outside 1-7
    pub fn from_day_of_week(day_of_week: u8) -> Option<Self> {
        match day_of_week {
            1..=5 => Some(DayType::Weekday),
            6 | 7 => Some(DayType::Weekend),
            _ => None,
        }
    }

    /// Suffix used in wear-time column names
    pub fn suffix(&self) -> &'static str {
        match self {
            DayType::Weekday => "wkday",
            DayType::Weekend => "wkend",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DayType::Weekday => "weekday",
            DayType::Weekend => "weekend day",
        }
    }
}

/// Epoch enriched with the temporal features used by aggregation and regression
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedEpoch {
    pub epoch: EpochRecord,
    /// Consecutive day within the recording, starting at 1
    pub day_number: u32,
    /// `None` when day of week is missing
    pub day_type: Option<DayType>,
    pub quadrant: Quadrant,
    /// `sin(2π·hour/24)`
    pub morning: f64,
    /// `cos(2π·hour/24)`
    pub midnight: f64,
    /// `sin(2π·doy/365.25)·hemisphere`
    pub spring: f64,
    /// `cos(2π·doy/365.25)·hemisphere`
    pub winter: f64,
    pub pwear_morning: Option<f64>,
    pub pwear_midnight: Option<f64>,
}

/// Granularity of a collapse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollapseLevel {
    /// One row per whole recording
    Summary,
    /// One row per recorded day
    Daily,
}

impl CollapseLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollapseLevel::Summary => "summary",
            CollapseLevel::Daily => "daily",
        }
    }
}

/// Whether an output variable is a mean or a threshold proportion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    Mean,
    /// `index` points into `MeasureValues::at_least`
    AtLeast { index: usize, threshold: u32 },
}

/// One diurnally-adjusted output variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputVariable {
    pub measure: Measure,
    pub kind: VariableKind,
}

impl OutputVariable {
    /// Ordered variable list: mean, then each threshold, per measure
    pub fn all(measures: &[Measure], thresholds: &[u32]) -> Vec<OutputVariable> {
        let mut variables = Vec::with_capacity(measures.len() * (thresholds.len() + 1));
        for &measure in measures {
            variables.push(OutputVariable {
                measure,
                kind: VariableKind::Mean,
            });
            variables.extend(thresholds.iter().enumerate().map(|(index, &threshold)| {
                OutputVariable {
                    measure,
                    kind: VariableKind::AtLeast { index, threshold },
                }
            }));
        }
        variables
    }

    /// Output column name, e.g. `enmo_mean` or `enmo_25plus`
    pub fn column_name(&self) -> String {
        let prefix = self.measure.output_prefix();
        match self.kind {
            VariableKind::Mean => format!("{prefix}_mean"),
            VariableKind::AtLeast { threshold, .. } => format!("{prefix}_{threshold}plus"),
        }
    }
}

/// Wear time in hours, split by quadrant and day type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WearTime {
    pub total: f64,
    /// Indexed by `Quadrant::index`
    pub quadrants: [f64; 4],
    pub weekday: f64,
    pub weekend: f64,
    pub quadrant_weekday: [f64; 4],
    pub quadrant_weekend: [f64; 4],
}

impl WearTime {
    pub fn quadrant(&self, quadrant: Quadrant) -> f64 {
        self.quadrants[quadrant.index()]
    }

    pub fn day_type(&self, day_type: DayType) -> f64 {
        match day_type {
            DayType::Weekday => self.weekday,
            DayType::Weekend => self.weekend,
        }
    }

    pub fn quadrant_day_type(&self, quadrant: Quadrant, day_type: DayType) -> f64 {
        match day_type {
            DayType::Weekday => self.quadrant_weekday[quadrant.index()],
            DayType::Weekend => self.quadrant_weekend[quadrant.index()],
        }
    }
}

/// Diurnally-adjusted estimate for one variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub variable: OutputVariable,
    /// Wear hours among rows where the variable is present and `Pwear > 0`
    pub wear_hours: f64,
    /// `None` below the inclusion threshold; NaN for a degenerate regression
    pub value: Option<f64>,
}

/// Estimates for every output variable, in column order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiurnalEstimates {
    pub estimates: Vec<Estimate>,
}

impl DiurnalEstimates {
    pub fn get(&self, variable: &OutputVariable) -> Option<f64> {
        self.estimates
            .iter()
            .find(|e| &e.variable == variable)
            .and_then(|e| e.value)
    }
}

/// Wear and wear-weighted means per hour of day and per day of week
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiurnalProfile {
    /// Raw `Pwear` sum per hour of day (index 0 = hour 1)
    pub pwear_by_hour: Vec<Option<f64>>,
    /// `Σ ENMO·Pwear / Σ Pwear` per hour of day
    pub enmo_by_hour: Vec<Option<f64>>,
    /// Raw `Pwear` sum per day of week (index 0 = Monday)
    pub pwear_by_weekday: Vec<Option<f64>>,
    pub enmo_by_weekday: Vec<Option<f64>>,
    /// Plain HPFVM mean per hour / weekday when HPFVM is collapsed
    pub hpfvm_by_hour: Option<Vec<Option<f64>>>,
    pub hpfvm_by_weekday: Option<Vec<Option<f64>>>,
}

/// Parallel variable set computed after sleep-hour imputation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImputedSet {
    pub wear: WearTime,
    pub estimates: DiurnalEstimates,
    pub profile: Option<DiurnalProfile>,
}

/// Identity of one day in a daily collapse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayInfo {
    pub day_number: u32,
    pub date: Option<String>,
    pub day_of_week: Option<u8>,
}

/// Wear-log values passed through to the summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WearLogSummary {
    pub start: Option<String>,
    pub end: Option<String>,
    /// Maximum of each wear-log flag over the unit
    pub flags: [Option<f64>; 4],
}

/// One collapsed unit: a whole recording or a single day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub id: String,
    pub level: CollapseLevel,
    /// Present for daily records
    pub day: Option<DayInfo>,
    /// Date of the first epoch (whole-recording records)
    pub start_date: Option<String>,
    /// Hours of epochs with a wear probability (whole-recording records)
    pub record_length_hours: Option<f64>,
    pub wear: WearTime,
    pub estimates: DiurnalEstimates,
    pub profile: Option<DiurnalProfile>,
    pub imputed: Option<ImputedSet>,
    pub metadata: DeviceMetadata,
    pub wear_log: Option<WearLogSummary>,
    /// Epoch length in minutes
    pub time_resolution: f64,
}

/// Placeholder emitted for a participant without usable data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DummyRecord {
    pub id: String,
    /// Always 1
    pub flag_no_valid_days: u8,
    pub metadata: DeviceMetadata,
    pub wear_log_start: Option<String>,
    pub wear_log_end: Option<String>,
    pub time_resolution: Option<f64>,
}
