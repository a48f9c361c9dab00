//! Summary table encoding
//!
//! This module lays out collapsed records as flat tables. The column layout is
//! fixed per (level, data source, configuration), so every row of a daily file
//! shares one header. The same layout drives the header, the row cells and
//! the data dictionary.

use crate::adapters::{parse_timestamp, SourceProfile, COMMON_DUMMY_COLUMNS};
use crate::config::CollapseConfig;
use crate::types::{
    CollapseLevel, DayType, DeviceMetadata, DiurnalProfile, DummyRecord, Measure, OutputVariable,
    Quadrant, SummaryRecord, VariableKind, WearTime, WEAR_LOG_FLAGS,
};

/// Generic timestamps are re-rendered in this layout
pub const GENERIC_TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Decimal places kept in daily output
pub const DAILY_DECIMALS: i32 = 4;

/// Suffix on every column of the imputed variable set
pub const IMPUTED_SUFFIX: &str = "_IMP";

/// One output value
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

impl Cell {
    fn text(value: &Option<String>) -> Self {
        value.clone().map(Cell::Text).unwrap_or(Cell::Empty)
    }

    fn number(value: Option<f64>) -> Self {
        value.map(Cell::Number).unwrap_or(Cell::Empty)
    }

    /// Render for CSV output, rounding numbers to `decimals` places when given.
    /// NaN renders as `NaN`.
    pub fn render(&self, decimals: Option<i32>) -> String {
        match self {
            Cell::Text(text) => text.clone(),
            Cell::Empty => String::new(),
            Cell::Number(value) => {
                let value = match decimals {
                    Some(places) if value.is_finite() => {
                        let factor = 10f64.powi(places);
                        (value * factor).round() / factor
                    }
                    _ => *value,
                };
                // Avoid "-0" after rounding
                if value == 0.0 {
                    "0".to_string()
                } else {
                    value.to_string()
                }
            }
        }
    }
}

/// Header plus rendered rows, ready for a CSV writer
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Cell by row and column name
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.headers.iter().position(|h| h == column)?;
        self.rows.get(row)?.get(index).map(String::as_str)
    }
}

/// Pass-through metadata fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetaField {
    Device,
    StartError,
    EndError,
    CalibrationMethod,
    NoiseCutoff,
    ProcessingEpoch,
    GenericFirstTimestamp,
    GenericLastTimestamp,
    FirstBattery,
    LastBattery,
    Frequency,
    MultiFileStartError,
    MultiFileEndError,
    CalibrationType,
    AnomaliesTotal,
}

impl MetaField {
    fn name(&self) -> &'static str {
        match self {
            MetaField::Device => "device",
            MetaField::StartError => "file_start_error",
            MetaField::EndError => "file_end_error",
            MetaField::CalibrationMethod => "calibration_method",
            MetaField::NoiseCutoff => "noise_cutoff",
            MetaField::ProcessingEpoch => "processing_epoch",
            MetaField::GenericFirstTimestamp => "generic_first_timestamp",
            MetaField::GenericLastTimestamp => "generic_last_timestamp",
            MetaField::FirstBattery => "qc_first_battery_pct",
            MetaField::LastBattery => "qc_last_battery_pct",
            MetaField::Frequency => "frequency",
            MetaField::MultiFileStartError => "mf_start_error",
            MetaField::MultiFileEndError => "mf_end_error",
            MetaField::CalibrationType => "calibration_type",
            MetaField::AnomaliesTotal => "qc_anomalies_total",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            MetaField::Device => "Device serial number",
            MetaField::StartError => "File error before calibration (single file cal) (mg)",
            MetaField::EndError => "File error after calibration (single file cal) (mg)",
            MetaField::CalibrationMethod => "Calibration method applied (offset/scale/temp)",
            MetaField::NoiseCutoff => "Threshold set for still bout detection (mg)",
            MetaField::ProcessingEpoch => "Epoch setting used when processing data (sec)",
            MetaField::GenericFirstTimestamp => "Generic first data timestamp of collection",
            MetaField::GenericLastTimestamp => "Generic last data timestamp of download",
            MetaField::FirstBattery => "Battery percentage of device at beginning of data collection",
            MetaField::LastBattery => "Battery percentage of device at end of data collection",
            MetaField::Frequency => "Recording frequency in hz",
            MetaField::MultiFileStartError => "File error before calibration (multi file cal) (mg)",
            MetaField::MultiFileEndError => "File error after calibration (multi file cal) (mg)",
            MetaField::CalibrationType => "Type of calibration used: Single or multi file or Fail",
            MetaField::AnomaliesTotal => "Total number of QC anomalies",
        }
    }

    fn value(&self, metadata: &DeviceMetadata) -> Cell {
        match self {
            MetaField::Device => Cell::text(&metadata.device),
            MetaField::StartError => Cell::text(&metadata.start_error),
            MetaField::EndError => Cell::text(&metadata.end_error),
            MetaField::CalibrationMethod => Cell::text(&metadata.calibration_method),
            MetaField::NoiseCutoff => Cell::text(&metadata.noise_cutoff),
            MetaField::ProcessingEpoch => Cell::text(&metadata.processing_epoch),
            MetaField::GenericFirstTimestamp => generic_timestamp(&metadata.generic_first_timestamp),
            MetaField::GenericLastTimestamp => generic_timestamp(&metadata.generic_last_timestamp),
            MetaField::FirstBattery => Cell::text(&metadata.qc_first_battery_pct),
            MetaField::LastBattery => Cell::text(&metadata.qc_last_battery_pct),
            MetaField::Frequency => Cell::text(&metadata.frequency),
            MetaField::MultiFileStartError => Cell::text(&metadata.mf_start_error),
            MetaField::MultiFileEndError => Cell::text(&metadata.mf_end_error),
            MetaField::CalibrationType => Cell::text(&metadata.calibration_type),
            MetaField::AnomaliesTotal => Cell::text(&metadata.qc_anomalies_total),
        }
    }
}

/// Re-render a parseable timestamp as `dd/mm/YYYY HH:MM:SS`, else pass it through
fn generic_timestamp(value: &Option<String>) -> Cell {
    match value {
        Some(text) => match parse_timestamp(text) {
            Some(ts) => Cell::Text(ts.format(GENERIC_TIMESTAMP_FORMAT).to_string()),
            None => Cell::Text(text.clone()),
        },
        None => Cell::Empty,
    }
}

/// One wear-time bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WearField {
    Total,
    Quadrant(Quadrant),
    DayType(DayType),
    QuadrantDayType(Quadrant, DayType),
}

impl WearField {
    /// Overall, quadrants, day types, then quadrant×day type
    fn all() -> Vec<WearField> {
        let mut fields = vec![WearField::Total];
        fields.extend(Quadrant::ALL.iter().map(|&q| WearField::Quadrant(q)));
        fields.extend(DayType::ALL.iter().map(|&d| WearField::DayType(d)));
        for day_type in DayType::ALL {
            fields.extend(
                Quadrant::ALL
                    .iter()
                    .map(|&q| WearField::QuadrantDayType(q, day_type)),
            );
        }
        fields
    }

    fn name(&self) -> String {
        match self {
            WearField::Total => "Pwear".to_string(),
            WearField::Quadrant(q) => format!("Pwear_{}", q.as_str()),
            WearField::DayType(d) => format!("Pwear_{}", d.suffix()),
            WearField::QuadrantDayType(q, d) => format!("Pwear_{}_{}", q.as_str(), d.suffix()),
        }
    }

    fn label(&self) -> String {
        const VALID_HOURS: &str = "Number of valid hrs during free-living";
        match self {
            WearField::Total => "Time integral of wear probability based on ACC".to_string(),
            WearField::Quadrant(q) => format!("{VALID_HOURS}, {}", q.hour_range()),
            WearField::DayType(d) => format!("{VALID_HOURS}, {}", d.description()),
            WearField::QuadrantDayType(q, d) => {
                format!("{VALID_HOURS}, {}, {}", q.hour_range(), d.description())
            }
        }
    }

    fn value(&self, wear: &WearTime) -> f64 {
        match self {
            WearField::Total => wear.total,
            WearField::Quadrant(q) => wear.quadrant(*q),
            WearField::DayType(d) => wear.day_type(*d),
            WearField::QuadrantDayType(q, d) => wear.quadrant_day_type(*q, *d),
        }
    }
}

/// One series of the diurnal profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProfileSeries {
    PwearDay,
    PwearHour,
    EnmoDay,
    EnmoHour,
    HpfvmDay,
    HpfvmHour,
}

impl ProfileSeries {
    fn len(&self) -> usize {
        match self {
            ProfileSeries::PwearDay | ProfileSeries::EnmoDay | ProfileSeries::HpfvmDay => 7,
            _ => 24,
        }
    }

    fn name(&self, position: usize) -> String {
        match self {
            ProfileSeries::PwearDay => format!("pwear_day{position}"),
            ProfileSeries::PwearHour => format!("pwear_hour{position}"),
            ProfileSeries::EnmoDay => format!("enmo_mean_day{position}"),
            ProfileSeries::EnmoHour => format!("enmo_mean_hour{position}"),
            ProfileSeries::HpfvmDay => format!("hpfvm_mean_day{position}"),
            ProfileSeries::HpfvmHour => format!("hpfvm_mean_hour{position}"),
        }
    }

    fn label(&self, position: usize) -> String {
        match self {
            ProfileSeries::PwearDay => {
                format!("Time integral of wear probability on day of week {position}")
            }
            ProfileSeries::PwearHour => {
                format!("Time integral of wear probability at hour of day {position}")
            }
            ProfileSeries::EnmoDay => {
                format!("Wear-weighted average acceleration on day of week {position} (milli-g)")
            }
            ProfileSeries::EnmoHour => {
                format!("Wear-weighted average acceleration at hour of day {position} (milli-g)")
            }
            ProfileSeries::HpfvmDay => {
                format!("Average high-pass filtered vector magnitude on day of week {position} (milli-g)")
            }
            ProfileSeries::HpfvmHour => {
                format!("Average high-pass filtered vector magnitude at hour of day {position} (milli-g)")
            }
        }
    }

    fn value(&self, profile: &DiurnalProfile, position: usize) -> Option<f64> {
        let series = match self {
            ProfileSeries::PwearDay => Some(&profile.pwear_by_weekday),
            ProfileSeries::PwearHour => Some(&profile.pwear_by_hour),
            ProfileSeries::EnmoDay => Some(&profile.enmo_by_weekday),
            ProfileSeries::EnmoHour => Some(&profile.enmo_by_hour),
            ProfileSeries::HpfvmDay => profile.hpfvm_by_weekday.as_ref(),
            ProfileSeries::HpfvmHour => profile.hpfvm_by_hour.as_ref(),
        };
        series?.get(position - 1).copied().flatten()
    }
}

/// Where a column's value comes from
#[derive(Debug, Clone, Copy, PartialEq)]
enum Column {
    Id,
    StartDate,
    RecordLength,
    Date,
    DayNumber,
    DayOfWeek,
    Meta(MetaField),
    Anomaly(usize),
    TimeResolution,
    Wear { field: WearField, imputed: bool },
    Estimate { variable: OutputVariable, imputed: bool },
    Profile { series: ProfileSeries, position: usize, imputed: bool },
    WearLogStart,
    WearLogEnd,
    WearLogFlag(usize),
}

fn imputed_name(name: String, imputed: bool) -> String {
    if imputed {
        format!("{name}{IMPUTED_SUFFIX}")
    } else {
        name
    }
}

fn imputed_label(label: String, imputed: bool) -> String {
    if imputed {
        format!("{label} (IMP = Imputed)")
    } else {
        label
    }
}

fn variable_label(variable: &OutputVariable) -> String {
    match (variable.measure, variable.kind) {
        (Measure::Enmo, VariableKind::Mean) => "Average acceleration (milli-g)".to_string(),
        (Measure::Hpfvm, VariableKind::Mean) => {
            "Average high-pass filtered vector magnitude (milli-g)".to_string()
        }
        (_, VariableKind::AtLeast { threshold, .. }) => {
            format!("Proportion of time spent above >= {threshold} milli-g")
        }
    }
}

impl Column {
    fn name(&self, profile: &SourceProfile) -> String {
        match self {
            Column::Id => "id".to_string(),
            Column::StartDate => "startdate".to_string(),
            Column::RecordLength => "RecordLength".to_string(),
            Column::Date => "DATE".to_string(),
            Column::DayNumber => "day_number".to_string(),
            Column::DayOfWeek => "dayofweek".to_string(),
            Column::Meta(field) => field.name().to_string(),
            Column::Anomaly(i) => profile.anomaly_outputs[*i].to_string(),
            Column::TimeResolution => "TIME_RESOLUTION".to_string(),
            Column::Wear { field, imputed } => imputed_name(field.name(), *imputed),
            Column::Estimate { variable, imputed } => {
                imputed_name(variable.column_name(), *imputed)
            }
            Column::Profile {
                series,
                position,
                imputed,
            } => imputed_name(series.name(*position), *imputed),
            Column::WearLogStart => "start".to_string(),
            Column::WearLogEnd => "end".to_string(),
            Column::WearLogFlag(i) => WEAR_LOG_FLAGS[*i].to_string(),
        }
    }

    fn label(&self) -> String {
        match self {
            Column::Id => "Study ID".to_string(),
            Column::StartDate => "Date of first day of free-living recording".to_string(),
            Column::RecordLength => "Number of hours file was recording for".to_string(),
            Column::Date => "Daily date of wear".to_string(),
            Column::DayNumber => "Consecutive day number in recording".to_string(),
            Column::DayOfWeek => "Day of week for index time period".to_string(),
            Column::Meta(field) => field.label().to_string(),
            Column::Anomaly(i) => {
                let letter = char::from(b'A' + *i as u8);
                format!("QC anomaly {letter} flag")
            }
            Column::TimeResolution => "Time resolution of processed data (minutes)".to_string(),
            Column::Wear { field, imputed } => imputed_label(field.label(), *imputed),
            Column::Estimate { variable, imputed } => {
                imputed_label(variable_label(variable), *imputed)
            }
            Column::Profile {
                series,
                position,
                imputed,
            } => imputed_label(series.label(*position), *imputed),
            Column::WearLogStart => "Start datetime of the wear log".to_string(),
            Column::WearLogEnd => "End datetime of the wear log".to_string(),
            Column::WearLogFlag(i) => match i {
                0 => "Wear log has no wear information".to_string(),
                1 => "Wear log has no end date".to_string(),
                2 => "Wear log start hour is missing".to_string(),
                _ => "Wear log end hour is missing".to_string(),
            },
        }
    }

    fn value(&self, record: &SummaryRecord) -> Cell {
        let imputed_set = record.imputed.as_ref();
        match self {
            Column::Id => Cell::Text(record.id.clone()),
            Column::StartDate => Cell::text(&record.start_date),
            Column::RecordLength => Cell::number(record.record_length_hours),
            Column::Date => record
                .day
                .as_ref()
                .map_or(Cell::Empty, |d| Cell::text(&d.date)),
            Column::DayNumber => Cell::number(record.day.as_ref().map(|d| f64::from(d.day_number))),
            Column::DayOfWeek => Cell::number(
                record
                    .day
                    .as_ref()
                    .and_then(|d| d.day_of_week)
                    .map(f64::from),
            ),
            Column::Meta(field) => field.value(&record.metadata),
            Column::Anomaly(i) => Cell::text(&record.metadata.anomalies[*i]),
            Column::TimeResolution => Cell::Number(record.time_resolution),
            Column::Wear { field, imputed } => {
                let wear = if *imputed {
                    imputed_set.map(|s| &s.wear)
                } else {
                    Some(&record.wear)
                };
                Cell::number(wear.map(|w| field.value(w)))
            }
            Column::Estimate { variable, imputed } => {
                let estimates = if *imputed {
                    imputed_set.map(|s| &s.estimates)
                } else {
                    Some(&record.estimates)
                };
                Cell::number(estimates.and_then(|e| e.get(variable)))
            }
            Column::Profile {
                series,
                position,
                imputed,
            } => {
                let profile = if *imputed {
                    imputed_set.and_then(|s| s.profile.as_ref())
                } else {
                    record.profile.as_ref()
                };
                Cell::number(profile.and_then(|p| series.value(p, *position)))
            }
            Column::WearLogStart => record
                .wear_log
                .as_ref()
                .map_or(Cell::Empty, |w| Cell::text(&w.start)),
            Column::WearLogEnd => record
                .wear_log
                .as_ref()
                .map_or(Cell::Empty, |w| Cell::text(&w.end)),
            Column::WearLogFlag(i) => Cell::number(record.wear_log.as_ref().and_then(|w| w.flags[*i])),
        }
    }
}

/// Lays out summary records, dummy records and data dictionaries
pub struct SummaryEncoder<'a> {
    config: &'a CollapseConfig,
    level: CollapseLevel,
}

impl<'a> SummaryEncoder<'a> {
    pub fn new(config: &'a CollapseConfig, level: CollapseLevel) -> Self {
        Self { config, level }
    }

    fn profile(&self) -> &'static SourceProfile {
        self.config.source.profile()
    }

    fn emits_profile(&self) -> bool {
        self.level == CollapseLevel::Summary && self.profile().emits_profile
    }

    fn wear_columns(imputed: bool) -> impl Iterator<Item = Column> {
        WearField::all()
            .into_iter()
            .map(move |field| Column::Wear { field, imputed })
    }

    fn estimate_columns(&self, measure: Measure, imputed: bool) -> Vec<Column> {
        OutputVariable::all(&[measure], &self.config.thresholds)
            .into_iter()
            .map(|variable| Column::Estimate { variable, imputed })
            .collect()
    }

    fn profile_columns(&self, imputed: bool) -> Vec<Column> {
        let mut series = vec![
            ProfileSeries::PwearDay,
            ProfileSeries::PwearHour,
            ProfileSeries::EnmoDay,
            ProfileSeries::EnmoHour,
        ];
        if self.config.include_hpfvm {
            series.extend([ProfileSeries::HpfvmDay, ProfileSeries::HpfvmHour]);
        }
        series
            .into_iter()
            .flat_map(|s| {
                (1..=s.len()).map(move |position| Column::Profile {
                    series: s,
                    position,
                    imputed,
                })
            })
            .collect()
    }

    fn anomaly_columns(&self) -> Vec<Column> {
        let profile = self.profile();
        let mut columns = Vec::new();
        if profile.has_anomalies_total {
            columns.push(Column::Meta(MetaField::AnomaliesTotal));
        }
        columns.extend((0..profile.anomaly_outputs.len()).map(Column::Anomaly));
        columns
    }

    fn wear_log_columns(&self) -> Vec<Column> {
        if !self.config.cleaning.use_wear_log {
            return Vec::new();
        }
        let mut columns = vec![Column::WearLogStart, Column::WearLogEnd];
        columns.extend((0..WEAR_LOG_FLAGS.len()).map(Column::WearLogFlag));
        columns
    }

    fn layout(&self) -> Vec<Column> {
        match self.level {
            CollapseLevel::Summary => self.summary_layout(),
            CollapseLevel::Daily => self.daily_layout(),
        }
    }

    fn summary_layout(&self) -> Vec<Column> {
        let mut columns = vec![Column::Id, Column::StartDate, Column::RecordLength];
        columns.extend(
            [
                MetaField::Device,
                MetaField::StartError,
                MetaField::EndError,
                MetaField::CalibrationMethod,
                MetaField::NoiseCutoff,
                MetaField::ProcessingEpoch,
                MetaField::GenericFirstTimestamp,
                MetaField::GenericLastTimestamp,
                MetaField::FirstBattery,
                MetaField::LastBattery,
                MetaField::Frequency,
            ]
            .map(Column::Meta),
        );
        columns.push(Column::TimeResolution);

        columns.extend(self.estimate_columns(Measure::Enmo, false));
        columns.extend(Self::wear_columns(false));
        if self.config.include_hpfvm {
            columns.extend(self.estimate_columns(Measure::Hpfvm, false));
        }

        if self.profile().has_multi_file_calibration {
            columns.extend(
                [
                    MetaField::MultiFileStartError,
                    MetaField::MultiFileEndError,
                    MetaField::CalibrationType,
                ]
                .map(Column::Meta),
            );
        }
        columns.extend(self.anomaly_columns());

        if self.config.imputation.enabled {
            columns.extend(self.estimate_columns(Measure::Enmo, true));
            columns.extend(Self::wear_columns(true));
            if self.config.include_hpfvm {
                columns.extend(self.estimate_columns(Measure::Hpfvm, true));
            }
        }

        if self.emits_profile() {
            columns.extend(self.profile_columns(false));
            if self.config.imputation.enabled {
                columns.extend(self.profile_columns(true));
            }
        }

        columns.extend(self.wear_log_columns());
        columns
    }

    fn daily_layout(&self) -> Vec<Column> {
        let mut columns = vec![Column::Id, Column::Date, Column::DayNumber, Column::DayOfWeek];
        columns.extend(Self::wear_columns(false));
        columns.extend(self.estimate_columns(Measure::Enmo, false));
        if self.config.include_hpfvm {
            columns.extend(self.estimate_columns(Measure::Hpfvm, false));
        }

        if self.config.imputation.enabled {
            columns.extend(Self::wear_columns(true));
            columns.extend(self.estimate_columns(Measure::Enmo, true));
            if self.config.include_hpfvm {
                columns.extend(self.estimate_columns(Measure::Hpfvm, true));
            }
        }

        columns.extend(
            [
                MetaField::Device,
                MetaField::StartError,
                MetaField::EndError,
                MetaField::CalibrationMethod,
                MetaField::NoiseCutoff,
                MetaField::ProcessingEpoch,
            ]
            .map(Column::Meta),
        );
        columns.push(Column::TimeResolution);
        if self.profile().has_anomalies_total {
            columns.push(Column::Meta(MetaField::AnomaliesTotal));
        }

        columns.extend(self.wear_log_columns());
        columns
    }

    fn decimals(&self) -> Option<i32> {
        match self.level {
            CollapseLevel::Daily => Some(DAILY_DECIMALS),
            CollapseLevel::Summary => None,
        }
    }

    /// Output column names, in order
    pub fn columns(&self) -> Vec<String> {
        let profile = self.profile();
        self.layout().iter().map(|c| c.name(profile)).collect()
    }

    /// Cells of one record, aligned with [`Self::columns`]
    pub fn cells(&self, record: &SummaryRecord) -> Vec<Cell> {
        self.layout().iter().map(|c| c.value(record)).collect()
    }

    /// Lay out records as one table
    pub fn encode(&self, records: &[SummaryRecord]) -> Table {
        let layout = self.layout();
        let decimals = self.decimals();
        let profile = self.profile();
        Table {
            headers: layout.iter().map(|c| c.name(profile)).collect(),
            rows: records
                .iter()
                .map(|record| {
                    layout
                        .iter()
                        .map(|c| c.value(record).render(decimals))
                        .collect()
                })
                .collect(),
        }
    }

    /// Columns of a dummy record: identity, common metadata, source-specific
    /// metadata, time resolution and wear-log window
    pub fn dummy_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = COMMON_DUMMY_COLUMNS.iter().map(|c| c.to_string()).collect();
        columns.extend(self.profile().dummy_columns.iter().map(|c| c.to_string()));
        columns.push("TIME_RESOLUTION".to_string());
        if self.config.cleaning.use_wear_log {
            columns.extend(["start".to_string(), "end".to_string()]);
        }
        columns
    }

    /// Lay out a dummy record as a one-row table
    pub fn encode_dummy(&self, dummy: &DummyRecord) -> Table {
        let headers = self.dummy_columns();
        let row = headers
            .iter()
            .map(|column| self.dummy_cell(dummy, column).render(None))
            .collect();
        Table {
            headers,
            rows: vec![row],
        }
    }

    fn dummy_cell(&self, dummy: &DummyRecord, column: &str) -> Cell {
        let profile = self.profile();
        if let Some(i) = profile.anomaly_columns.iter().position(|c| *c == column) {
            return Cell::text(&dummy.metadata.anomalies[i]);
        }

        let m = &dummy.metadata;
        match column {
            "id" => Cell::Text(dummy.id.clone()),
            "FLAG_NO_VALID_DAYS" => Cell::Number(f64::from(dummy.flag_no_valid_days)),
            "device" => Cell::text(&m.device),
            "calibration_method" => Cell::text(&m.calibration_method),
            "calibration_type" => Cell::text(&m.calibration_type),
            "noise_cutoff_mg" => Cell::text(&m.noise_cutoff),
            "processing_epoch" => Cell::text(&m.processing_epoch),
            "generic_first_timestamp" => Cell::text(&m.generic_first_timestamp),
            "generic_last_timestamp" => Cell::text(&m.generic_last_timestamp),
            "QC_first_battery_pct" => Cell::text(&m.qc_first_battery_pct),
            "QC_last_battery_pct" => Cell::text(&m.qc_last_battery_pct),
            "frequency" => Cell::text(&m.frequency),
            "start_error" | "file_start_error" => Cell::text(&m.start_error),
            "end_error" | "file_end_error" => Cell::text(&m.end_error),
            "mf_start_error" => Cell::text(&m.mf_start_error),
            "mf_end_error" => Cell::text(&m.mf_end_error),
            "QC_anomalies_total" => Cell::text(&m.qc_anomalies_total),
            "processing_script" => Cell::text(&m.processing_script),
            "TIME_RESOLUTION" => Cell::number(dummy.time_resolution),
            "start" => Cell::text(&dummy.wear_log_start),
            "end" => Cell::text(&dummy.wear_log_end),
            _ => Cell::Empty,
        }
    }

    /// `(Variable, Label)` for every output column
    pub fn dictionary(&self) -> Table {
        let profile = self.profile();
        Table {
            headers: vec!["Variable".to_string(), "Label".to_string()],
            rows: self
                .layout()
                .iter()
                .map(|c| vec![c.name(profile), c.label()])
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::DataSource;
    use crate::types::{DayInfo, DiurnalEstimates, Estimate, ImputedSet};
    use pretty_assertions::assert_eq;

    fn make_test_config() -> CollapseConfig {
        CollapseConfig {
            thresholds: vec![0, 5],
            ..CollapseConfig::default()
        }
    }

    fn make_test_record(config: &CollapseConfig, level: CollapseLevel) -> SummaryRecord {
        let estimates = DiurnalEstimates {
            estimates: config
                .output_variables()
                .into_iter()
                .map(|variable| Estimate {
                    variable,
                    wear_hours: 24.0,
                    value: match variable.kind {
                        VariableKind::Mean => Some(12.345678),
                        VariableKind::AtLeast { threshold: 0, .. } => Some(1.0),
                        VariableKind::AtLeast { .. } => None,
                    },
                })
                .collect(),
        };
        SummaryRecord {
            id: "P001".to_string(),
            level,
            day: (level == CollapseLevel::Daily).then(|| DayInfo {
                day_number: 2,
                date: Some("2024-01-02".to_string()),
                day_of_week: Some(2),
            }),
            start_date: Some("2024-01-01".to_string()),
            record_length_hours: Some(48.0),
            wear: WearTime {
                total: 24.0,
                quadrants: [6.0; 4],
                weekday: 24.0,
                weekend: 0.0,
                quadrant_weekday: [6.0; 4],
                quadrant_weekend: [0.0; 4],
            },
            estimates,
            profile: None,
            imputed: None,
            metadata: DeviceMetadata {
                device: Some("DEV-1".to_string()),
                generic_first_timestamp: Some("2024-01-01 09:30:00".to_string()),
                ..DeviceMetadata::default()
            },
            wear_log: None,
            time_resolution: 60.0,
        }
    }

    #[test]
    fn test_summary_columns_wave() {
        let config = make_test_config();
        let columns = SummaryEncoder::new(&config, CollapseLevel::Summary).columns();

        assert_eq!(
            columns[..4].to_vec(),
            vec!["id", "startdate", "RecordLength", "device"]
        );
        assert!(columns.contains(&"enmo_5plus".to_string()));
        assert!(columns.contains(&"Pwear_night_wkend".to_string()));
        assert!(columns.contains(&"qc_anomaly_g".to_string()));
        assert!(columns.contains(&"qc_anomalies_total".to_string()));
        assert!(!columns.iter().any(|c| c.ends_with("_IMP")));
        assert!(!columns.iter().any(|c| c.starts_with("pwear_hour")));
        assert!(!columns.iter().any(|c| c.starts_with("hpfvm")));
    }

    #[test]
    fn test_summary_columns_pampro_with_imputation() {
        let mut config = make_test_config();
        config.source = DataSource::Pampro;
        config.imputation.enabled = true;
        let columns = SummaryEncoder::new(&config, CollapseLevel::Summary).columns();

        assert!(columns.contains(&"Anom_F".to_string()));
        assert!(!columns.contains(&"qc_anomaly_g".to_string()));
        assert!(columns.contains(&"mf_start_error".to_string()));
        assert!(columns.contains(&"enmo_mean_IMP".to_string()));
        assert!(columns.contains(&"Pwear_IMP".to_string()));
        assert!(columns.contains(&"pwear_hour24".to_string()));
        assert!(columns.contains(&"enmo_mean_day7_IMP".to_string()));

        let unique: std::collections::HashSet<&String> = columns.iter().collect();
        assert_eq!(unique.len(), columns.len());
    }

    #[test]
    fn test_summary_row_values() {
        let config = make_test_config();
        let record = make_test_record(&config, CollapseLevel::Summary);
        let table = SummaryEncoder::new(&config, CollapseLevel::Summary).encode(&[record]);

        assert_eq!(table.get(0, "id"), Some("P001"));
        assert_eq!(table.get(0, "Pwear"), Some("24"));
        assert_eq!(table.get(0, "enmo_mean"), Some("12.345678"));
        assert_eq!(table.get(0, "enmo_0plus"), Some("1"));
        // Below threshold is left empty, not zero
        assert_eq!(table.get(0, "enmo_5plus"), Some(""));
        assert_eq!(
            table.get(0, "generic_first_timestamp"),
            Some("01/01/2024 09:30:00")
        );
        assert_eq!(table.get(0, "TIME_RESOLUTION"), Some("60"));
    }

    #[test]
    fn test_daily_rounding_and_day_fields() {
        let config = make_test_config();
        let record = make_test_record(&config, CollapseLevel::Daily);
        let table = SummaryEncoder::new(&config, CollapseLevel::Daily).encode(&[record]);

        assert_eq!(
            table.headers[..4].to_vec(),
            vec!["id", "DATE", "day_number", "dayofweek"]
        );
        assert_eq!(table.get(0, "enmo_mean"), Some("12.3457"));
        assert_eq!(table.get(0, "day_number"), Some("2"));
        assert_eq!(table.get(0, "DATE"), Some("2024-01-02"));
    }

    #[test]
    fn test_nan_renders_as_nan() {
        assert_eq!(Cell::Number(f64::NAN).render(Some(4)), "NaN");
        assert_eq!(Cell::Number(-0.00001).render(Some(4)), "0");
        assert_eq!(Cell::Empty.render(None), "");
    }

    #[test]
    fn test_imputed_cells() {
        let mut config = make_test_config();
        config.imputation.enabled = true;
        let mut record = make_test_record(&config, CollapseLevel::Daily);
        let mut imputed_wear = record.wear.clone();
        imputed_wear.total = 24.0;
        record.wear.total = 18.0;
        record.imputed = Some(ImputedSet {
            wear: imputed_wear,
            estimates: record.estimates.clone(),
            profile: None,
        });

        let table = SummaryEncoder::new(&config, CollapseLevel::Daily).encode(&[record]);
        assert_eq!(table.get(0, "Pwear"), Some("18"));
        assert_eq!(table.get(0, "Pwear_IMP"), Some("24"));
        assert_eq!(table.get(0, "enmo_0plus_IMP"), Some("1"));
    }

    #[test]
    fn test_dummy_table() {
        let config = make_test_config();
        let dummy = DummyRecord {
            id: "P009".to_string(),
            flag_no_valid_days: 1,
            metadata: DeviceMetadata {
                device: Some("DEV-9".to_string()),
                start_error: Some("0.5".to_string()),
                ..DeviceMetadata::default()
            },
            wear_log_start: None,
            wear_log_end: None,
            time_resolution: None,
        };
        let table = SummaryEncoder::new(&config, CollapseLevel::Summary).encode_dummy(&dummy);

        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.get(0, "id"), Some("P009"));
        assert_eq!(table.get(0, "FLAG_NO_VALID_DAYS"), Some("1"));
        assert_eq!(table.get(0, "start_error"), Some("0.5"));
        assert_eq!(table.get(0, "TIME_RESOLUTION"), Some(""));
        assert!(table.get(0, "enmo_mean").is_none());
    }

    #[test]
    fn test_dictionary_covers_every_column() {
        let mut config = make_test_config();
        config.source = DataSource::Pampro;
        config.imputation.enabled = true;
        config.include_hpfvm = true;
        config.cleaning.use_wear_log = true;

        for level in [CollapseLevel::Summary, CollapseLevel::Daily] {
            let encoder = SummaryEncoder::new(&config, level);
            let dictionary = encoder.dictionary();
            let variables: Vec<String> = dictionary.rows.iter().map(|r| r[0].clone()).collect();
            assert_eq!(variables, encoder.columns());
            assert!(dictionary.rows.iter().all(|r| !r[1].is_empty()));
        }

        let dictionary = SummaryEncoder::new(&config, CollapseLevel::Summary).dictionary();
        let label = |name: &str| {
            dictionary
                .rows
                .iter()
                .find(|r| r[0] == name)
                .map(|r| r[1].clone())
        };
        assert_eq!(label("id").as_deref(), Some("Study ID"));
        assert_eq!(
            label("enmo_5plus").as_deref(),
            Some("Proportion of time spent above >= 5 milli-g")
        );
        assert_eq!(
            label("Pwear_noon_wkday").as_deref(),
            Some("Number of valid hrs during free-living, hourofday>6 & hourofday<=12, weekday")
        );
        assert!(label("Pwear_IMP").unwrap().contains("Imputed"));
    }
}
