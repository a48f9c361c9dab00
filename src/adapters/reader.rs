//! CSV epoch table reader and writer
//!
//! Columns are located by header name, so tables may carry extra columns in
//! any order. Missing cells (`""`, `NA`, `nan`, `.`) read as absent.

use crate::config::CollapseConfig;
use crate::error::CollapseError;
use crate::types::{
    DayType, DerivedEpoch, DeviceMetadata, EpochRecord, Measure, MeasureValues, ParticipantEpochs,
    WearLogFields, WEAR_LOG_FLAGS,
};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::io::{Read, Write};

use super::SourceProfile;

const MISSING_CELLS: [&str; 6] = ["", "NA", "nan", "NaN", ".", "None"];

const TIMESTAMP_FORMATS: [&str; 7] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Output format for timestamps in written epoch tables
pub const TIMESTAMP_OUTPUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a timestamp in any of the layouts the upstream tools emit.
/// A bare date parses as midnight.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn is_missing(cell: &str) -> bool {
    MISSING_CELLS.contains(&cell.trim())
}

/// Header name → column position
struct ColumnIndex {
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    fn new(headers: &csv::StringRecord) -> Self {
        let positions = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), i))
            .collect();
        Self { positions }
    }

    fn required(&self, name: &str) -> Result<usize, CollapseError> {
        self.optional(name)
            .ok_or_else(|| CollapseError::MissingColumn(name.to_string()))
    }

    fn optional(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    fn first_of(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|name| self.optional(name))
    }
}

/// One row of the table with its line number, for error messages
struct Row<'r> {
    record: &'r csv::StringRecord,
    line: u64,
}

impl Row<'_> {
    fn text(&self, column: Option<usize>) -> Option<String> {
        let cell = self.record.get(column?)?;
        if is_missing(cell) {
            None
        } else {
            Some(cell.trim().to_string())
        }
    }

    fn number(&self, column: Option<usize>, name: &str) -> Result<Option<f64>, CollapseError> {
        match self.text(column) {
            None => Ok(None),
            Some(cell) => cell.parse::<f64>().map(Some).map_err(|_| {
                CollapseError::ParseError(format!(
                    "line {}: column {name} is not numeric: {cell:?}",
                    self.line
                ))
            }),
        }
    }

    fn timestamp(&self, column: usize, name: &str) -> Result<NaiveDateTime, CollapseError> {
        let cell = self.text(Some(column)).ok_or_else(|| {
            CollapseError::ParseError(format!("line {}: {name} is empty", self.line))
        })?;
        parse_timestamp(&cell).ok_or_else(|| {
            CollapseError::ParseError(format!(
                "line {}: {name} is not a timestamp: {cell:?}",
                self.line
            ))
        })
    }
}

/// Positions of the metadata columns for one source profile
struct MetadataColumns {
    device: Option<usize>,
    calibration_method: Option<usize>,
    calibration_type: Option<usize>,
    noise_cutoff: Option<usize>,
    processing_epoch: Option<usize>,
    generic_first_timestamp: Option<usize>,
    generic_last_timestamp: Option<usize>,
    qc_first_battery_pct: Option<usize>,
    qc_last_battery_pct: Option<usize>,
    frequency: Option<usize>,
    start_error: Option<usize>,
    end_error: Option<usize>,
    mf_start_error: Option<usize>,
    mf_end_error: Option<usize>,
    qc_anomalies_total: Option<usize>,
    processing_script: Option<usize>,
    anomalies: [Option<usize>; 7],
}

impl MetadataColumns {
    fn locate(index: &ColumnIndex, profile: &SourceProfile) -> Self {
        let (start_error, end_error) = profile.calibration_error_columns;
        let mut anomalies = [None; 7];
        for (slot, name) in anomalies.iter_mut().zip(profile.anomaly_columns) {
            *slot = index.optional(name);
        }

        Self {
            device: index.optional("device"),
            calibration_method: index.optional("calibration_method"),
            calibration_type: index.optional("calibration_type"),
            noise_cutoff: index.first_of(&["noise_cutoff_mg", "noise_cutoff"]),
            processing_epoch: index.optional("processing_epoch"),
            generic_first_timestamp: index.optional("generic_first_timestamp"),
            generic_last_timestamp: index.optional("generic_last_timestamp"),
            qc_first_battery_pct: index.optional("QC_first_battery_pct"),
            qc_last_battery_pct: index.optional("QC_last_battery_pct"),
            frequency: index.optional("frequency"),
            start_error: index.optional(start_error),
            end_error: index.optional(end_error),
            mf_start_error: index.optional("mf_start_error"),
            mf_end_error: index.optional("mf_end_error"),
            qc_anomalies_total: index.optional("QC_anomalies_total"),
            processing_script: index.optional("processing_script"),
            anomalies,
        }
    }

    fn read(&self, row: &Row<'_>) -> DeviceMetadata {
        DeviceMetadata {
            device: row.text(self.device),
            calibration_method: row.text(self.calibration_method),
            calibration_type: row.text(self.calibration_type),
            noise_cutoff: row.text(self.noise_cutoff),
            processing_epoch: row.text(self.processing_epoch),
            generic_first_timestamp: row.text(self.generic_first_timestamp),
            generic_last_timestamp: row.text(self.generic_last_timestamp),
            qc_first_battery_pct: row.text(self.qc_first_battery_pct),
            qc_last_battery_pct: row.text(self.qc_last_battery_pct),
            frequency: row.text(self.frequency),
            start_error: row.text(self.start_error),
            end_error: row.text(self.end_error),
            mf_start_error: row.text(self.mf_start_error),
            mf_end_error: row.text(self.mf_end_error),
            qc_anomalies_total: row.text(self.qc_anomalies_total),
            processing_script: row.text(self.processing_script),
            anomalies: self.anomalies.map(|column| row.text(column)),
        }
    }
}

/// Positions of one measure's mean and threshold columns
struct MeasureColumns {
    measure: Measure,
    mean: Option<usize>,
    at_least: Vec<(String, Option<usize>)>,
}

impl MeasureColumns {
    fn locate(index: &ColumnIndex, measure: Measure, thresholds: &[u32]) -> Self {
        let prefix = measure.input_prefix();
        let at_least = thresholds
            .iter()
            .map(|t| {
                let name = format!("{prefix}_{t}plus");
                let column = index.optional(&name);
                (name, column)
            })
            .collect();

        Self {
            measure,
            mean: index.optional(&format!("{prefix}_mean")),
            at_least,
        }
    }

    fn read(&self, row: &Row<'_>) -> Result<MeasureValues, CollapseError> {
        let mean_name = format!("{}_mean", self.measure.input_prefix());
        // Negative means mark invalid epochs
        let mean = row
            .number(self.mean, &mean_name)?
            .filter(|value| *value >= 0.0);

        let at_least = self
            .at_least
            .iter()
            .map(|(name, column)| row.number(*column, name))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MeasureValues { mean, at_least })
    }
}

/// Reads one participant's epoch table
pub struct EpochTableReader<'a> {
    config: &'a CollapseConfig,
}

impl<'a> EpochTableReader<'a> {
    pub fn new(config: &'a CollapseConfig) -> Self {
        Self { config }
    }

    /// Parse a CSV epoch table and sort it by (`file_id`, `DATETIME`)
    pub fn read<R: Read>(&self, file_id: &str, input: R) -> Result<ParticipantEpochs, CollapseError> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(input);
        let headers = reader.headers()?.clone();
        let index = ColumnIndex::new(&headers);
        let profile = self.config.source.profile();

        let file_id_col = index.required("file_id")?;
        let orig_col = index.required("DATETIME_ORIG")?;
        let hour_col = index.required("hourofday")?;
        let pwear_col = index.required("Pwear")?;
        let adjusted_col = index.optional("DATETIME");
        let date_col = index.optional("DATE");
        let dow_col = index.optional("dayofweek");
        let mech_noise_col = index.optional("FLAG_MECH_NOISE");
        let no_valid_col = index.first_of(&["temp_flag_no_valid_days", "FLAG_NO_VALID_DAYS"]);

        let day_valid_col = index.optional("day_valid");
        let start_col = index.first_of(&["start", "START"]);
        let end_col = index.first_of(&["end", "END"]);
        let wear_flag_cols = WEAR_LOG_FLAGS.map(|name| index.optional(name));

        let metadata_cols = MetadataColumns::locate(&index, profile);
        let enmo_cols = MeasureColumns::locate(&index, Measure::Enmo, &self.config.thresholds);
        let hpfvm_cols = self
            .config
            .include_hpfvm
            .then(|| MeasureColumns::locate(&index, Measure::Hpfvm, &self.config.thresholds));

        let mut records = Vec::new();
        let mut record = csv::StringRecord::new();
        while reader.read_record(&mut record)? {
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            let row = Row {
                record: &record,
                line,
            };

            let timestamp_orig = row.timestamp(orig_col, "DATETIME_ORIG")?;
            let timestamp = match adjusted_col {
                Some(col) if row.text(Some(col)).is_some() => row.timestamp(col, "DATETIME")?,
                _ => timestamp_orig,
            };

            let hour = row.number(Some(hour_col), "hourofday")?;
            let hour_of_day = match hour {
                Some(h) if h.fract() == 0.0 && (1.0..=24.0).contains(&h) => h as u8,
                other => {
                    return Err(CollapseError::ParseError(format!(
                        "line {line}: hourofday must be an integer in 1-24, got {other:?}"
                    )))
                }
            };

            let day_of_week = match row.number(dow_col, "dayofweek")? {
                None => None,
                Some(d) if d.fract() == 0.0 && (1.0..=7.0).contains(&d) => Some(d as u8),
                Some(d) => {
                    return Err(CollapseError::ParseError(format!(
                        "line {line}: dayofweek must be an integer in 1-7, got {d}"
                    )))
                }
            };

            let hpfvm = match &hpfvm_cols {
                Some(cols) => Some(cols.read(&row)?),
                None => None,
            };

            let mut flags = [None; 4];
            for (slot, (column, name)) in flags
                .iter_mut()
                .zip(wear_flag_cols.iter().zip(WEAR_LOG_FLAGS))
            {
                *slot = row.number(*column, name)?;
            }

            records.push(EpochRecord {
                file_id: row
                    .text(Some(file_id_col))
                    .unwrap_or_else(|| file_id.to_string()),
                timestamp,
                timestamp_orig,
                date: row.text(date_col),
                hour_of_day,
                day_of_week,
                pwear: row.number(Some(pwear_col), "Pwear")?,
                enmo: enmo_cols.read(&row)?,
                hpfvm,
                flag_mech_noise: row.number(mech_noise_col, "FLAG_MECH_NOISE")?,
                flag_no_valid_days: row.number(no_valid_col, "temp_flag_no_valid_days")?,
                wear_log: WearLogFields {
                    day_valid: row.number(day_valid_col, "day_valid")?.map(|v| v as i64),
                    start: row.text(start_col),
                    end: row.text(end_col),
                    flags,
                },
                metadata: metadata_cols.read(&row),
            });
        }

        Ok(ParticipantEpochs::new(file_id, records))
    }
}

/// Reads the first row of a per-participant metadata table
pub struct MetadataReader;

impl MetadataReader {
    /// Returns `None` for a table without data rows
    pub fn read<R: Read>(
        profile: &SourceProfile,
        input: R,
    ) -> Result<Option<DeviceMetadata>, CollapseError> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(input);
        let headers = reader.headers()?.clone();
        let index = ColumnIndex::new(&headers);
        let columns = MetadataColumns::locate(&index, profile);

        let mut record = csv::StringRecord::new();
        if !reader.read_record(&mut record)? {
            return Ok(None);
        }
        let row = Row {
            record: &record,
            line: record.position().map(|p| p.line()).unwrap_or_default(),
        };
        Ok(Some(columns.read(&row)))
    }
}

/// Writes cleaned, feature-enriched epochs back out as CSV
pub struct EpochTableWriter<'a> {
    config: &'a CollapseConfig,
}

impl<'a> EpochTableWriter<'a> {
    pub fn new(config: &'a CollapseConfig) -> Self {
        Self { config }
    }

    fn headers(&self) -> Vec<String> {
        let profile = self.config.source.profile();
        let mut headers: Vec<String> = [
            "file_id",
            "DATETIME",
            "DATETIME_ORIG",
            "DATE",
            "hourofday",
            "dayofweek",
            "day_number",
            "weekend",
            "Pwear",
            "MORNING",
            "MIDNIGHT",
            "SPRING",
            "WINTER",
            "PWEAR_MORNING",
            "PWEAR_MIDNIGHT",
            "FLAG_MECH_NOISE",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let mut measures = vec![Measure::Enmo];
        if self.config.include_hpfvm {
            measures.push(Measure::Hpfvm);
        }
        for measure in measures {
            let prefix = measure.input_prefix();
            headers.push(format!("{prefix}_mean"));
            headers.extend(self.config.thresholds.iter().map(|t| format!("{prefix}_{t}plus")));
        }

        let (start_error, end_error) = profile.calibration_error_columns;
        headers.extend(
            [
                "device",
                "calibration_method",
                "noise_cutoff_mg",
                "processing_epoch",
                "generic_first_timestamp",
                "generic_last_timestamp",
                "QC_first_battery_pct",
                "QC_last_battery_pct",
                "frequency",
                start_error,
                end_error,
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        headers.extend(profile.anomaly_columns.iter().map(|s| s.to_string()));

        if self.config.cleaning.use_wear_log {
            headers.extend(["day_valid", "start", "end"].iter().map(|s| s.to_string()));
            headers.extend(WEAR_LOG_FLAGS.iter().map(|s| s.to_string()));
        }
        headers
    }

    pub fn write<W: Write>(&self, epochs: &[DerivedEpoch], output: W) -> Result<(), CollapseError> {
        let mut writer = csv::Writer::from_writer(output);
        writer.write_record(self.headers())?;

        let profile = self.config.source.profile();
        for derived in epochs {
            let e = &derived.epoch;
            let mut row: Vec<String> = vec![
                e.file_id.clone(),
                e.timestamp.format(TIMESTAMP_OUTPUT_FORMAT).to_string(),
                e.timestamp_orig.format(TIMESTAMP_OUTPUT_FORMAT).to_string(),
                text(&e.date),
                e.hour_of_day.to_string(),
                e.day_of_week.map(|d| d.to_string()).unwrap_or_default(),
                derived.day_number.to_string(),
                derived
                    .day_type
                    .map(|d| (d == DayType::Weekend) as u8)
                    .map(|w| w.to_string())
                    .unwrap_or_default(),
                number(e.pwear),
                derived.morning.to_string(),
                derived.midnight.to_string(),
                derived.spring.to_string(),
                derived.winter.to_string(),
                number(derived.pwear_morning),
                number(derived.pwear_midnight),
                number(e.flag_mech_noise),
            ];

            let empty = MeasureValues {
                mean: None,
                at_least: vec![None; self.config.thresholds.len()],
            };
            let mut measures = vec![&e.enmo];
            if self.config.include_hpfvm {
                measures.push(e.hpfvm.as_ref().unwrap_or(&empty));
            }
            for values in measures {
                row.push(number(values.mean));
                row.extend(
                    (0..self.config.thresholds.len())
                        .map(|i| number(values.at_least.get(i).copied().flatten())),
                );
            }

            let m = &e.metadata;
            for value in [
                &m.device,
                &m.calibration_method,
                &m.noise_cutoff,
                &m.processing_epoch,
                &m.generic_first_timestamp,
                &m.generic_last_timestamp,
                &m.qc_first_battery_pct,
                &m.qc_last_battery_pct,
                &m.frequency,
                &m.start_error,
                &m.end_error,
            ] {
                row.push(text(value));
            }
            row.extend(
                m.anomalies
                    .iter()
                    .take(profile.anomaly_columns.len())
                    .map(text),
            );

            if self.config.cleaning.use_wear_log {
                let w = &e.wear_log;
                row.push(w.day_valid.map(|v| v.to_string()).unwrap_or_default());
                row.push(text(&w.start));
                row.push(text(&w.end));
                row.extend(w.flags.iter().map(|f| number(*f)));
            }

            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::DataSource;

    fn make_test_table(rows: &[&str]) -> String {
        let mut table = String::from(
            "file_id,DATETIME,DATETIME_ORIG,DATE,hourofday,dayofweek,Pwear,ENMO_mean,ENMO_0plus,ENMO_5plus,FLAG_MECH_NOISE,device,start_error,QC_anomaly_F\n",
        );
        for row in rows {
            table.push_str(row);
            table.push('\n');
        }
        table
    }

    fn make_test_config() -> CollapseConfig {
        CollapseConfig {
            thresholds: vec![0, 5],
            ..CollapseConfig::default()
        }
    }

    #[test]
    fn test_reads_and_sorts_rows() {
        let table = make_test_table(&[
            "p1,2024-01-01 02:00:00,2024-01-01 02:00:00,2024-01-01,3,1,1,12.5,1,0.4,0,DEV1,0.01,0",
            "p1,2024-01-01 00:00:00,2024-01-01 00:00:00,2024-01-01,1,1,0.5,NA,1,,0,DEV1,0.01,0",
            "p1,2024-01-01 01:00:00,2024-01-01 01:00:00,2024-01-01,2,1,1,-1,1,0.2,1,DEV1,0.01,0",
        ]);
        let config = make_test_config();
        let epochs = EpochTableReader::new(&config)
            .read("p1", table.as_bytes())
            .unwrap();

        assert_eq!(epochs.records.len(), 3);
        let hours: Vec<u8> = epochs.records.iter().map(|r| r.hour_of_day).collect();
        assert_eq!(hours, vec![1, 2, 3]);

        // NA and negative sentinel both read as absent
        assert_eq!(epochs.records[0].enmo.mean, None);
        assert_eq!(epochs.records[1].enmo.mean, None);
        assert_eq!(epochs.records[2].enmo.mean, Some(12.5));

        assert_eq!(epochs.records[0].enmo.at_least, vec![Some(1.0), None]);
        assert_eq!(epochs.records[1].flag_mech_noise, Some(1.0));
        assert_eq!(epochs.records[0].metadata.device.as_deref(), Some("DEV1"));
        assert_eq!(epochs.records[0].metadata.start_error.as_deref(), Some("0.01"));
        assert_eq!(epochs.time_resolution().unwrap(), Some(60.0));
    }

    #[test]
    fn test_missing_required_column() {
        let table = "file_id,DATETIME_ORIG,hourofday\np1,2024-01-01 00:00:00,1\n";
        let config = make_test_config();
        let result = EpochTableReader::new(&config).read("p1", table.as_bytes());
        assert!(matches!(result, Err(CollapseError::MissingColumn(c)) if c == "Pwear"));
    }

    #[test]
    fn test_rejects_hour_out_of_range() {
        let table = make_test_table(&[
            "p1,2024-01-01 00:00:00,2024-01-01 00:00:00,2024-01-01,0,1,1,1,1,1,0,D,0,0",
        ]);
        let config = make_test_config();
        let result = EpochTableReader::new(&config).read("p1", table.as_bytes());
        assert!(matches!(result, Err(CollapseError::ParseError(_))));
    }

    #[test]
    fn test_absent_threshold_column_reads_as_missing() {
        let config = CollapseConfig {
            thresholds: vec![0, 5, 10],
            ..CollapseConfig::default()
        };
        let table = make_test_table(&[
            "p1,2024-01-01 00:00:00,2024-01-01 00:00:00,2024-01-01,1,1,1,3,1,0.5,0,D,0,0",
        ]);
        let epochs = EpochTableReader::new(&config)
            .read("p1", table.as_bytes())
            .unwrap();
        assert_eq!(
            epochs.records[0].enmo.at_least,
            vec![Some(1.0), Some(0.5), None]
        );
    }

    #[test]
    fn test_metadata_reader_uses_profile_columns() {
        let table = "id,device,file_start_error,mf_start_error,Anom_F\nP1,DEV9,0.2,0.3,1\n";
        let metadata = MetadataReader::read(DataSource::Pampro.profile(), table.as_bytes())
            .unwrap()
            .unwrap();
        assert_eq!(metadata.device.as_deref(), Some("DEV9"));
        assert_eq!(metadata.start_error.as_deref(), Some("0.2"));
        assert_eq!(metadata.mf_start_error.as_deref(), Some("0.3"));
        assert_eq!(metadata.anomaly_f(), Some(1.0));

        let empty = MetadataReader::read(DataSource::Pampro.profile(), "id,device\n".as_bytes())
            .unwrap();
        assert!(empty.is_none());
    }

    #[test]
    fn test_parse_timestamp_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2024-03-05 14:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-05T14:30:00"), Some(expected));
        assert_eq!(parse_timestamp("05/03/2024 14:30:00"), Some(expected));
        assert!(parse_timestamp("yesterday").is_none());
    }
}
