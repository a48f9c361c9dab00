//! Participant input and collapsed output on disk
//!
//! The batch processor only sees the [`RecordSource`] and [`RecordSink`]
//! traits. The directory-backed implementations follow the file naming the
//! upstream processing and downstream analyses expect:
//!
//! - input: `{file_id}_{suffix}.csv`, plus optional `metadata_{file_id}.csv`
//! - output: `{file_id}_SUMMARY_MEANS.csv`, `{file_id}_DAILY_MEANS.csv`,
//!   `{file_id}_TRIMMED_{res}.csv` and one data dictionary per level

use crate::adapters::{EpochTableReader, EpochTableWriter, MetadataReader};
use crate::config::CollapseConfig;
use crate::encoder::Table;
use crate::error::CollapseError;
use crate::types::{CollapseLevel, DerivedEpoch, DeviceMetadata, ParticipantEpochs};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Loads one participant's epochs and, for the dummy path, its metadata
pub trait RecordSource {
    /// Fails with [`CollapseError::MissingInput`] when the participant has no input
    fn load(&self, file_id: &str) -> Result<ParticipantEpochs, CollapseError>;

    /// Secondary metadata table, if one exists
    fn load_metadata(&self, file_id: &str) -> Result<Option<DeviceMetadata>, CollapseError>;
}

/// Persists collapsed tables
pub trait RecordSink {
    /// Summary or daily rows (or a dummy row) for one participant
    fn write_means(
        &mut self,
        file_id: &str,
        level: CollapseLevel,
        table: &Table,
    ) -> Result<(), CollapseError>;

    /// Cleaned, feature-enriched epochs of one participant
    fn write_trimmed(
        &mut self,
        file_id: &str,
        resolution: f64,
        epochs: &[DerivedEpoch],
        writer: &EpochTableWriter<'_>,
    ) -> Result<(), CollapseError>;

    fn write_dictionary(&mut self, level: CollapseLevel, dictionary: &Table)
        -> Result<(), CollapseError>;
}

/// File label for an epoch length: `1h` for whole hours, else `15m`
pub fn resolution_label(minutes: f64) -> String {
    if minutes > 0.0 && minutes % 60.0 == 0.0 {
        format!("{}h", minutes / 60.0)
    } else {
        format!("{minutes}m")
    }
}

pub fn means_file_name(file_id: &str, level: CollapseLevel) -> String {
    match level {
        CollapseLevel::Summary => format!("{file_id}_SUMMARY_MEANS.csv"),
        CollapseLevel::Daily => format!("{file_id}_DAILY_MEANS.csv"),
    }
}

pub fn dictionary_file_name(level: CollapseLevel) -> &'static str {
    match level {
        CollapseLevel::Summary => "Data_dictionary_summary_means.csv",
        CollapseLevel::Daily => "Data_dictionary_daily_means.csv",
    }
}

/// Write a table as CSV
pub fn write_table<W: Write>(table: &Table, output: W) -> Result<(), CollapseError> {
    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read CSV rows keyed by header, as persisted output is read back for verification
pub fn read_rows<R: Read>(input: R) -> Result<Vec<HashMap<String, String>>, CollapseError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(input);
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect(),
        );
    }
    Ok(rows)
}

/// Epoch tables in one directory
pub struct CsvDirectorySource<'a> {
    dir: PathBuf,
    config: &'a CollapseConfig,
}

impl<'a> CsvDirectorySource<'a> {
    pub fn new(dir: impl Into<PathBuf>, config: &'a CollapseConfig) -> Self {
        Self {
            dir: dir.into(),
            config,
        }
    }

    pub fn input_path(&self, file_id: &str) -> PathBuf {
        self.dir
            .join(format!("{file_id}_{}.csv", self.config.input_suffix))
    }

    pub fn metadata_path(&self, file_id: &str) -> PathBuf {
        self.dir.join(format!("metadata_{file_id}.csv"))
    }

    /// File ids of every input table in the directory, sorted
    pub fn discover(&self) -> Result<Vec<String>, CollapseError> {
        let suffix = format!("_{}.csv", self.config.input_suffix);
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            if let Some(id) = name.to_str().and_then(|n| n.strip_suffix(&suffix)) {
                if !id.is_empty() {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl RecordSource for CsvDirectorySource<'_> {
    fn load(&self, file_id: &str) -> Result<ParticipantEpochs, CollapseError> {
        let path = self.input_path(file_id);
        if !path.is_file() {
            return Err(CollapseError::MissingInput {
                id: file_id.to_string(),
                path: path.display().to_string(),
            });
        }
        let file = File::open(&path)?;
        EpochTableReader::new(self.config).read(file_id, BufReader::new(file))
    }

    fn load_metadata(&self, file_id: &str) -> Result<Option<DeviceMetadata>, CollapseError> {
        let path = self.metadata_path(file_id);
        if !path.is_file() {
            return Ok(None);
        }
        let file = File::open(&path)?;
        MetadataReader::read(self.config.source.profile(), BufReader::new(file))
    }
}

/// Collapsed tables written into one directory
pub struct CsvDirectorySink {
    dir: PathBuf,
}

impl CsvDirectorySink {
    /// Creates the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CollapseError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn create(&self, name: &str) -> Result<BufWriter<File>, CollapseError> {
        Ok(BufWriter::new(File::create(self.dir.join(name))?))
    }
}

impl RecordSink for CsvDirectorySink {
    fn write_means(
        &mut self,
        file_id: &str,
        level: CollapseLevel,
        table: &Table,
    ) -> Result<(), CollapseError> {
        write_table(table, self.create(&means_file_name(file_id, level))?)
    }

    fn write_trimmed(
        &mut self,
        file_id: &str,
        resolution: f64,
        epochs: &[DerivedEpoch],
        writer: &EpochTableWriter<'_>,
    ) -> Result<(), CollapseError> {
        let name = format!("{file_id}_TRIMMED_{}.csv", resolution_label(resolution));
        writer.write(epochs, self.create(&name)?)
    }

    fn write_dictionary(
        &mut self,
        level: CollapseLevel,
        dictionary: &Table,
    ) -> Result<(), CollapseError> {
        write_table(dictionary, self.create(dictionary_file_name(level))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeasonalConfig;
    use crate::features::FeatureDeriver;
    use crate::test_support::make_test_participant;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn make_test_config() -> CollapseConfig {
        CollapseConfig {
            thresholds: vec![0, 5],
            ..CollapseConfig::default()
        }
    }

    fn make_test_table() -> Table {
        Table {
            headers: vec!["id".to_string(), "Pwear".to_string()],
            rows: vec![vec!["P001".to_string(), "48".to_string()]],
        }
    }

    #[test]
    fn test_resolution_label() {
        assert_eq!(resolution_label(60.0), "1h");
        assert_eq!(resolution_label(120.0), "2h");
        assert_eq!(resolution_label(15.0), "15m");
        assert_eq!(resolution_label(0.5), "0.5m");
    }

    #[test]
    fn test_missing_input() {
        let dir = TempDir::new().unwrap();
        let config = make_test_config();
        let source = CsvDirectorySource::new(dir.path(), &config);

        let err = source.load("p404").unwrap_err();
        assert_eq!(err.code(), "MISSING_INPUT");
        assert!(source.load_metadata("p404").unwrap().is_none());
    }

    #[test]
    fn test_trimmed_round_trip() {
        let dir = TempDir::new().unwrap();
        let config = make_test_config();
        let epochs = make_test_participant(30, 1.0, 7.0, &config.thresholds);
        let derived = FeatureDeriver::derive(&epochs, &SeasonalConfig::default());

        let mut sink = CsvDirectorySink::new(dir.path()).unwrap();
        sink.write_trimmed("p001", 60.0, &derived, &EpochTableWriter::new(&config))
            .unwrap();
        let trimmed = dir.path().join("p001_TRIMMED_1h.csv");
        assert!(trimmed.is_file());

        // A trimmed table reads back as an input table
        std::fs::rename(&trimmed, dir.path().join("p001_1h_part_proc.csv")).unwrap();
        let source = CsvDirectorySource::new(dir.path(), &config);
        let reloaded = source.load("p001").unwrap();
        assert_eq!(reloaded.records.len(), 30);
        assert_eq!(reloaded.records[25].enmo, epochs.records[25].enmo);
        assert_eq!(reloaded.records[25].timestamp, epochs.records[25].timestamp);
        assert_eq!(source.discover().unwrap(), vec!["p001".to_string()]);
    }

    #[test]
    fn test_means_and_dictionary_files() {
        let dir = TempDir::new().unwrap();
        let mut sink = CsvDirectorySink::new(dir.path().join("out")).unwrap();
        let table = make_test_table();

        sink.write_means("p001", CollapseLevel::Daily, &table).unwrap();
        sink.write_dictionary(CollapseLevel::Summary, &table).unwrap();

        let daily = File::open(sink.dir().join("p001_DAILY_MEANS.csv")).unwrap();
        let rows = read_rows(daily).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("Pwear").map(String::as_str), Some("48"));
        assert!(sink
            .dir()
            .join("Data_dictionary_summary_means.csv")
            .is_file());
    }

    #[test]
    fn test_metadata_table() {
        let dir = TempDir::new().unwrap();
        let config = make_test_config();
        std::fs::write(
            dir.path().join("metadata_p002.csv"),
            "device,start_error,QC_anomaly_A\nDEV-2,0.3,0\n",
        )
        .unwrap();

        let source = CsvDirectorySource::new(dir.path(), &config);
        let metadata = source.load_metadata("p002").unwrap().unwrap();
        assert_eq!(metadata.device.as_deref(), Some("DEV-2"));
        assert_eq!(metadata.start_error.as_deref(), Some("0.3"));
    }
}
