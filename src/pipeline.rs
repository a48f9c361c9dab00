//! Pipeline orchestration
//!
//! This module provides the public API for wear-collapse. It runs one
//! participant's epochs through the full pipeline, and runs a batch of
//! participants from a [`RecordSource`] into a [`RecordSink`].

use crate::adapters::EpochTableWriter;
use crate::cleaner::Cleaner;
use crate::config::CollapseConfig;
use crate::diurnal::DiurnalEstimator;
use crate::encoder::{SummaryEncoder, Table};
use crate::error::CollapseError;
use crate::features::FeatureDeriver;
use crate::gate::{participant_id, DummyEmitter, DummyReason, Route, ValidityGate};
use crate::imputer::Imputer;
use crate::profile::ProfileBuilder;
use crate::storage::{RecordSink, RecordSource};
use crate::types::{
    wear_formula, CollapseLevel, DayInfo, DerivedEpoch, DeviceMetadata, DummyRecord, ImputedSet,
    ParticipantEpochs, SummaryRecord, WearLogSummary,
};
use crate::wear::WearAggregator;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use uuid::Uuid;

/// Result of collapsing one participant
#[derive(Debug, Clone, PartialEq)]
pub enum CollapseOutcome {
    /// One whole-recording record
    Summary(SummaryRecord),
    /// One record per recording day
    Daily(Vec<SummaryRecord>),
    /// Placeholder for a participant without usable data
    Dummy {
        record: DummyRecord,
        reason: DummyReason,
    },
}

impl CollapseOutcome {
    /// Lay out the outcome as an output table
    pub fn to_table(&self, encoder: &SummaryEncoder<'_>) -> Table {
        match self {
            CollapseOutcome::Summary(record) => encoder.encode(std::slice::from_ref(record)),
            CollapseOutcome::Daily(days) => encoder.encode(days),
            CollapseOutcome::Dummy { record, .. } => encoder.encode_dummy(record),
        }
    }
}

/// Collapse one participant's whole recording into a single record.
///
/// # Arguments
/// * `epochs` - Raw epochs as read from the input table
/// * `config` - Validated configuration
/// * `metadata` - Secondary metadata, used only when no epoch carries any
///
/// # Example
/// ```ignore
/// let outcome = collapse_summary(&epochs, &CollapseConfig::default(), None)?;
/// ```
pub fn collapse_summary(
    epochs: &ParticipantEpochs,
    config: &CollapseConfig,
    metadata: Option<&DeviceMetadata>,
) -> Result<CollapseOutcome, CollapseError> {
    collapse(epochs, config, CollapseLevel::Summary, metadata).map(|(outcome, _)| outcome)
}

/// Collapse one participant's recording into one record per day.
pub fn collapse_daily(
    epochs: &ParticipantEpochs,
    config: &CollapseConfig,
    metadata: Option<&DeviceMetadata>,
) -> Result<CollapseOutcome, CollapseError> {
    collapse(epochs, config, CollapseLevel::Daily, metadata).map(|(outcome, _)| outcome)
}

/// Run the pipeline and also return the cleaned, derived epochs.
///
/// Pipeline stages:
/// 1. Cleaner - truncation or wear-log window, noise and anomaly edits
/// 2. ValidityGate - route to the dummy path or on
/// 3. FeatureDeriver - day number, quadrant, diurnal and seasonal covariates
/// 4. WearAggregator and DiurnalEstimator - per group
/// 5. Imputer - optional `_IMP` set, re-running stage 4
fn collapse(
    epochs: &ParticipantEpochs,
    config: &CollapseConfig,
    level: CollapseLevel,
    metadata: Option<&DeviceMetadata>,
) -> Result<(CollapseOutcome, Vec<DerivedEpoch>), CollapseError> {
    let time_resolution = epochs.time_resolution()?;
    let cleaned = Cleaner::clean(epochs, &config.cleaning);

    let time_resolution = match (ValidityGate::route(&cleaned), time_resolution) {
        (Route::Collapse, Some(resolution)) => resolution,
        (route, resolution) => {
            let reason = match route {
                Route::Dummy(reason) => reason,
                Route::Collapse => DummyReason::TooFewRows,
            };
            let record = DummyEmitter::emit(&cleaned, epochs, metadata, resolution);
            return Ok((CollapseOutcome::Dummy { record, reason }, Vec::new()));
        }
    };

    let derived = FeatureDeriver::derive(&cleaned, &config.seasonal);
    let collapser = GroupCollapser::new(config, level, time_resolution);

    let outcome = match level {
        CollapseLevel::Summary => CollapseOutcome::Summary(collapser.summary(&derived)),
        CollapseLevel::Daily => CollapseOutcome::Daily(
            split_days(&derived)
                .into_iter()
                .map(|day| collapser.day(day))
                .collect(),
        ),
    };
    Ok((outcome, derived))
}

/// Contiguous runs of epochs sharing a day number
fn split_days(epochs: &[DerivedEpoch]) -> Vec<&[DerivedEpoch]> {
    let mut days = Vec::new();
    let mut start = 0;
    for i in 1..=epochs.len() {
        if i == epochs.len() || epochs[i].day_number != epochs[start].day_number {
            days.push(&epochs[start..i]);
            start = i;
        }
    }
    days
}

/// Collapses one group of derived epochs (a whole recording or a day)
struct GroupCollapser<'a> {
    config: &'a CollapseConfig,
    level: CollapseLevel,
    time_resolution: f64,
    formula: f64,
    zero_plus_index: Option<usize>,
}

impl<'a> GroupCollapser<'a> {
    fn new(config: &'a CollapseConfig, level: CollapseLevel, time_resolution: f64) -> Self {
        Self {
            config,
            level,
            time_resolution,
            formula: wear_formula(time_resolution),
            zero_plus_index: config.thresholds.iter().position(|&t| t == 0),
        }
    }

    fn emits_profile(&self) -> bool {
        self.level == CollapseLevel::Summary && self.config.source.profile().emits_profile
    }

    fn record(&self, group: &[DerivedEpoch]) -> SummaryRecord {
        let estimator = DiurnalEstimator::new(self.config, self.level, self.time_resolution);
        let first = group.first().map(|d| &d.epoch);

        let imputed = self.config.imputation.enabled.then(|| {
            let imputed = Imputer::impute(
                group,
                &self.config.imputation,
                self.formula,
                self.zero_plus_index,
            );
            ImputedSet {
                wear: WearAggregator::aggregate(&imputed, self.formula),
                estimates: estimator.estimate_all(&imputed),
                profile: self
                    .emits_profile()
                    .then(|| ProfileBuilder::build(&imputed, self.config.include_hpfvm)),
            }
        });

        SummaryRecord {
            id: first
                .map(|e| participant_id(&e.file_id))
                .unwrap_or_default(),
            level: self.level,
            day: None,
            start_date: None,
            record_length_hours: None,
            wear: WearAggregator::aggregate(group, self.formula),
            estimates: estimator.estimate_all(group),
            profile: self
                .emits_profile()
                .then(|| ProfileBuilder::build(group, self.config.include_hpfvm)),
            imputed,
            metadata: first.map(|e| e.metadata.clone()).unwrap_or_default(),
            wear_log: self.config.cleaning.use_wear_log.then(|| wear_log(group)),
            time_resolution: self.time_resolution,
        }
    }

    fn summary(&self, epochs: &[DerivedEpoch]) -> SummaryRecord {
        let record = self.record(epochs);
        let start_date = epochs.first().map(|d| {
            d.epoch
                .date
                .clone()
                .unwrap_or_else(|| d.epoch.timestamp_orig.format("%Y-%m-%d").to_string())
        });
        SummaryRecord {
            start_date,
            record_length_hours: Some(WearAggregator::record_length(epochs, self.formula)),
            ..record
        }
    }

    fn day(&self, epochs: &[DerivedEpoch]) -> SummaryRecord {
        let record = self.record(epochs);
        let day = epochs.first().map(|d| DayInfo {
            day_number: d.day_number,
            date: d.epoch.date.clone(),
            day_of_week: d.epoch.day_of_week,
        });
        SummaryRecord { day, ..record }
    }
}

/// Wear-log window of the first epoch and the maximum of each flag
fn wear_log(epochs: &[DerivedEpoch]) -> WearLogSummary {
    let mut summary = WearLogSummary::default();
    if let Some(first) = epochs.first() {
        summary.start = first.epoch.wear_log.start.clone();
        summary.end = first.epoch.wear_log.end.clone();
    }
    for derived in epochs {
        for (slot, flag) in summary.flags.iter_mut().zip(derived.epoch.wear_log.flags) {
            if let Some(value) = flag {
                *slot = Some(slot.map_or(value, |current| current.max(value)));
            }
        }
    }
    summary
}

/// A participant routed to the dummy path
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DummyEntry {
    pub id: String,
    pub reason: DummyReason,
}

/// A participant that could not be collapsed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipantFailure {
    pub id: String,
    pub code: String,
    pub message: String,
}

/// Outcome of one batch run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub version: String,
    pub level: CollapseLevel,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// File ids collapsed into summary or daily records
    pub collapsed: Vec<String>,
    pub dummies: Vec<DummyEntry>,
    pub failures: Vec<ParticipantFailure>,
}

impl RunReport {
    pub fn to_json(&self) -> Result<String, CollapseError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn total(&self) -> usize {
        self.collapsed.len() + self.dummies.len() + self.failures.len()
    }
}

/// Batch processor over a source and a sink.
///
/// Per-participant failures are logged and collected into the [`RunReport`];
/// they never abort the batch.
pub struct CollapseProcessor {
    config: CollapseConfig,
}

impl Default for CollapseProcessor {
    fn default() -> Self {
        Self {
            config: CollapseConfig::default(),
        }
    }
}

impl CollapseProcessor {
    /// Create a processor, validating the configuration
    pub fn new(config: CollapseConfig) -> Result<Self, CollapseError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CollapseConfig {
        &self.config
    }

    /// Load and collapse one participant
    pub fn process(
        &self,
        source: &dyn RecordSource,
        file_id: &str,
        level: CollapseLevel,
    ) -> Result<CollapseOutcome, CollapseError> {
        self.process_with_epochs(source, file_id, level)
            .map(|(outcome, _)| outcome)
    }

    fn process_with_epochs(
        &self,
        source: &dyn RecordSource,
        file_id: &str,
        level: CollapseLevel,
    ) -> Result<(CollapseOutcome, Vec<DerivedEpoch>), CollapseError> {
        let epochs = source.load(file_id)?;
        // Secondary metadata only matters when no epoch carries any
        let metadata = if epochs.records.is_empty() {
            source.load_metadata(file_id)?
        } else {
            None
        };
        collapse(&epochs, &self.config, level, metadata.as_ref())
    }

    fn process_and_write(
        &self,
        source: &dyn RecordSource,
        sink: &mut dyn RecordSink,
        encoder: &SummaryEncoder<'_>,
        file_id: &str,
        level: CollapseLevel,
    ) -> Result<CollapseOutcome, CollapseError> {
        let (outcome, derived) = self.process_with_epochs(source, file_id, level)?;
        let table = outcome.to_table(encoder);

        // The means file is written last so it only exists for a fully written participant
        if let CollapseOutcome::Summary(record) = &outcome {
            let writer = EpochTableWriter::new(&self.config);
            sink.write_trimmed(file_id, record.time_resolution, &derived, &writer)?;
        }
        sink.write_means(file_id, level, &table)?;
        Ok(outcome)
    }

    /// Collapse every listed participant and write the level's data dictionary.
    ///
    /// Only a failure to write the dictionary is returned as an error.
    pub fn run_batch(
        &self,
        source: &dyn RecordSource,
        sink: &mut dyn RecordSink,
        file_ids: &[String],
        level: CollapseLevel,
    ) -> Result<RunReport, CollapseError> {
        let started_at = Utc::now();
        let encoder = SummaryEncoder::new(&self.config, level);
        sink.write_dictionary(level, &encoder.dictionary())?;

        let mut collapsed = Vec::new();
        let mut dummies = Vec::new();
        let mut failures = Vec::new();

        for file_id in file_ids {
            match self.process_and_write(source, sink, &encoder, file_id, level) {
                Ok(CollapseOutcome::Dummy { record, reason }) => {
                    info!("{file_id}: no usable data ({reason:?}), dummy record written");
                    dummies.push(DummyEntry {
                        id: record.id,
                        reason,
                    });
                }
                Ok(CollapseOutcome::Daily(days)) => {
                    info!("{file_id}: collapsed into {} daily records", days.len());
                    collapsed.push(file_id.clone());
                }
                Ok(CollapseOutcome::Summary(record)) => {
                    info!(
                        "{file_id}: collapsed {:.1} hours of wear",
                        record.wear.total
                    );
                    collapsed.push(file_id.clone());
                }
                Err(e) => {
                    warn!("{file_id}: skipped: {e}");
                    failures.push(ParticipantFailure {
                        id: file_id.clone(),
                        code: e.code().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let report = RunReport {
            run_id: Uuid::new_v4(),
            version: crate::COLLAPSE_VERSION.to_string(),
            level,
            started_at,
            finished_at: Utc::now(),
            collapsed,
            dummies,
            failures,
        };
        info!(
            "run {}: {} collapsed, {} dummies, {} failed",
            report.run_id,
            report.collapsed.len(),
            report.dummies.len(),
            report.failures.len()
        );
        Ok(report)
    }
}
