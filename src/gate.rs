//! Validity gate and dummy emission
//!
//! A participant with at most one usable epoch, or one the upstream processing
//! flagged as having no valid days, is not collapsed. A single placeholder
//! record carrying identity and metadata is emitted instead.

use crate::types::{DeviceMetadata, DummyRecord, ParticipantEpochs};
use log::debug;
use serde::Serialize;

/// Why a participant was routed to the dummy path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DummyReason {
    /// Zero or one epoch after cleaning
    TooFewRows,
    /// Every epoch carries the upstream "no valid days" flag
    FlaggedNoValidDays,
}

/// Routing decision for a cleaned sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Dummy(DummyReason),
    Collapse,
}

/// Study id from a file id: the part before the first `_`, uppercased
pub fn participant_id(file_id: &str) -> String {
    file_id
        .split('_')
        .next()
        .unwrap_or(file_id)
        .to_uppercase()
}

pub struct ValidityGate;

impl ValidityGate {
    pub fn route(cleaned: &ParticipantEpochs) -> Route {
        let row_count = cleaned.records.len();
        let min_flag = cleaned
            .records
            .iter()
            .filter_map(|r| r.flag_no_valid_days)
            .fold(None, |min: Option<f64>, flag| {
                Some(min.map_or(flag, |m| m.min(flag)))
            });

        let route = if row_count <= 1 {
            Route::Dummy(DummyReason::TooFewRows)
        } else if min_flag == Some(1.0) {
            Route::Dummy(DummyReason::FlaggedNoValidDays)
        } else {
            Route::Collapse
        };

        debug!("{}: {} rows routed to {:?}", cleaned.file_id, row_count, route);
        route
    }
}

pub struct DummyEmitter;

impl DummyEmitter {
    /// Build the placeholder record.
    ///
    /// Metadata comes from the first cleaned epoch, else the first raw epoch,
    /// else the secondary metadata table.
    pub fn emit(
        cleaned: &ParticipantEpochs,
        raw: &ParticipantEpochs,
        fallback: Option<&DeviceMetadata>,
        time_resolution: Option<f64>,
    ) -> DummyRecord {
        let first = cleaned.records.first().or_else(|| raw.records.first());

        let metadata = first
            .map(|r| r.metadata.clone())
            .or_else(|| fallback.cloned())
            .unwrap_or_default();

        DummyRecord {
            id: participant_id(&raw.file_id),
            flag_no_valid_days: 1,
            metadata,
            wear_log_start: first.and_then(|r| r.wear_log.start.clone()),
            wear_log_end: first.and_then(|r| r.wear_log.end.clone()),
            time_resolution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::make_test_participant;

    #[test]
    fn test_participant_id() {
        assert_eq!(participant_id("abc123_wave_2024"), "ABC123");
        assert_eq!(participant_id("abc123"), "ABC123");
    }

    #[test]
    fn test_route_by_row_count() {
        assert_eq!(
            ValidityGate::route(&make_test_participant(0, 1.0, 5.0, &[0])),
            Route::Dummy(DummyReason::TooFewRows)
        );
        assert_eq!(
            ValidityGate::route(&make_test_participant(1, 1.0, 5.0, &[0])),
            Route::Dummy(DummyReason::TooFewRows)
        );
        assert_eq!(
            ValidityGate::route(&make_test_participant(2, 1.0, 5.0, &[0])),
            Route::Collapse
        );
    }

    #[test]
    fn test_route_by_suppression_flag() {
        let mut epochs = make_test_participant(24, 1.0, 5.0, &[0]);
        for record in &mut epochs.records {
            record.flag_no_valid_days = Some(1.0);
        }
        assert_eq!(
            ValidityGate::route(&epochs),
            Route::Dummy(DummyReason::FlaggedNoValidDays)
        );

        // A single unflagged epoch keeps the participant
        epochs.records[3].flag_no_valid_days = Some(0.0);
        assert_eq!(ValidityGate::route(&epochs), Route::Collapse);
    }

    #[test]
    fn test_dummy_from_first_row() {
        let raw = make_test_participant(1, 1.0, 5.0, &[0]);
        let dummy = DummyEmitter::emit(&raw, &raw, None, None);
        assert_eq!(dummy.id, "P001");
        assert_eq!(dummy.flag_no_valid_days, 1);
        assert_eq!(dummy.metadata.device.as_deref(), Some("DEV-1"));
    }

    #[test]
    fn test_dummy_falls_back_to_metadata_table() {
        let raw = make_test_participant(0, 1.0, 5.0, &[0]);
        let fallback = DeviceMetadata {
            device: Some("FALLBACK".to_string()),
            ..DeviceMetadata::default()
        };
        let dummy = DummyEmitter::emit(&raw, &raw, Some(&fallback), None);
        assert_eq!(dummy.metadata.device.as_deref(), Some("FALLBACK"));
        assert_eq!(dummy.flag_no_valid_days, 1);
    }

    #[test]
    fn test_dummy_uses_raw_row_when_cleaning_emptied_sequence() {
        let raw = make_test_participant(3, 1.0, 5.0, &[0]);
        let cleaned = ParticipantEpochs {
            file_id: raw.file_id.clone(),
            records: Vec::new(),
        };
        let dummy = DummyEmitter::emit(&cleaned, &raw, None, Some(60.0));
        assert_eq!(dummy.metadata.device.as_deref(), Some("DEV-1"));
        assert_eq!(dummy.time_resolution, Some(60.0));
    }
}
