//! Epoch cleaning
//!
//! Applies, in order and each only when switched on:
//! - wear-log window filtering, or truncation to the first N days
//! - zeroing `Pwear` on mechanical-noise epochs
//! - dropping a final epoch that carries anomaly F

use crate::config::CleaningConfig;
use crate::types::ParticipantEpochs;
use chrono::Duration;
use log::debug;

/// Cleaner for raw epoch sequences
pub struct Cleaner;

impl Cleaner {
    /// Return a cleaned copy of the sequence, ordering preserved
    pub fn clean(epochs: &ParticipantEpochs, config: &CleaningConfig) -> ParticipantEpochs {
        let mut records = epochs.records.clone();
        let raw_len = records.len();

        if config.use_wear_log {
            records.retain(|r| r.wear_log.day_valid != Some(0));
        } else if let Some(days) = config.truncate_days {
            // A cutoff past chrono's range keeps every row
            let cutoff = records.first().and_then(|first| {
                first
                    .timestamp_orig
                    .checked_add_signed(Duration::days(i64::from(days)))
            });
            if let Some(cutoff) = cutoff {
                records.retain(|r| r.timestamp_orig <= cutoff);
            }
        }

        if config.remove_mech_noise {
            for record in records.iter_mut().filter(|r| r.flag_mech_noise == Some(1.0)) {
                record.pwear = Some(0.0);
            }
        }

        if config.drop_end_anomaly_f {
            let ends_with_anomaly = records
                .last()
                .and_then(|r| r.metadata.anomaly_f())
                .is_some_and(|f| f > 0.0);
            if ends_with_anomaly {
                records.pop();
            }
        }

        debug!(
            "{}: cleaned {} epochs down to {}",
            epochs.file_id,
            raw_len,
            records.len()
        );

        ParticipantEpochs {
            file_id: epochs.file_id.clone(),
            records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::make_test_participant;
    use crate::types::ANOMALY_F_INDEX;

    fn make_test_config() -> CleaningConfig {
        CleaningConfig {
            truncate_days: None,
            remove_mech_noise: false,
            drop_end_anomaly_f: false,
            use_wear_log: false,
        }
    }

    #[test]
    fn test_no_switches_keeps_everything() {
        let epochs = make_test_participant(30, 1.0, 5.0, &[0]);
        let cleaned = Cleaner::clean(&epochs, &make_test_config());
        assert_eq!(cleaned, epochs);
    }

    #[test]
    fn test_truncation_is_inclusive() {
        let epochs = make_test_participant(72, 1.0, 5.0, &[0]);
        let config = CleaningConfig {
            truncate_days: Some(1),
            ..make_test_config()
        };
        let cleaned = Cleaner::clean(&epochs, &config);
        // Epoch exactly one day after the first is kept
        assert_eq!(cleaned.records.len(), 25);
    }

    #[test]
    fn test_truncation_beyond_date_range_keeps_all_rows() {
        let epochs = make_test_participant(30, 1.0, 5.0, &[0]);
        let config = CleaningConfig {
            truncate_days: Some(u32::MAX),
            ..make_test_config()
        };
        let cleaned = Cleaner::clean(&epochs, &config);
        assert_eq!(cleaned.records.len(), 30);
    }

    #[test]
    fn test_mech_noise_zeroes_pwear() {
        let mut epochs = make_test_participant(5, 1.0, 5.0, &[0]);
        epochs.records[2].flag_mech_noise = Some(1.0);
        let config = CleaningConfig {
            remove_mech_noise: true,
            ..make_test_config()
        };
        let cleaned = Cleaner::clean(&epochs, &config);
        assert_eq!(cleaned.records[2].pwear, Some(0.0));
        assert_eq!(cleaned.records[1].pwear, Some(1.0));
        assert_eq!(cleaned.records.len(), 5);
    }

    #[test]
    fn test_drops_final_anomaly_f_row_only() {
        let mut epochs = make_test_participant(5, 1.0, 5.0, &[0]);
        epochs.records[4].metadata.anomalies[ANOMALY_F_INDEX] = Some("1".to_string());
        let config = CleaningConfig {
            drop_end_anomaly_f: true,
            ..make_test_config()
        };
        let cleaned = Cleaner::clean(&epochs, &config);
        assert_eq!(cleaned.records.len(), 4);

        // Anomaly F elsewhere does not trigger the drop
        let mut epochs = make_test_participant(5, 1.0, 5.0, &[0]);
        epochs.records[1].metadata.anomalies[ANOMALY_F_INDEX] = Some("1".to_string());
        let cleaned = Cleaner::clean(&epochs, &config);
        assert_eq!(cleaned.records.len(), 5);
    }

    #[test]
    fn test_wear_log_overrides_truncation() {
        let mut epochs = make_test_participant(72, 1.0, 5.0, &[0]);
        for record in epochs.records.iter_mut().skip(60) {
            record.wear_log.day_valid = Some(0);
        }
        let config = CleaningConfig {
            truncate_days: Some(1),
            use_wear_log: true,
            ..make_test_config()
        };
        let cleaned = Cleaner::clean(&epochs, &config);
        assert_eq!(cleaned.records.len(), 60);
    }

    #[test]
    fn test_empty_sequence() {
        let epochs = make_test_participant(0, 1.0, 5.0, &[0]);
        let config = CleaningConfig {
            truncate_days: Some(3),
            remove_mech_noise: true,
            drop_end_anomaly_f: true,
            use_wear_log: false,
        };
        assert!(Cleaner::clean(&epochs, &config).records.is_empty());
    }
}
