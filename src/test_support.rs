//! Synthetic epoch builders shared by the unit tests

use crate::types::{DeviceMetadata, EpochRecord, MeasureValues, ParticipantEpochs};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};

/// Midnight on Monday 2024-01-01
pub fn make_test_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap()
}

/// One epoch `index` steps after `start`; hour of day runs 1-24
pub fn make_test_epoch(
    start: NaiveDateTime,
    index: i64,
    resolution_minutes: i64,
    pwear: f64,
    enmo: f64,
    thresholds: &[u32],
) -> EpochRecord {
    let timestamp = start + Duration::minutes(index * resolution_minutes);
    EpochRecord {
        file_id: "p001".to_string(),
        timestamp,
        timestamp_orig: timestamp,
        date: Some(timestamp.date().format("%Y-%m-%d").to_string()),
        hour_of_day: timestamp.hour() as u8 + 1,
        day_of_week: Some(timestamp.weekday().number_from_monday() as u8),
        pwear: Some(pwear),
        enmo: MeasureValues {
            mean: Some(enmo),
            at_least: thresholds
                .iter()
                .map(|&t| Some(if enmo >= t as f64 { 1.0 } else { 0.0 }))
                .collect(),
        },
        hpfvm: None,
        flag_mech_noise: Some(0.0),
        flag_no_valid_days: Some(0.0),
        wear_log: Default::default(),
        metadata: DeviceMetadata {
            device: Some("DEV-1".to_string()),
            ..DeviceMetadata::default()
        },
    }
}

/// `hours` hourly epochs from Monday midnight with constant wear and ENMO
pub fn make_test_participant(hours: i64, pwear: f64, enmo: f64, thresholds: &[u32]) -> ParticipantEpochs {
    let start = make_test_start();
    let records = (0..hours)
        .map(|i| make_test_epoch(start, i, 60, pwear, enmo, thresholds))
        .collect();
    ParticipantEpochs::new("p001", records)
}
