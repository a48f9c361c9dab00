//! Temporal feature derivation
//!
//! This module enriches each cleaned epoch with:
//! - Day number within the recording
//! - Weekday/weekend membership and quadrant of day
//! - Harmonic diurnal covariates (MORNING, MIDNIGHT)
//! - Harmonic seasonal covariates (SPRING, WINTER)

use crate::config::SeasonalConfig;
use crate::types::{DayType, DerivedEpoch, ParticipantEpochs, Quadrant};
use chrono::Datelike;
use std::f64::consts::PI;

const DAYS_PER_YEAR: f64 = 365.25;

/// Feature deriver for cleaned epoch sequences
pub struct FeatureDeriver;

impl FeatureDeriver {
    /// Derive features for every epoch, in order
    pub fn derive(epochs: &ParticipantEpochs, seasonal: &SeasonalConfig) -> Vec<DerivedEpoch> {
        let hemisphere = seasonal.hemisphere.sign();
        let mut day_number = 1u32;
        let mut previous: Option<(&str, u8)> = None;

        epochs
            .records
            .iter()
            .filter_map(|epoch| {
                if let Some((file_id, hour)) = previous {
                    if hour == 24 && epoch.hour_of_day == 1 && file_id == epoch.file_id {
                        day_number += 1;
                    }
                }
                previous = Some((epoch.file_id.as_str(), epoch.hour_of_day));

                // Hours outside 1-24 are rejected by the reader
                let quadrant = Quadrant::from_hour(epoch.hour_of_day)?;
                let (morning, midnight) = diurnal_axes(epoch.hour_of_day);
                let (spring, winter) = seasonal_axes(epoch.timestamp_orig.ordinal(), hemisphere);

                Some(DerivedEpoch {
                    epoch: epoch.clone(),
                    day_number,
                    day_type: epoch.day_of_week.and_then(DayType::from_day_of_week),
                    quadrant,
                    morning,
                    midnight,
                    spring,
                    winter,
                    pwear_morning: epoch.pwear.map(|p| p * morning),
                    pwear_midnight: epoch.pwear.map(|p| p * midnight),
                })
            })
            .collect()
    }
}

/// `(sin, cos)` of the hour's angle on a 24-hour cycle
fn diurnal_axes(hour_of_day: u8) -> (f64, f64) {
    let angle = 2.0 * PI * (f64::from(hour_of_day) / 24.0);
    (angle.sin(), angle.cos())
}

/// `(sin, cos)` of the day-of-year's angle on a 365.25-day cycle, signed by hemisphere
fn seasonal_axes(day_of_year: u32, hemisphere: f64) -> (f64, f64) {
    let angle = 2.0 * PI * (f64::from(day_of_year) / DAYS_PER_YEAR);
    (angle.sin() * hemisphere, angle.cos() * hemisphere)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Hemisphere;
    use crate::test_support::make_test_participant;

    #[test]
    fn test_day_number_increments_at_midnight() {
        let epochs = make_test_participant(72, 1.0, 5.0, &[0]);
        let derived = FeatureDeriver::derive(&epochs, &SeasonalConfig::default());

        assert_eq!(derived.len(), 72);
        assert_eq!(derived[0].day_number, 1);
        assert_eq!(derived[23].day_number, 1);
        assert_eq!(derived[24].day_number, 2);
        assert_eq!(derived[71].day_number, 3);

        for pair in derived.windows(2) {
            let step = pair[1].day_number - pair[0].day_number;
            let crossed = pair[0].epoch.hour_of_day == 24 && pair[1].epoch.hour_of_day == 1;
            assert_eq!(step, crossed as u32);
        }
    }

    #[test]
    fn test_day_number_ignores_gaps_without_wraparound() {
        let mut epochs = make_test_participant(48, 1.0, 5.0, &[0]);
        // Remove hour 24 of day 1: the 23 -> 1 step is not a day change
        epochs.records.remove(23);
        let derived = FeatureDeriver::derive(&epochs, &SeasonalConfig::default());
        assert_eq!(derived.last().unwrap().day_number, 1);
    }

    #[test]
    fn test_harmonic_covariates() {
        let epochs = make_test_participant(24, 1.0, 5.0, &[0]);
        let derived = FeatureDeriver::derive(&epochs, &SeasonalConfig::default());

        // Hour 6 is a quarter turn, hour 24 a full turn
        let h6 = &derived[5];
        assert_eq!(h6.epoch.hour_of_day, 6);
        assert!((h6.morning - 1.0).abs() < 1e-12);
        assert!(h6.midnight.abs() < 1e-12);

        let h24 = &derived[23];
        assert!(h24.morning.abs() < 1e-12);
        assert!((h24.midnight - 1.0).abs() < 1e-12);

        for d in &derived {
            assert!((d.morning.powi(2) + d.midnight.powi(2) - 1.0).abs() < 1e-12);
            assert_eq!(d.pwear_morning, Some(d.morning));
        }
    }

    #[test]
    fn test_day_type_and_quadrant() {
        // 2024-01-01 is a Monday; day 6 is Saturday
        let epochs = make_test_participant(24 * 7, 1.0, 5.0, &[0]);
        let derived = FeatureDeriver::derive(&epochs, &SeasonalConfig::default());

        assert_eq!(derived[0].day_type, Some(DayType::Weekday));
        assert_eq!(derived[24 * 5].day_type, Some(DayType::Weekend));
        assert_eq!(derived[24 * 6].day_type, Some(DayType::Weekend));
        assert_eq!(derived[0].quadrant, Quadrant::Morning);
        assert_eq!(derived[6].quadrant, Quadrant::Noon);
        assert_eq!(derived[12].quadrant, Quadrant::Afternoon);
        assert_eq!(derived[23].quadrant, Quadrant::Night);
    }

    #[test]
    fn test_missing_day_of_week_has_no_day_type() {
        let mut epochs = make_test_participant(3, 1.0, 5.0, &[0]);
        epochs.records[0].day_of_week = None;
        epochs.records[2].day_of_week = Some(8);
        let derived = FeatureDeriver::derive(&epochs, &SeasonalConfig::default());
        assert_eq!(derived[0].day_type, None);
        assert_eq!(derived[1].day_type, Some(DayType::Weekday));
        assert_eq!(derived[2].day_type, None);
    }

    #[test]
    fn test_hemisphere_flips_seasonal_axes() {
        let epochs = make_test_participant(1, 1.0, 5.0, &[0]);
        let north = FeatureDeriver::derive(&epochs, &SeasonalConfig::default());
        let south = FeatureDeriver::derive(
            &epochs,
            &SeasonalConfig {
                enabled: true,
                hemisphere: Hemisphere::Southern,
            },
        );
        assert!((north[0].spring + south[0].spring).abs() < 1e-12);
        assert!((north[0].winter + south[0].winter).abs() < 1e-12);
        assert!(north[0].winter > 0.99);
    }
}
