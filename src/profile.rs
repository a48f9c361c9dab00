//! Hourly and weekday diurnal profile

use crate::types::{DerivedEpoch, DiurnalProfile, Measure};

/// Running sums for one hour-of-day or day-of-week bucket
#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    rows: usize,
    pwear: f64,
    weighted: f64,
    weighted_pwear: f64,
    plain: f64,
    plain_rows: usize,
}

impl Bucket {
    fn pwear(&self) -> Option<f64> {
        (self.rows > 0).then_some(self.pwear)
    }

    fn weighted_mean(&self) -> Option<f64> {
        (self.weighted_pwear > 0.0).then(|| self.weighted / self.weighted_pwear)
    }

    fn plain_mean(&self) -> Option<f64> {
        (self.plain_rows > 0).then(|| self.plain / self.plain_rows as f64)
    }
}

pub struct ProfileBuilder;

impl ProfileBuilder {
    /// Raw `Pwear` sums and wear-weighted ENMO means per hour (1-24) and per
    /// weekday (1-7); plain HPFVM means when `include_hpfvm` is set
    pub fn build(epochs: &[DerivedEpoch], include_hpfvm: bool) -> DiurnalProfile {
        let mut hours = [Bucket::default(); 24];
        let mut weekdays = [Bucket::default(); 7];

        for derived in epochs {
            let epoch = &derived.epoch;
            // Epochs with an hour outside 1-24 are left out of every bucket
            let Some(hour) = usize::from(epoch.hour_of_day).checked_sub(1) else {
                continue;
            };
            if hour >= hours.len() {
                continue;
            }
            let weekday = epoch
                .day_of_week
                .and_then(|d| usize::from(d).checked_sub(1))
                .filter(|&w| w < weekdays.len());

            let hpfvm = if include_hpfvm {
                epoch.measure(Measure::Hpfvm).and_then(|v| v.mean)
            } else {
                None
            };

            let mut buckets = vec![&mut hours[hour]];
            if let Some(w) = weekday {
                buckets.push(&mut weekdays[w]);
            }
            for bucket in buckets {
                if let Some(pwear) = epoch.pwear {
                    bucket.rows += 1;
                    bucket.pwear += pwear;
                    if let Some(enmo) = epoch.enmo.mean {
                        bucket.weighted += enmo * pwear;
                        bucket.weighted_pwear += pwear;
                    }
                }
                if let Some(value) = hpfvm {
                    bucket.plain += value;
                    bucket.plain_rows += 1;
                }
            }
        }

        DiurnalProfile {
            pwear_by_hour: hours.iter().map(Bucket::pwear).collect(),
            enmo_by_hour: hours.iter().map(Bucket::weighted_mean).collect(),
            pwear_by_weekday: weekdays.iter().map(Bucket::pwear).collect(),
            enmo_by_weekday: weekdays.iter().map(Bucket::weighted_mean).collect(),
            hpfvm_by_hour: include_hpfvm.then(|| hours.iter().map(Bucket::plain_mean).collect()),
            hpfvm_by_weekday: include_hpfvm
                .then(|| weekdays.iter().map(Bucket::plain_mean).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeasonalConfig;
    use crate::features::FeatureDeriver;
    use crate::test_support::make_test_participant;
    use crate::types::MeasureValues;

    #[test]
    fn test_hourly_profile() {
        let mut epochs = make_test_participant(48, 1.0, 10.0, &[0]);
        // Hour 1 of day 2 half worn at a higher intensity
        epochs.records[24].pwear = Some(0.5);
        epochs.records[24].enmo.mean = Some(40.0);
        let derived = FeatureDeriver::derive(&epochs, &SeasonalConfig::default());

        let profile = ProfileBuilder::build(&derived, false);
        assert_eq!(profile.pwear_by_hour.len(), 24);
        assert_eq!(profile.pwear_by_hour[0], Some(1.5));
        assert_eq!(profile.pwear_by_hour[1], Some(2.0));
        // (10·1 + 40·0.5) / 1.5
        assert!((profile.enmo_by_hour[0].unwrap() - 20.0).abs() < 1e-9);
        assert!((profile.enmo_by_hour[1].unwrap() - 10.0).abs() < 1e-9);
        assert!(profile.hpfvm_by_hour.is_none());
    }

    #[test]
    fn test_weekday_profile_and_empty_groups() {
        let epochs = make_test_participant(24, 1.0, 10.0, &[0]);
        let derived = FeatureDeriver::derive(&epochs, &SeasonalConfig::default());

        let profile = ProfileBuilder::build(&derived, false);
        assert_eq!(profile.pwear_by_weekday[0], Some(24.0));
        assert_eq!(profile.enmo_by_weekday[0], Some(10.0));
        assert_eq!(profile.pwear_by_weekday[1], None);
        assert_eq!(profile.enmo_by_weekday[6], None);
    }

    #[test]
    fn test_out_of_range_hour_and_weekday_are_skipped() {
        let epochs = make_test_participant(3, 1.0, 10.0, &[0]);
        let mut derived = FeatureDeriver::derive(&epochs, &SeasonalConfig::default());
        derived[0].epoch.day_of_week = Some(0);
        derived[1].epoch.day_of_week = Some(8);
        derived[2].epoch.hour_of_day = 0;

        let profile = ProfileBuilder::build(&derived, false);
        // Rows 0 and 1 still count towards their hours
        assert_eq!(profile.pwear_by_hour[0], Some(1.0));
        assert_eq!(profile.pwear_by_hour[1], Some(1.0));
        assert_eq!(profile.pwear_by_hour[2], None);
        assert!(profile.pwear_by_weekday.iter().all(Option::is_none));
    }

    #[test]
    fn test_zero_wear_hour_has_no_mean() {
        let mut epochs = make_test_participant(24, 1.0, 10.0, &[0]);
        epochs.records[3].pwear = Some(0.0);
        let derived = FeatureDeriver::derive(&epochs, &SeasonalConfig::default());

        let profile = ProfileBuilder::build(&derived, false);
        assert_eq!(profile.pwear_by_hour[3], Some(0.0));
        assert_eq!(profile.enmo_by_hour[3], None);
    }

    #[test]
    fn test_hpfvm_plain_mean() {
        let mut epochs = make_test_participant(48, 1.0, 10.0, &[0]);
        for (i, record) in epochs.records.iter_mut().enumerate() {
            record.hpfvm = Some(MeasureValues {
                mean: Some(if i < 24 { 2.0 } else { 4.0 }),
                at_least: vec![Some(1.0)],
            });
        }
        let derived = FeatureDeriver::derive(&epochs, &SeasonalConfig::default());

        let profile = ProfileBuilder::build(&derived, true);
        let by_hour = profile.hpfvm_by_hour.unwrap();
        assert!((by_hour[5].unwrap() - 3.0).abs() < 1e-9);
        let by_weekday = profile.hpfvm_by_weekday.unwrap();
        assert_eq!(by_weekday[0], Some(2.0));
        assert_eq!(by_weekday[1], Some(4.0));
    }
}
