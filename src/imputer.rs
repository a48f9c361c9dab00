//! Sleep-hour imputation
//!
//! A day with enough fully-worn hours but no wear during the configured sleep
//! hours is assumed asleep rather than missing: those unworn sleep-hour epochs
//! are replaced with fully-worn, zero-movement epochs. The caller then
//! recomputes wear time and estimates on the result as the `_IMP` set.

use crate::config::ImputationConfig;
use crate::types::DerivedEpoch;
use log::debug;
use std::collections::HashMap;

pub struct Imputer;

impl Imputer {
    /// Return an imputed copy of the derived epochs.
    ///
    /// `zero_plus_index` is the position of threshold 0 in the threshold list.
    pub fn impute(
        epochs: &[DerivedEpoch],
        config: &ImputationConfig,
        formula: f64,
        zero_plus_index: Option<usize>,
    ) -> Vec<DerivedEpoch> {
        let mut worn_by_day: HashMap<u32, f64> = HashMap::new();
        for derived in epochs {
            if derived.epoch.pwear == Some(1.0) {
                *worn_by_day.entry(derived.day_number).or_default() += 1.0;
            }
        }

        let eligible = |day: u32| {
            worn_by_day
                .get(&day)
                .is_some_and(|sum| sum / formula > config.min_day_hours)
        };

        let mut imputed_count = 0usize;
        let imputed = epochs
            .iter()
            .map(|derived| {
                let mut derived = derived.clone();
                if derived.epoch.pwear == Some(0.0)
                    && config.hours.contains(&derived.epoch.hour_of_day)
                    && eligible(derived.day_number)
                {
                    derived.epoch.pwear = Some(1.0);
                    derived.epoch.enmo.mean = Some(0.0);
                    if let Some(slot) =
                        zero_plus_index.and_then(|i| derived.epoch.enmo.at_least.get_mut(i))
                    {
                        *slot = Some(1.0);
                    }
                    derived.pwear_morning = Some(derived.morning);
                    derived.pwear_midnight = Some(derived.midnight);
                    imputed_count += 1;
                }
                derived
            })
            .collect();

        debug!("imputed {imputed_count} sleep-hour epochs");
        imputed
    }
}
