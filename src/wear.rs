//! Wear-time aggregation
//!
//! Sums wear probability over a group of epochs and converts the sums to hours,
//! split by quadrant of day, by weekday/weekend and by both.

use crate::types::{DayType, DerivedEpoch, WearTime};

pub struct WearAggregator;

impl WearAggregator {
    /// Wear hours for one group (a whole recording or one day).
    ///
    /// `formula` is epochs per hour (`60 / time_resolution`). Absent `Pwear`
    /// contributes nothing.
    pub fn aggregate(epochs: &[DerivedEpoch], formula: f64) -> WearTime {
        let mut sums = WearTime::default();

        for derived in epochs {
            let pwear = match derived.epoch.pwear {
                Some(p) => p,
                None => continue,
            };
            let q = derived.quadrant.index();

            sums.total += pwear;
            sums.quadrants[q] += pwear;
            match derived.day_type {
                Some(DayType::Weekday) => {
                    sums.weekday += pwear;
                    sums.quadrant_weekday[q] += pwear;
                }
                Some(DayType::Weekend) => {
                    sums.weekend += pwear;
                    sums.quadrant_weekend[q] += pwear;
                }
                None => {}
            }
        }

        WearTime {
            total: sums.total / formula,
            quadrants: sums.quadrants.map(|s| s / formula),
            weekday: sums.weekday / formula,
            weekend: sums.weekend / formula,
            quadrant_weekday: sums.quadrant_weekday.map(|s| s / formula),
            quadrant_weekend: sums.quadrant_weekend.map(|s| s / formula),
        }
    }

    /// Hours covered by epochs that carry a wear probability
    pub fn record_length(epochs: &[DerivedEpoch], formula: f64) -> f64 {
        epochs.iter().filter(|d| d.epoch.pwear.is_some()).count() as f64 / formula
    }
}
