//! Diurnal de-biasing
//!
//! Wear is rarely spread evenly across the day, so a plain mean over worn
//! epochs over-represents the hours a participant happened to wear the device.
//! For each output variable this module fits a weighted least-squares model
//! with one sinusoidal cycle per day
//!
//! ```text
//! V = b0 + b1·MORNING + b2·MIDNIGHT (+ b3·SPRING + b4·WINTER)
//! ```
//!
//! and reports the intercept `b0`, the 24-hour average with the uneven
//! sampling removed. Epoch weights are `floor(time_resolution · Pwear)`.
//!
//! The fit is solved through the singular value decomposition of the
//! row-scaled design. A rank-deficient design or zero total weight yields NaN.

use crate::config::CollapseConfig;
use crate::types::{
    CollapseLevel, DerivedEpoch, DiurnalEstimates, Estimate, OutputVariable,
};
use log::debug;
use nalgebra::{DMatrix, DVector};

/// Fits the diurnal model for every output variable of one group
pub struct DiurnalEstimator<'a> {
    config: &'a CollapseConfig,
    level: CollapseLevel,
    time_resolution: f64,
}

impl<'a> DiurnalEstimator<'a> {
    pub fn new(config: &'a CollapseConfig, level: CollapseLevel, time_resolution: f64) -> Self {
        Self {
            config,
            level,
            time_resolution,
        }
    }

    fn formula(&self) -> f64 {
        crate::types::wear_formula(self.time_resolution)
    }

    fn seasonal(&self) -> bool {
        self.config.seasonal.enabled && self.level == CollapseLevel::Summary
    }

    /// Estimates for every configured variable, in column order
    pub fn estimate_all(&self, epochs: &[DerivedEpoch]) -> DiurnalEstimates {
        DiurnalEstimates {
            estimates: self
                .config
                .output_variables()
                .iter()
                .map(|variable| self.estimate(epochs, variable))
                .collect(),
        }
    }

    /// Estimate one variable.
    ///
    /// Uses epochs where the variable is present and `Pwear > 0`. The value is
    /// absent when those epochs cover fewer hours than the level's inclusion
    /// threshold.
    pub fn estimate(&self, epochs: &[DerivedEpoch], variable: &OutputVariable) -> Estimate {
        let included: Vec<(&DerivedEpoch, f64, f64)> = epochs
            .iter()
            .filter_map(|d| {
                let pwear = d.epoch.pwear.filter(|p| *p > 0.0)?;
                let value = d.epoch.value(variable)?;
                Some((d, pwear, value))
            })
            .collect();

        let wear_hours = included.iter().map(|(_, p, _)| p).sum::<f64>() / self.formula();
        let min_hours = self.config.inclusion.min_hours(self.level);

        let value = if wear_hours >= min_hours {
            let seasonal = self.seasonal();
            let covariates: Vec<Vec<f64>> = included
                .iter()
                .map(|(d, _, _)| {
                    if seasonal {
                        vec![d.morning, d.midnight, d.spring, d.winter]
                    } else {
                        vec![d.morning, d.midnight]
                    }
                })
                .collect();
            let response: Vec<f64> = included.iter().map(|(_, _, v)| *v).collect();
            let weights: Vec<f64> = included
                .iter()
                .map(|(_, p, _)| (self.time_resolution * p).floor())
                .collect();

            match weighted_intercept(&covariates, &response, &weights) {
                Some(intercept) => Some(intercept),
                None => {
                    debug!(
                        "{}: degenerate design over {} epochs, reporting NaN",
                        variable.column_name(),
                        included.len()
                    );
                    Some(f64::NAN)
                }
            }
        } else {
            None
        };

        Estimate {
            variable: *variable,
            wear_hours,
            value,
        }
    }
}

/// Intercept of the weighted least-squares fit of `response` on an intercept
/// plus `covariates`.
///
/// Returns `None` when the total weight is zero or the weighted design is rank
/// deficient.
pub fn weighted_intercept(covariates: &[Vec<f64>], response: &[f64], weights: &[f64]) -> Option<f64> {
    let n = response.len();
    let p = covariates.first().map_or(0, |c| c.len()) + 1;
    if n == 0 || weights.iter().sum::<f64>() <= 0.0 {
        return None;
    }

    let scale: Vec<f64> = weights.iter().map(|w| w.max(0.0).sqrt()).collect();
    let design = DMatrix::from_fn(n, p, |i, j| {
        if j == 0 {
            scale[i]
        } else {
            covariates[i][j - 1] * scale[i]
        }
    });
    let target = DVector::from_fn(n, |i, _| response[i] * scale[i]);

    let svd = design.svd(true, true);
    let largest = svd.singular_values.max();
    let tolerance = largest * (n.max(p) as f64) * f64::EPSILON;
    let rank = svd
        .singular_values
        .iter()
        .filter(|s| **s > tolerance)
        .count();
    if rank < p {
        return None;
    }

    let solution = svd.solve(&target, tolerance).ok()?;
    solution.get(0).copied().filter(|b0| b0.is_finite())
}
