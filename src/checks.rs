//! Consistency checks on collapsed output
//!
//! Wear-time buckets must add up to their parents, and the differences between
//! adjacent threshold proportions must add back up to the proportion at 0
//! milli-g. Both hold by construction; these checks catch regressions and
//! damaged output files.

use crate::types::{DayType, DiurnalEstimates, Measure, OutputVariable, Quadrant, VariableKind, WearTime};
use serde::Serialize;
use std::collections::HashMap;

/// Absolute tolerance for every check
pub const CHECK_TOLERANCE: f64 = 1e-4;

/// Tolerance for daily rows, whose cells are rounded to 4 decimals before
/// writing. A wear residual sums up to five rounded cells.
pub const DAILY_CHECK_TOLERANCE: f64 = 3e-4;

/// Differences between wear-time totals and the sums of their parts
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WearResiduals {
    /// `total - Σ quadrants`
    pub quadrants: f64,
    /// `total - (weekday + weekend)`
    pub day_types: f64,
    /// `weekday - Σ quadrant×weekday`
    pub weekday_quadrants: f64,
    /// `weekend - Σ quadrant×weekend`
    pub weekend_quadrants: f64,
}

impl WearResiduals {
    pub fn named(&self) -> [(&'static str, f64); 4] {
        [
            ("Pwear_quad_diff", self.quadrants),
            ("Pwear_wk_wkend_diff", self.day_types),
            ("Pwear_wkday_quads_diff", self.weekday_quadrants),
            ("Pwear_wkend_quads_diff", self.weekend_quadrants),
        ]
    }

    pub fn within_tolerance(&self) -> bool {
        self.named()
            .iter()
            .all(|(_, residual)| residual.abs() <= CHECK_TOLERANCE)
    }
}

pub fn wear_consistency(wear: &WearTime) -> WearResiduals {
    WearResiduals {
        quadrants: wear.total - wear.quadrants.iter().sum::<f64>(),
        day_types: wear.total - (wear.weekday + wear.weekend),
        weekday_quadrants: wear.weekday - wear.quadrant_weekday.iter().sum::<f64>(),
        weekend_quadrants: wear.weekend - wear.quadrant_weekend.iter().sum::<f64>(),
    }
}

/// Share of time between two thresholds, or above the top one
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProportionCategory {
    /// e.g. `enmo_prop_cat_5_10` or `enmo_prop_cat_4000plus`
    pub name: String,
    pub value: Option<f64>,
}

/// Threshold proportions of one measure, in threshold order
pub fn threshold_proportions(estimates: &DiurnalEstimates, measure: Measure) -> Vec<(u32, Option<f64>)> {
    estimates
        .estimates
        .iter()
        .filter(|e| e.variable.measure == measure)
        .filter_map(|e| match e.variable.kind {
            VariableKind::AtLeast { threshold, .. } => Some((threshold, e.value)),
            VariableKind::Mean => None,
        })
        .collect()
}

/// Adjacent differences of ascending threshold proportions, plus the top
/// threshold's own proportion
pub fn proportion_categories(prefix: &str, proportions: &[(u32, Option<f64>)]) -> Vec<ProportionCategory> {
    let mut categories: Vec<ProportionCategory> = proportions
        .windows(2)
        .map(|pair| {
            let (low, low_value) = pair[0];
            let (high, high_value) = pair[1];
            ProportionCategory {
                name: format!("{prefix}_prop_cat_{low}_{high}"),
                value: low_value.zip(high_value).map(|(l, h)| l - h),
            }
        })
        .collect();

    if let Some(&(top, value)) = proportions.last() {
        categories.push(ProportionCategory {
            name: format!("{prefix}_prop_cat_{top}plus"),
            value,
        });
    }
    categories
}

/// `|Σ categories − proportion at 0|`; `None` when any input is absent or
/// threshold 0 is not configured
pub fn category_reconstruction_error(proportions: &[(u32, Option<f64>)]) -> Option<f64> {
    let zero_plus = proportions
        .iter()
        .find(|(threshold, _)| *threshold == 0)
        .and_then(|(_, value)| *value)?;

    let categories = proportion_categories("", proportions);
    let total = categories
        .iter()
        .map(|c| c.value)
        .sum::<Option<f64>>()?;
    Some((total - zero_plus).abs())
}

/// A failed check on one output row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckFailure {
    pub row: usize,
    pub id: String,
    pub check: String,
    pub residual: f64,
}

/// Apply every check to rows of a persisted summary or daily file.
///
/// Rows lacking the needed columns (dummy rows) are skipped, as are NaN
/// estimates.
pub fn verify_rows(
    rows: &[HashMap<String, String>],
    thresholds: &[u32],
    measures: &[Measure],
) -> Vec<CheckFailure> {
    let mut failures = Vec::new();

    for (index, row) in rows.iter().enumerate() {
        let id = row.get("id").cloned().unwrap_or_default();
        let tolerance = if row.contains_key("day_number") {
            DAILY_CHECK_TOLERANCE
        } else {
            CHECK_TOLERANCE
        };
        let mut fail = |check: &str, residual: f64| {
            if residual.is_finite() && residual.abs() > tolerance {
                failures.push(CheckFailure {
                    row: index,
                    id: id.clone(),
                    check: check.to_string(),
                    residual,
                });
            }
        };

        if let Some(wear) = wear_from_row(row) {
            for (name, residual) in wear_consistency(&wear).named() {
                fail(name, residual);
            }
        }

        for &measure in measures {
            let proportions: Vec<(u32, Option<f64>)> = OutputVariable::all(&[measure], thresholds)
                .iter()
                .filter_map(|v| match v.kind {
                    VariableKind::AtLeast { threshold, .. } => {
                        Some((threshold, cell(row, &v.column_name())))
                    }
                    VariableKind::Mean => None,
                })
                .collect();
            if let Some(error) = category_reconstruction_error(&proportions) {
                fail(&format!("{}_total_diff", measure.output_prefix()), error);
            }
        }
    }

    failures
}

fn cell(row: &HashMap<String, String>, column: &str) -> Option<f64> {
    row.get(column)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<f64>().ok())
}

fn wear_from_row(row: &HashMap<String, String>) -> Option<WearTime> {
    let mut wear = WearTime {
        total: cell(row, "Pwear")?,
        ..WearTime::default()
    };
    for quadrant in Quadrant::ALL {
        let i = quadrant.index();
        wear.quadrants[i] = cell(row, &format!("Pwear_{}", quadrant.as_str()))?;
        for day_type in DayType::ALL {
            let value = cell(
                row,
                &format!("Pwear_{}_{}", quadrant.as_str(), day_type.suffix()),
            )?;
            match day_type {
                DayType::Weekday => wear.quadrant_weekday[i] = value,
                DayType::Weekend => wear.quadrant_weekend[i] = value,
            }
        }
    }
    wear.weekday = cell(row, "Pwear_wkday")?;
    wear.weekend = cell(row, "Pwear_wkend")?;
    Some(wear)
}
