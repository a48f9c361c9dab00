//! Collapse configuration
//!
//! A single immutable [`CollapseConfig`] is built once (from JSON or defaults),
//! validated, and handed by reference to every stage.

use crate::adapters::DataSource;
use crate::error::CollapseError;
use crate::types::{CollapseLevel, Measure, OutputVariable};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default minimum wear hours for a whole-recording estimate
pub const DEFAULT_SUMMARY_MIN_HOURS: f64 = 18.0;

/// Default minimum wear hours for a single-day estimate
pub const DEFAULT_DAILY_MIN_HOURS: f64 = 8.0;

/// Default input file suffix (`{file_id}_{suffix}.csv`)
pub const DEFAULT_INPUT_SUFFIX: &str = "1h_part_proc";

/// Upper bound for `cleaning.truncate_days` (roughly a thousand years)
pub const MAX_TRUNCATE_DAYS: u32 = 365_000;

/// Intensity thresholds (milli-g) produced by the upstream processing.
///
/// 0-5 by 1, 10-150 by 5, 160-300 by 10, 400-1000 by 100, 2000-4000 by 1000.
pub fn default_thresholds() -> Vec<u32> {
    let mut thresholds: Vec<u32> = (0..=5).collect();
    thresholds.extend((10..=150).step_by(5));
    thresholds.extend((160..=300).step_by(10));
    thresholds.extend((400..=1000).step_by(100));
    thresholds.extend((2000..=4000).step_by(1000));
    thresholds
}

/// Top-level configuration for both collapsing levels
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollapseConfig {
    /// Upstream processing that produced the epoch files
    pub source: DataSource,
    /// Minimum wear hours per collapsing level
    pub inclusion: InclusionConfig,
    /// Cleaner switches
    pub cleaning: CleaningConfig,
    /// Sleep-hour imputation
    pub imputation: ImputationConfig,
    /// Seasonal covariates in the diurnal regression
    pub seasonal: SeasonalConfig,
    /// Ascending intensity thresholds (milli-g)
    pub thresholds: Vec<u32>,
    /// Collapse the HPFVM measure alongside ENMO
    pub include_hpfvm: bool,
    /// Input file suffix, without extension
    pub input_suffix: String,
}

impl Default for CollapseConfig {
    fn default() -> Self {
        Self {
            source: DataSource::default(),
            inclusion: InclusionConfig::default(),
            cleaning: CleaningConfig::default(),
            imputation: ImputationConfig::default(),
            seasonal: SeasonalConfig::default(),
            thresholds: default_thresholds(),
            include_hpfvm: false,
            input_suffix: DEFAULT_INPUT_SUFFIX.to_string(),
        }
    }
}

/// Minimum wear hours a variable needs before it is estimated
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InclusionConfig {
    pub summary_min_hours: f64,
    pub daily_min_hours: f64,
}

impl Default for InclusionConfig {
    fn default() -> Self {
        Self {
            summary_min_hours: DEFAULT_SUMMARY_MIN_HOURS,
            daily_min_hours: DEFAULT_DAILY_MIN_HOURS,
        }
    }
}

impl InclusionConfig {
    pub fn min_hours(&self, level: CollapseLevel) -> f64 {
        match level {
            CollapseLevel::Summary => self.summary_min_hours,
            CollapseLevel::Daily => self.daily_min_hours,
        }
    }
}

/// Cleaner switches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    /// Keep only the first N days after the first timestamp
    pub truncate_days: Option<u32>,
    /// Zero `Pwear` on epochs flagged as mechanical noise
    pub remove_mech_noise: bool,
    /// Drop the final epoch when it carries anomaly F
    pub drop_end_anomaly_f: bool,
    /// Restrict to wear-log valid days (`day_valid != 0`); disables truncation
    pub use_wear_log: bool,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            truncate_days: None,
            remove_mech_noise: true,
            drop_end_anomaly_f: true,
            use_wear_log: false,
        }
    }
}

/// Sleep-hour imputation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImputationConfig {
    pub enabled: bool,
    /// Hours of day (1-24) eligible for imputation
    pub hours: Vec<u8>,
    /// Fully-worn hours a day needs before its sleep hours are imputed
    pub min_day_hours: f64,
}

impl Default for ImputationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            hours: (1..=6).collect(),
            min_day_hours: 6.0,
        }
    }
}

/// Hemisphere sign applied to the seasonal covariates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hemisphere {
    #[default]
    Northern,
    Southern,
}

impl Hemisphere {
    pub fn sign(&self) -> f64 {
        match self {
            Hemisphere::Northern => 1.0,
            Hemisphere::Southern => -1.0,
        }
    }
}

/// Seasonal adjustment settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonalConfig {
    pub enabled: bool,
    pub hemisphere: Hemisphere,
}

impl CollapseConfig {
    /// Parse and validate a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self, CollapseError> {
        let config: CollapseConfig = serde_json::from_str(json)
            .map_err(|e| CollapseError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Self, CollapseError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            CollapseError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Measures to collapse, ENMO first
    pub fn measures(&self) -> Vec<Measure> {
        if self.include_hpfvm {
            vec![Measure::Enmo, Measure::Hpfvm]
        } else {
            vec![Measure::Enmo]
        }
    }

    /// Every diurnally-adjusted variable, in output column order
    pub fn output_variables(&self) -> Vec<OutputVariable> {
        OutputVariable::all(&self.measures(), &self.thresholds)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, CollapseError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every threshold and toggle before any participant is processed
    pub fn validate(&self) -> Result<(), CollapseError> {
        if self.thresholds.is_empty() {
            return Err(CollapseError::InvalidConfig(
                "thresholds must not be empty".to_string(),
            ));
        }
        if self.thresholds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(CollapseError::InvalidConfig(
                "thresholds must be strictly ascending".to_string(),
            ));
        }

        for (name, hours) in [
            ("inclusion.summary_min_hours", self.inclusion.summary_min_hours),
            ("inclusion.daily_min_hours", self.inclusion.daily_min_hours),
            ("imputation.min_day_hours", self.imputation.min_day_hours),
        ] {
            if !hours.is_finite() || hours < 0.0 {
                return Err(CollapseError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {hours}"
                )));
            }
        }

        match self.cleaning.truncate_days {
            Some(0) => {
                return Err(CollapseError::InvalidConfig(
                    "cleaning.truncate_days must be at least 1".to_string(),
                ));
            }
            Some(days) if days > MAX_TRUNCATE_DAYS => {
                return Err(CollapseError::InvalidConfig(format!(
                    "cleaning.truncate_days must be at most {MAX_TRUNCATE_DAYS}, got {days}"
                )));
            }
            _ => {}
        }

        let mut seen = HashSet::new();
        for &hour in &self.imputation.hours {
            if !(1..=24).contains(&hour) {
                return Err(CollapseError::InvalidConfig(format!(
                    "imputation hour {hour} is outside 1-24"
                )));
            }
            if !seen.insert(hour) {
                return Err(CollapseError::InvalidConfig(format!(
                    "imputation hour {hour} is listed twice"
                )));
            }
        }
        if self.imputation.enabled && !self.thresholds.contains(&0) {
            return Err(CollapseError::InvalidConfig(
                "imputation writes ENMO_0plus, so threshold 0 must be configured".to_string(),
            ));
        }

        if self.input_suffix.trim().is_empty() {
            return Err(CollapseError::InvalidConfig(
                "input_suffix must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let thresholds = default_thresholds();
        assert_eq!(thresholds.len(), 60);
        assert_eq!(thresholds[..6], [0, 1, 2, 3, 4, 5]);
        assert_eq!(thresholds[6], 10);
        assert!(thresholds.contains(&150));
        assert!(thresholds.contains(&160));
        assert!(!thresholds.contains(&155));
        assert_eq!(*thresholds.last().unwrap(), 4000);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(CollapseConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = CollapseConfig::from_json(
            r#"{"source": "pampro", "inclusion": {"daily_min_hours": 10}}"#,
        )
        .unwrap();

        assert_eq!(config.source, DataSource::Pampro);
        assert_eq!(config.inclusion.daily_min_hours, 10.0);
        assert_eq!(config.inclusion.summary_min_hours, DEFAULT_SUMMARY_MIN_HOURS);
        assert_eq!(config.thresholds, default_thresholds());
        assert!(config.cleaning.remove_mech_noise);
    }

    #[test]
    fn test_rejects_unsorted_thresholds() {
        let result = CollapseConfig::from_json(r#"{"thresholds": [0, 10, 5]}"#);
        assert!(matches!(result, Err(CollapseError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_bad_imputation_hours() {
        let result = CollapseConfig::from_json(r#"{"imputation": {"hours": [0, 1]}}"#);
        assert!(matches!(result, Err(CollapseError::InvalidConfig(_))));

        let result = CollapseConfig::from_json(r#"{"imputation": {"hours": [2, 2]}}"#);
        assert!(matches!(result, Err(CollapseError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_negative_hours() {
        let result = CollapseConfig::from_json(r#"{"inclusion": {"summary_min_hours": -1}}"#);
        assert!(matches!(result, Err(CollapseError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_out_of_range_truncate_days() {
        let err = CollapseConfig::from_json(r#"{"cleaning":{"truncate_days":4000000000}}"#)
            .unwrap_err();
        assert!(matches!(err, CollapseError::InvalidConfig(_)));

        let err =
            CollapseConfig::from_json(r#"{"cleaning":{"truncate_days":0}}"#).unwrap_err();
        assert!(matches!(err, CollapseError::InvalidConfig(_)));

        let config =
            CollapseConfig::from_json(r#"{"cleaning":{"truncate_days":365000}}"#).unwrap();
        assert_eq!(config.cleaning.truncate_days, Some(MAX_TRUNCATE_DAYS));
    }

    #[test]
    fn test_rejects_malformed_json() {
        let result = CollapseConfig::from_json("{not json");
        assert!(matches!(result, Err(CollapseError::InvalidConfig(_))));
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = CollapseConfig::default();
        config.imputation.enabled = true;
        config.seasonal.hemisphere = Hemisphere::Southern;

        let json = config.to_json().unwrap();
        let loaded = CollapseConfig::from_json(&json).unwrap();

        assert!(loaded.imputation.enabled);
        assert_eq!(loaded.seasonal.hemisphere, Hemisphere::Southern);
        assert_eq!(loaded.thresholds, config.thresholds);
    }
}
