use serde::Deserialize;

use crate::error::EngineError;

// Defaults for every verification threshold. Each one is independently
// tunable through `VerifyConfig`.
pub const DEFAULT_OUTLIER_ABS: f64 = 1e10;
pub const DEFAULT_HOT_COLUMN_RATIO: f64 = 0.1;
pub const DEFAULT_IQR_MULTIPLIER: f64 = 1.5;
pub const DEFAULT_ZSCORE_THRESHOLD: f64 = 3.0;
pub const DEFAULT_MIN_COMPANY_SAMPLES: usize = 4;
pub const DEFAULT_MIN_MONTH_SAMPLES: usize = 3;

/// Tunable thresholds for the verification engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerifyConfig {
    /// Absolute magnitude above which an amount is a suspected outlier.
    pub outlier_abs: f64,
    /// Minimum issues-to-rows ratio for a column to be reported hot.
    pub hot_column_ratio: f64,
    /// IQR multiplier for the per-company distribution bounds.
    pub iqr_multiplier: f64,
    /// |z| above which a monthly amount is anomalous.
    pub zscore_threshold: f64,
    /// Minimum per-company sample count before quartiles are trusted.
    pub min_company_samples: usize,
    /// Minimum per-(company, month) sample count for z-scores.
    pub min_month_samples: usize,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            outlier_abs: DEFAULT_OUTLIER_ABS,
            hot_column_ratio: DEFAULT_HOT_COLUMN_RATIO,
            iqr_multiplier: DEFAULT_IQR_MULTIPLIER,
            zscore_threshold: DEFAULT_ZSCORE_THRESHOLD,
            min_company_samples: DEFAULT_MIN_COMPANY_SAMPLES,
            min_month_samples: DEFAULT_MIN_MONTH_SAMPLES,
        }
    }
}

impl VerifyConfig {
    pub fn from_toml(input: &str) -> Result<Self, EngineError> {
        let config: VerifyConfig =
            toml::from_str(input).map_err(|e| EngineError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.outlier_abs.is_finite() || self.outlier_abs <= 0.0 {
            return Err(EngineError::ConfigValidation(format!(
                "outlier_abs must be a positive number, got {}",
                self.outlier_abs
            )));
        }
        if !self.hot_column_ratio.is_finite()
            || self.hot_column_ratio <= 0.0
            || self.hot_column_ratio > 1.0
        {
            return Err(EngineError::ConfigValidation(format!(
                "hot_column_ratio must be in (0, 1], got {}",
                self.hot_column_ratio
            )));
        }
        if !self.iqr_multiplier.is_finite() || self.iqr_multiplier <= 0.0 {
            return Err(EngineError::ConfigValidation(format!(
                "iqr_multiplier must be a positive number, got {}",
                self.iqr_multiplier
            )));
        }
        if !self.zscore_threshold.is_finite() || self.zscore_threshold <= 0.0 {
            return Err(EngineError::ConfigValidation(format!(
                "zscore_threshold must be a positive number, got {}",
                self.zscore_threshold
            )));
        }
        if self.min_company_samples < 2 {
            return Err(EngineError::ConfigValidation(format!(
                "min_company_samples must be at least 2, got {}",
                self.min_company_samples
            )));
        }
        if self.min_month_samples < 2 {
            return Err(EngineError::ConfigValidation(format!(
                "min_month_samples must be at least 2, got {}",
                self.min_month_samples
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = VerifyConfig::default();
        assert_eq!(config.outlier_abs, 1e10);
        assert_eq!(config.hot_column_ratio, 0.1);
        assert_eq!(config.iqr_multiplier, 1.5);
        assert_eq!(config.zscore_threshold, 3.0);
        assert_eq!(config.min_company_samples, 4);
        assert_eq!(config.min_month_samples, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_inherits_defaults() {
        let config = VerifyConfig::from_toml("outlier_abs = 1e6\nmin_month_samples = 5\n").unwrap();
        assert_eq!(config.outlier_abs, 1e6);
        assert_eq!(config.min_month_samples, 5);
        assert_eq!(config.hot_column_ratio, DEFAULT_HOT_COLUMN_RATIO);
    }

    #[test]
    fn rejects_out_of_range_ratio() {
        let err = VerifyConfig::from_toml("hot_column_ratio = 1.5\n").unwrap_err();
        assert!(err.to_string().contains("hot_column_ratio"));
    }

    #[test]
    fn rejects_tiny_group_minimums() {
        let err = VerifyConfig::from_toml("min_company_samples = 1\n").unwrap_err();
        assert!(err.to_string().contains("min_company_samples"));
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(VerifyConfig::from_toml("outlier_magnitude = 5\n").is_err());
    }
}
