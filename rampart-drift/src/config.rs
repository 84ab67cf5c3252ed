//! Drift monitor configuration.

use rampart_core::config::{Configurable, EnvOverride, Validatable, ValidationContext, Validator};
use rampart_core::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Thresholds and bookkeeping limits for [`DriftMonitor`](crate::DriftMonitor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftConfig {
    /// Relative drift above which a symbol is yellow.
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,
    /// Relative drift above which a symbol is red and rollback is recommended.
    #[serde(default = "default_rollback_threshold")]
    pub rollback_threshold: f64,
    /// Number of assessments kept for the status API.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
    /// Features to compare. Empty means every feature in the baseline.
    #[serde(default)]
    pub tracked_features: Vec<String>,
}

fn default_warning_threshold() -> f64 {
    0.15
}

fn default_rollback_threshold() -> f64 {
    0.25
}

fn default_history_cap() -> usize {
    500
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            warning_threshold: default_warning_threshold(),
            rollback_threshold: default_rollback_threshold(),
            history_cap: default_history_cap(),
            tracked_features: Vec::new(),
        }
    }
}

impl DriftConfig {
    /// Sets both thresholds.
    #[must_use]
    pub fn with_thresholds(mut self, warning: f64, rollback: f64) -> Self {
        self.warning_threshold = warning;
        self.rollback_threshold = rollback;
        self
    }

    /// Restricts comparison to the named features.
    #[must_use]
    pub fn with_tracked_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tracked_features = features.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the assessment history cap.
    #[must_use]
    pub fn with_history_cap(mut self, cap: usize) -> Self {
        self.history_cap = cap;
        self
    }
}

impl Validatable for DriftConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let mut ctx = ValidationContext::scoped("drift");
        Validator::new(&mut ctx)
            .custom(
                "warning_threshold",
                || self.warning_threshold.is_finite() && self.warning_threshold >= 0.0,
                "must be a finite non-negative number",
            )
            .custom(
                "rollback_threshold",
                || {
                    self.rollback_threshold.is_finite()
                        && self.rollback_threshold > self.warning_threshold
                },
                "must be finite and greater than warning_threshold",
            )
            .positive("history_cap", &self.history_cap);
        ctx.into_result()
    }
}

impl Configurable for DriftConfig {
    fn apply_env_overrides(&mut self, prefix: &str) {
        EnvOverride::apply_number(
            &format!("{prefix}_DRIFT_WARNING_THRESHOLD"),
            &mut self.warning_threshold,
        );
        EnvOverride::apply_number(
            &format!("{prefix}_DRIFT_ROLLBACK_THRESHOLD"),
            &mut self.rollback_threshold,
        );
    }

    fn env_var_names(prefix: &str) -> Vec<String> {
        vec![
            format!("{prefix}_DRIFT_WARNING_THRESHOLD"),
            format!("{prefix}_DRIFT_ROLLBACK_THRESHOLD"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DriftConfig::default();
        assert!((config.warning_threshold - 0.15).abs() < f64::EPSILON);
        assert!((config.rollback_threshold - 0.25).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let config = DriftConfig::default().with_thresholds(0.3, 0.2);
        let err = config.validate().unwrap_err();
        assert_eq!(err.field(), Some("drift.rollback_threshold"));
    }

    #[test]
    fn test_zero_history_cap_rejected() {
        assert!(DriftConfig::default().with_history_cap(0).validate().is_err());
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: DriftConfig =
            serde_json::from_str(r#"{"tracked_features":["volatility"]}"#).unwrap();
        assert_eq!(config.history_cap, 500);
        assert_eq!(config.tracked_features, vec!["volatility".to_string()]);
    }
}
