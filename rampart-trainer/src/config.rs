//! Online trainer configuration.

use rampart_core::config::{Configurable, EnvOverride, Validatable, ValidationContext, Validator};
use rampart_core::error::ConfigError;
use rampart_core::types::Symbol;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where a freshly deployed model starts on the capital ramp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStart {
    /// Live at the lowest ramp step.
    #[default]
    LowestStep,
    /// Shadow mode; going live needs a separate validation.
    Shadow,
}

/// Schedule, batch bounds and collaborator budgets for
/// [`OnlineTrainer`](crate::OnlineTrainer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Symbols assessed for drift and trained on.
    pub symbols: Vec<Symbol>,

    /// Pause between cycles, measured from the end of the previous cycle.
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// How far back training samples are collected.
    #[serde(default = "default_data_window", with = "humantime_serde")]
    pub data_window: Duration,

    /// Fewer samples than this ends the cycle as insufficient data.
    #[serde(default = "default_min_batch_size")]
    pub min_batch_size: usize,

    /// Most recent samples kept when more are available.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Reject candidates whose performance estimate does not beat production.
    #[serde(default)]
    pub require_improvement: bool,

    /// Minimum relative improvement when `require_improvement` is set.
    #[serde(default)]
    pub min_improvement: f64,

    /// Production models retained for rollback.
    #[serde(default = "default_production_history_cap")]
    pub production_history_cap: usize,

    /// Training runs retained for the status API.
    #[serde(default = "default_run_history_cap")]
    pub run_history_cap: usize,

    /// Ramp entry for deployed models.
    #[serde(default)]
    pub deployment_start: DeploymentStart,

    /// Budget for each feature or performance fetch.
    #[serde(default = "default_feature_timeout", with = "humantime_serde")]
    pub feature_timeout: Duration,

    /// Budget for sample collection.
    #[serde(default = "default_collection_timeout", with = "humantime_serde")]
    pub collection_timeout: Duration,

    /// Budget for the training routine.
    #[serde(default = "default_training_timeout", with = "humantime_serde")]
    pub training_timeout: Duration,

    /// Budget for validation.
    #[serde(default = "default_validation_timeout", with = "humantime_serde")]
    pub validation_timeout: Duration,

    /// Run one cycle immediately when the loop starts.
    #[serde(default)]
    pub run_on_start: bool,
}

fn default_interval() -> Duration {
    Duration::from_secs(3600)
}

fn default_data_window() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_min_batch_size() -> usize {
    100
}

fn default_max_batch_size() -> usize {
    5_000
}

fn default_production_history_cap() -> usize {
    5
}

fn default_run_history_cap() -> usize {
    50
}

fn default_feature_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_collection_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_training_timeout() -> Duration {
    Duration::from_secs(1800)
}

fn default_validation_timeout() -> Duration {
    Duration::from_secs(600)
}

impl TrainerConfig {
    /// Creates a configuration with defaults for `symbols`.
    #[must_use]
    pub fn new(symbols: Vec<Symbol>) -> Self {
        Self {
            symbols,
            interval: default_interval(),
            data_window: default_data_window(),
            min_batch_size: default_min_batch_size(),
            max_batch_size: default_max_batch_size(),
            require_improvement: false,
            min_improvement: 0.0,
            production_history_cap: default_production_history_cap(),
            run_history_cap: default_run_history_cap(),
            deployment_start: DeploymentStart::default(),
            feature_timeout: default_feature_timeout(),
            collection_timeout: default_collection_timeout(),
            training_timeout: default_training_timeout(),
            validation_timeout: default_validation_timeout(),
            run_on_start: false,
        }
    }

    /// Sets the cycle interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the batch bounds.
    #[must_use]
    pub fn with_batch_bounds(mut self, min: usize, max: usize) -> Self {
        self.min_batch_size = min;
        self.max_batch_size = max;
        self
    }

    /// Requires candidates to beat production by `min_improvement`.
    #[must_use]
    pub fn with_required_improvement(mut self, min_improvement: f64) -> Self {
        self.require_improvement = true;
        self.min_improvement = min_improvement;
        self
    }

    /// Sets the deployment start policy.
    #[must_use]
    pub fn with_deployment_start(mut self, start: DeploymentStart) -> Self {
        self.deployment_start = start;
        self
    }

    /// Sets the training routine budget.
    #[must_use]
    pub fn with_training_timeout(mut self, timeout: Duration) -> Self {
        self.training_timeout = timeout;
        self
    }
}

impl Validatable for TrainerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let mut ctx = ValidationContext::scoped("trainer");
        Validator::new(&mut ctx)
            .custom(
                "symbols",
                || !self.symbols.is_empty(),
                "at least one symbol is required",
            )
            .non_zero_duration("interval", self.interval)
            .non_zero_duration("data_window", self.data_window)
            .positive("min_batch_size", &self.min_batch_size)
            .custom(
                "max_batch_size",
                || self.max_batch_size >= self.min_batch_size,
                "must be at least min_batch_size",
            )
            .custom(
                "min_improvement",
                || self.min_improvement.is_finite(),
                "must be finite",
            )
            .positive("production_history_cap", &self.production_history_cap)
            .positive("run_history_cap", &self.run_history_cap)
            .non_zero_duration("feature_timeout", self.feature_timeout)
            .non_zero_duration("collection_timeout", self.collection_timeout)
            .non_zero_duration("training_timeout", self.training_timeout)
            .non_zero_duration("validation_timeout", self.validation_timeout);
        ctx.into_result()
    }
}

impl Configurable for TrainerConfig {
    fn apply_env_overrides(&mut self, prefix: &str) {
        EnvOverride::apply_duration(&format!("{prefix}_TRAINER_INTERVAL"), &mut self.interval);
        EnvOverride::apply_number(
            &format!("{prefix}_TRAINER_MIN_BATCH_SIZE"),
            &mut self.min_batch_size,
        );
        EnvOverride::apply_number(
            &format!("{prefix}_TRAINER_MAX_BATCH_SIZE"),
            &mut self.max_batch_size,
        );
        EnvOverride::apply_bool(
            &format!("{prefix}_TRAINER_REQUIRE_IMPROVEMENT"),
            &mut self.require_improvement,
        );
        EnvOverride::apply_duration(
            &format!("{prefix}_TRAINER_TRAINING_TIMEOUT"),
            &mut self.training_timeout,
        );
    }

    fn env_var_names(prefix: &str) -> Vec<String> {
        vec![
            format!("{prefix}_TRAINER_INTERVAL"),
            format!("{prefix}_TRAINER_MIN_BATCH_SIZE"),
            format!("{prefix}_TRAINER_MAX_BATCH_SIZE"),
            format!("{prefix}_TRAINER_REQUIRE_IMPROVEMENT"),
            format!("{prefix}_TRAINER_TRAINING_TIMEOUT"),
        ]
    }
}
