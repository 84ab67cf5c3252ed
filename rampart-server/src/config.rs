//! Server configuration.
//!
//! [`ServerConfig`] aggregates every component's configuration plus the
//! settings that only the binary needs: where state lives, how the external
//! collaborators are reached, and how shutdown behaves.
//!
//! ```yaml
//! state_dir: ./state
//! trainer:
//!   symbols: [BTC-USDT]
//!   interval: 1h
//! collaborators:
//!   feature_snapshot: ./data/features.json
//!   samples: ./data/samples.jsonl
//!   trainer: { program: python3, args: [train.py] }
//!   validator: { program: python3, args: [validate.py] }
//! ```

use rampart_core::config::{Configurable, EnvOverride, Validatable, ValidationContext, Validator};
use rampart_core::error::ConfigError;
use rampart_drift::DriftConfig;
use rampart_risk::{PromotionConfig, RollbackConfig};
use rampart_telemetry::logging::LogConfig;
use rampart_trainer::TrainerConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for `rampart-server`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Logging
    #[serde(default)]
    pub logging: LogConfig,

    /// Directory holding persisted trainer, gate and rollback state.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Drift thresholds
    #[serde(default)]
    pub drift: DriftConfig,

    /// Capital ramp
    #[serde(default)]
    pub promotion: PromotionConfig,

    /// Rollback audit trail
    #[serde(default)]
    pub rollback: RollbackConfig,

    /// Retraining schedule
    pub trainer: TrainerConfig,

    /// External collaborators
    pub collaborators: CollaboratorConfig,

    /// Fill intake
    #[serde(default)]
    pub fills: FillConfig,

    /// How often promotion and trainer status are logged.
    #[serde(default = "default_status_interval", with = "humantime_serde")]
    pub status_interval: Duration,

    /// Shutdown behavior
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}

fn default_status_interval() -> Duration {
    Duration::from_secs(60)
}

impl ServerConfig {
    /// Creates a configuration with defaults around the required sections.
    #[must_use]
    pub fn new(trainer: TrainerConfig, collaborators: CollaboratorConfig) -> Self {
        Self {
            logging: LogConfig::default(),
            state_dir: default_state_dir(),
            drift: DriftConfig::default(),
            promotion: PromotionConfig::default(),
            rollback: RollbackConfig::default(),
            trainer,
            collaborators,
            fills: FillConfig::default(),
            status_interval: default_status_interval(),
            shutdown: ShutdownConfig::default(),
        }
    }

    /// Sets the state directory.
    #[must_use]
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }
}

impl Validatable for ServerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.logging.validate()?;
        self.drift.validate()?;
        self.promotion.validate()?;
        self.trainer.validate()?;

        let mut ctx = ValidationContext::new();
        Validator::new(&mut ctx)
            .custom(
                "state_dir",
                || !self.state_dir.as_os_str().is_empty(),
                "must not be empty",
            )
            .non_zero_duration("status_interval", self.status_interval);
        ctx.section("rollback", |v| {
            v.positive("history_cap", &self.rollback.history_cap);
        });
        ctx.section("shutdown", |v| {
            v.non_zero_duration("timeout", self.shutdown.timeout);
        });
        ctx.section("collaborators", |v| {
            v.custom(
                "trainer.program",
                || !self.collaborators.trainer.program.trim().is_empty(),
                "must not be empty",
            )
            .custom(
                "validator.program",
                || !self.collaborators.validator.program.trim().is_empty(),
                "must not be empty",
            );
        });
        ctx.into_result()
    }
}

impl Configurable for ServerConfig {
    fn apply_env_overrides(&mut self, prefix: &str) {
        EnvOverride::apply_string(&format!("{prefix}_LOG_LEVEL"), &mut self.logging.level);
        if let Ok(dir) = std::env::var(format!("{prefix}_STATE_DIR")) {
            self.state_dir = PathBuf::from(dir);
        }
        EnvOverride::apply_duration(
            &format!("{prefix}_STATUS_INTERVAL"),
            &mut self.status_interval,
        );
        EnvOverride::apply_bool(&format!("{prefix}_FILLS_STDIN"), &mut self.fills.stdin);
        self.drift.apply_env_overrides(prefix);
        self.promotion.apply_env_overrides(prefix);
        self.trainer.apply_env_overrides(prefix);
    }

    fn env_var_names(prefix: &str) -> Vec<String> {
        let mut names = vec![
            format!("{prefix}_LOG_LEVEL"),
            format!("{prefix}_STATE_DIR"),
            format!("{prefix}_STATUS_INTERVAL"),
            format!("{prefix}_FILLS_STDIN"),
        ];
        names.extend(DriftConfig::env_var_names(prefix));
        names.extend(PromotionConfig::env_var_names(prefix));
        names.extend(TrainerConfig::env_var_names(prefix));
        names
    }
}

/// Where the file and command collaborators find their inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaboratorConfig {
    /// JSON file mapping each symbol to its current features and performance.
    pub feature_snapshot: PathBuf,
    /// JSON-lines file of labeled samples.
    pub samples: PathBuf,
    /// Command that trains a candidate.
    pub trainer: CommandConfig,
    /// Command that validates a candidate.
    pub validator: CommandConfig,
}

/// An external program invoked once per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Executable
    pub program: String,
    /// Arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory; inherits the server's when unset
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl CommandConfig {
    /// Creates a command without arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    /// Appends arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Fill intake settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillConfig {
    /// Read JSON-lines fills from standard input.
    #[serde(default = "default_stdin")]
    pub stdin: bool,
}

fn default_stdin() -> bool {
    true
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            stdin: default_stdin(),
        }
    }
}

/// Shutdown settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// How long background tasks get to finish before they are aborted.
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout: default_shutdown_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rampart_core::types::Symbol;
    use rust_decimal_macros::dec;

    const YAML: &str = r"
state_dir: /var/lib/rampart
status_interval: 5m
logging:
  level: debug
promotion:
  strategy: momentum
  ramp_steps: ['0.01', '0.02']
trainer:
  symbols: [BTC-USDT]
  interval: 30m
collaborators:
  feature_snapshot: data/features.json
  samples: data/samples.jsonl
  trainer:
    program: python3
    args: [train.py, --fast]
  validator:
    program: ./validate
shutdown:
  timeout: 10s
";

    fn minimal() -> ServerConfig {
        ServerConfig::new(
            TrainerConfig::new(vec![Symbol::new_unchecked("BTC-USDT")]),
            CollaboratorConfig {
                feature_snapshot: PathBuf::from("features.json"),
                samples: PathBuf::from("samples.jsonl"),
                trainer: CommandConfig::new("train"),
                validator: CommandConfig::new("validate"),
            },
        )
    }

    #[test]
    fn test_yaml_config() {
        let config: ServerConfig = serde_yaml::from_str(YAML).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.state_dir, PathBuf::from("/var/lib/rampart"));
        assert_eq!(config.status_interval, Duration::from_secs(300));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.promotion.strategy, "momentum");
        assert_eq!(config.promotion.ramp_steps, vec![dec!(0.01), dec!(0.02)]);
        assert_eq!(config.trainer.interval, Duration::from_secs(1800));
        assert_eq!(config.collaborators.trainer.args, vec!["train.py", "--fast"]);
        assert_eq!(config.collaborators.validator.working_dir, None);
        assert_eq!(config.shutdown.timeout, Duration::from_secs(10));
        assert!(config.fills.stdin);
        assert_eq!(config.rollback.history_cap, 100);
    }

    #[test]
    fn test_defaults_validate() {
        let config = minimal();
        assert!(config.validate().is_ok());
        assert_eq!(config.state_dir, PathBuf::from("state"));
        assert_eq!(config.shutdown.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_component_errors_surface() {
        let mut config = minimal();
        config.trainer.symbols.clear();
        let err = config.validate().unwrap_err();
        assert_eq!(err.field(), Some("trainer.symbols"));
    }

    #[test]
    fn test_empty_program_rejected() {
        let mut config = minimal();
        config.collaborators.validator = CommandConfig::new("  ");
        let err = config.validate().unwrap_err();
        assert_eq!(err.field(), Some("collaborators.validator.program"));
    }

    #[test]
    fn test_zero_history_cap_rejected() {
        let mut config = minimal();
        config.rollback.history_cap = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_trainer_section_fails_to_parse() {
        let yaml = "collaborators: {feature_snapshot: a, samples: b, trainer: {program: t}, validator: {program: v}}\n";
        assert!(serde_yaml::from_str::<ServerConfig>(yaml).is_err());
    }

    #[test]
    fn test_env_var_names_include_components() {
        let names = ServerConfig::env_var_names("RAMPART");
        assert!(names.contains(&"RAMPART_STATE_DIR".to_string()));
        assert!(names.contains(&"RAMPART_TRAINER_INTERVAL".to_string()));
        assert!(names.contains(&"RAMPART_PROMOTION_MIN_CONFIDENCE".to_string()));
    }
}
