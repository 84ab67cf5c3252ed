//! Promotion gate configuration.

use rampart_core::config::{Configurable, EnvOverride, Validatable, ValidationContext, Validator};
use rampart_core::error::ConfigError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Criteria a step must meet before the strategy moves up one rung.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvancementCriteria {
    /// Minimum trades recorded in the current step.
    #[serde(default = "default_min_trades_per_step")]
    pub min_trades_per_step: usize,
    /// Minimum per-trade Sharpe ratio (mean / population std-dev, not annualized).
    #[serde(default = "default_min_sharpe")]
    pub min_sharpe: f64,
    /// Minimum fraction of winning trades.
    #[serde(default = "default_min_win_rate")]
    pub min_win_rate: f64,
    /// Maximum drawdown of cumulative step P&L, as a fraction of its peak.
    #[serde(default = "default_advance_max_drawdown")]
    pub max_drawdown: f64,
}

fn default_min_trades_per_step() -> usize {
    20
}

fn default_min_sharpe() -> f64 {
    1.0
}

fn default_min_win_rate() -> f64 {
    0.6
}

fn default_advance_max_drawdown() -> f64 {
    0.02
}

impl Default for AdvancementCriteria {
    fn default() -> Self {
        Self {
            min_trades_per_step: default_min_trades_per_step(),
            min_sharpe: default_min_sharpe(),
            min_win_rate: default_min_win_rate(),
            max_drawdown: default_advance_max_drawdown(),
        }
    }
}

/// Conditions that demote a live strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackTriggers {
    /// Consecutive losing trades that force a rollback.
    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: u32,
    /// Step drawdown (fraction of peak) above which the step is rolled back.
    #[serde(default = "default_rollback_max_drawdown")]
    pub max_drawdown: f64,
    /// Step Sharpe below which the step is rolled back.
    #[serde(default)]
    pub min_sharpe: f64,
    /// Trades required in the step before the Sharpe trigger is evaluated.
    #[serde(default = "default_min_trades_for_sharpe")]
    pub min_trades_for_sharpe: usize,
}

fn default_max_consecutive_losses() -> u32 {
    5
}

fn default_rollback_max_drawdown() -> f64 {
    0.5
}

fn default_min_trades_for_sharpe() -> usize {
    10
}

impl Default for RollbackTriggers {
    fn default() -> Self {
        Self {
            max_consecutive_losses: default_max_consecutive_losses(),
            max_drawdown: default_rollback_max_drawdown(),
            min_sharpe: 0.0,
            min_trades_for_sharpe: default_min_trades_for_sharpe(),
        }
    }
}

/// Promotion gate configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionConfig {
    /// Strategy name, used in logs and as the persistence key suffix.
    #[serde(default = "default_strategy")]
    pub strategy: String,
    /// Notional fraction per step, lowest first.
    #[serde(default = "default_ramp_steps")]
    pub ramp_steps: Vec<Decimal>,
    /// Minimum validator confidence accepted by `initialize_promotion`.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Maximum trades kept in the all-time ledger.
    #[serde(default = "default_ledger_cap")]
    pub ledger_cap: usize,
    /// Advancement criteria.
    #[serde(default)]
    pub advancement: AdvancementCriteria,
    /// Rollback triggers.
    #[serde(default)]
    pub rollback: RollbackTriggers,
}

fn default_strategy() -> String {
    "default".to_string()
}

fn default_ramp_steps() -> Vec<Decimal> {
    vec![
        Decimal::new(5, 3),
        Decimal::new(10, 3),
        Decimal::new(15, 3),
        Decimal::new(20, 3),
    ]
}

fn default_min_confidence() -> f64 {
    0.8
}

fn default_ledger_cap() -> usize {
    10_000
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            ramp_steps: default_ramp_steps(),
            min_confidence: default_min_confidence(),
            ledger_cap: default_ledger_cap(),
            advancement: AdvancementCriteria::default(),
            rollback: RollbackTriggers::default(),
        }
    }
}

impl PromotionConfig {
    /// Sets the ramp.
    #[must_use]
    pub fn with_ramp_steps(mut self, steps: Vec<Decimal>) -> Self {
        self.ramp_steps = steps;
        self
    }

    /// Sets the advancement criteria.
    #[must_use]
    pub fn with_advancement(mut self, criteria: AdvancementCriteria) -> Self {
        self.advancement = criteria;
        self
    }

    /// Sets the rollback triggers.
    #[must_use]
    pub fn with_rollback(mut self, triggers: RollbackTriggers) -> Self {
        self.rollback = triggers;
        self
    }

    /// Sets the strategy name.
    #[must_use]
    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = strategy.into();
        self
    }

    /// Index of the last ramp step.
    #[must_use]
    pub fn max_step(&self) -> usize {
        self.ramp_steps.len().saturating_sub(1)
    }

    /// Notional fraction for `step`.
    #[must_use]
    pub fn notional_for(&self, step: usize) -> Decimal {
        self.ramp_steps.get(step).copied().unwrap_or(Decimal::ZERO)
    }
}

fn finite_fraction(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

impl Validatable for PromotionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let mut ctx = ValidationContext::scoped("promotion");
        Validator::new(&mut ctx)
            .custom(
                "strategy",
                || {
                    !self.strategy.is_empty()
                        && self
                            .strategy
                            .chars()
                            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
                },
                "must be non-empty and contain only [A-Za-z0-9_-]",
            )
            .custom(
                "ramp_steps",
                || !self.ramp_steps.is_empty(),
                "at least one ramp step is required",
            )
            .custom(
                "ramp_steps",
                || {
                    self.ramp_steps
                        .iter()
                        .all(|s| *s > Decimal::ZERO && *s <= Decimal::ONE)
                },
                "every step must be in (0, 1]",
            )
            .custom(
                "ramp_steps",
                || self.ramp_steps.windows(2).all(|w| w[0] <= w[1]),
                "steps must be non-decreasing",
            )
            .custom(
                "min_confidence",
                || finite_fraction(self.min_confidence),
                "must be within [0, 1]",
            )
            .positive("ledger_cap", &self.ledger_cap);

        ctx.section("advancement", |v| {
            v.positive("min_trades_per_step", &self.advancement.min_trades_per_step)
                .custom(
                    "min_sharpe",
                    || self.advancement.min_sharpe.is_finite(),
                    "must be finite",
                )
                .custom(
                    "min_win_rate",
                    || finite_fraction(self.advancement.min_win_rate),
                    "must be within [0, 1]",
                )
                .custom(
                    "max_drawdown",
                    || finite_fraction(self.advancement.max_drawdown),
                    "must be within [0, 1]",
                );
        });

        ctx.section("rollback", |v| {
            v.positive(
                "max_consecutive_losses",
                &self.rollback.max_consecutive_losses,
            )
            .custom(
                "max_drawdown",
                || {
                    self.rollback.max_drawdown.is_finite()
                        && self.rollback.max_drawdown > 0.0
                        && self.rollback.max_drawdown >= self.advancement.max_drawdown
                },
                "must be positive and at least advancement.max_drawdown",
            )
            .custom(
                "min_sharpe",
                || {
                    self.rollback.min_sharpe.is_finite()
                        && self.rollback.min_sharpe <= self.advancement.min_sharpe
                },
                "must be finite and no greater than advancement.min_sharpe",
            )
            .positive(
                "min_trades_for_sharpe",
                &self.rollback.min_trades_for_sharpe,
            );
        });

        ctx.into_result()
    }
}

impl Configurable for PromotionConfig {
    fn apply_env_overrides(&mut self, prefix: &str) {
        EnvOverride::apply_number(
            &format!("{prefix}_PROMOTION_MIN_CONFIDENCE"),
            &mut self.min_confidence,
        );
        EnvOverride::apply_number(
            &format!("{prefix}_PROMOTION_MAX_CONSECUTIVE_LOSSES"),
            &mut self.rollback.max_consecutive_losses,
        );
        if let Ok(value) = std::env::var(format!("{prefix}_PROMOTION_RAMP_STEPS")) {
            let parsed: Result<Vec<Decimal>, _> =
                value.split(',').map(|s| s.trim().parse()).collect();
            if let Ok(steps) = parsed {
                self.ramp_steps = steps;
            }
        }
    }

    fn env_var_names(prefix: &str) -> Vec<String> {
        vec![
            format!("{prefix}_PROMOTION_MIN_CONFIDENCE"),
            format!("{prefix}_PROMOTION_MAX_CONSECUTIVE_LOSSES"),
            format!("{prefix}_PROMOTION_RAMP_STEPS"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_are_valid() {
        let config = PromotionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_step(), 3);
        assert_eq!(config.notional_for(2), dec!(0.015));
        assert_eq!(config.notional_for(9), Decimal::ZERO);
    }

    #[test]
    fn test_malformed_ramps_rejected() {
        for steps in [
            vec![],
            vec![dec!(0.01), dec!(0.005)],
            vec![dec!(0), dec!(0.01)],
            vec![dec!(0.5), dec!(1.5)],
        ] {
            let config = PromotionConfig::default().with_ramp_steps(steps.clone());
            let err = config.validate().unwrap_err();
            assert_eq!(err.field(), Some("promotion.ramp_steps"), "{steps:?}");
        }
    }

    #[test]
    fn test_equal_adjacent_steps_allowed() {
        let config =
            PromotionConfig::default().with_ramp_steps(vec![dec!(0.01), dec!(0.01), dec!(0.02)]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rollback_looser_than_advancement() {
        let config = PromotionConfig::default().with_rollback(RollbackTriggers {
            max_drawdown: 0.01,
            ..RollbackTriggers::default()
        });
        let err = config.validate().unwrap_err();
        assert_eq!(err.field(), Some("promotion.rollback.max_drawdown"));
    }

    #[test]
    fn test_strategy_name_must_be_key_safe() {
        let config = PromotionConfig::default().with_strategy("momentum/v2");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_ramp_from_strings() {
        let config: PromotionConfig = serde_json::from_str(
            r#"{"ramp_steps":["0.01","0.02"],"advancement":{"min_trades_per_step":5}}"#,
        )
        .unwrap();
        assert_eq!(config.ramp_steps, vec![dec!(0.01), dec!(0.02)]);
        assert_eq!(config.advancement.min_trades_per_step, 5);
        assert!((config.advancement.min_win_rate - 0.6).abs() < f64::EPSILON);
    }
}
