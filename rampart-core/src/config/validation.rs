//! Field checks and environment overrides shared by every config type.

use crate::error::ConfigError;
use std::time::Duration;

/// Outcome of [`Validatable::validate`](super::Validatable::validate).
pub type ValidationResult = Result<(), ConfigError>;

/// Collects field errors under a dotted prefix.
///
/// Every check runs; [`into_result`](Self::into_result) reports the first
/// failure in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    prefix: String,
    errors: Vec<ConfigError>,
}

impl ValidationContext {
    /// A context whose fields are reported as-is.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A context whose fields are reported as `<prefix>.<field>`.
    #[must_use]
    pub fn scoped(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            errors: Vec::new(),
        }
    }

    /// Runs `check` with `name` appended to the prefix.
    pub fn section(&mut self, name: &str, check: impl FnOnce(&mut Validator<'_>)) {
        let outer = self.prefix.clone();
        self.prefix = qualify(&outer, name);
        check(&mut Validator::new(self));
        self.prefix = outer;
    }

    /// Errors recorded so far.
    #[must_use]
    pub fn errors(&self) -> &[ConfigError] {
        &self.errors
    }

    /// The first recorded error, if any.
    pub fn into_result(self) -> ValidationResult {
        self.errors.into_iter().next().map_or(Ok(()), Err)
    }

    fn fail(&mut self, field: &str, reason: impl Into<String>) {
        let field = qualify(&self.prefix, field);
        self.errors.push(ConfigError::invalid_value(field, reason));
    }
}

fn qualify(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{prefix}.{field}")
    }
}

/// Chainable checks writing into a [`ValidationContext`].
#[derive(Debug)]
pub struct Validator<'a> {
    ctx: &'a mut ValidationContext,
}

impl<'a> Validator<'a> {
    /// Starts checks against `ctx`.
    pub fn new(ctx: &'a mut ValidationContext) -> Self {
        Self { ctx }
    }

    /// Requires `value` to be strictly greater than zero.
    pub fn positive<T>(&mut self, field: &str, value: &T) -> &mut Self
    where
        T: PartialOrd + Default + std::fmt::Display,
    {
        if *value <= T::default() {
            self.ctx
                .fail(field, format!("must be greater than zero, got {value}"));
        }
        self
    }

    /// Requires a non-zero duration.
    pub fn non_zero_duration(&mut self, field: &str, value: Duration) -> &mut Self {
        if value.is_zero() {
            self.ctx.fail(field, "must be longer than zero");
        }
        self
    }

    /// Records `reason` against `field` unless `holds` returns true.
    pub fn custom<F>(&mut self, field: &str, holds: F, reason: &str) -> &mut Self
    where
        F: FnOnce() -> bool,
    {
        if !holds() {
            self.ctx.fail(field, reason);
        }
        self
    }
}

/// Reads `RAMPART_*` style overrides.
///
/// A variable that is unset or does not parse leaves the target alone.
pub struct EnvOverride;

impl EnvOverride {
    fn read(var_name: &str) -> Option<String> {
        std::env::var(var_name).ok()
    }

    /// Replaces `target` with the raw value.
    pub fn apply_string(var_name: &str, target: &mut String) {
        if let Some(value) = Self::read(var_name) {
            *target = value;
        }
    }

    /// Any `FromStr` type: integers, floats, `Decimal`.
    pub fn apply_number<T: std::str::FromStr>(var_name: &str, target: &mut T) {
        if let Some(parsed) = Self::read(var_name).and_then(|v| v.trim().parse().ok()) {
            *target = parsed;
        }
    }

    /// Accepts `true/false`, `1/0`, `yes/no` and `on/off`, case-insensitively.
    pub fn apply_bool(var_name: &str, target: &mut bool) {
        let parsed = Self::read(var_name).and_then(|v| match v.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        });
        if let Some(flag) = parsed {
            *target = flag;
        }
    }

    /// Humantime syntax, e.g. `30m` or `1h 30m`.
    pub fn apply_duration(var_name: &str, target: &mut Duration) {
        if let Some(parsed) = Self::read(var_name)
            .and_then(|v| humantime_serde::re::humantime::parse_duration(v.trim()).ok())
        {
            *target = parsed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_prefix_and_nested_section() {
        let mut ctx = ValidationContext::scoped("promotion");
        ctx.section("advancement", |v| {
            v.positive("min_trades_per_step", &0u32);
        });
        Validator::new(&mut ctx).positive("ledger_cap", &0usize);

        let fields: Vec<_> = ctx.errors().iter().filter_map(ConfigError::field).collect();
        assert_eq!(
            fields,
            vec!["promotion.advancement.min_trades_per_step", "promotion.ledger_cap"]
        );
    }

    #[test]
    fn test_unscoped_section() {
        let mut ctx = ValidationContext::new();
        ctx.section("shutdown", |v| {
            v.non_zero_duration("timeout", Duration::ZERO);
        });
        let err = ctx.into_result().unwrap_err();
        assert_eq!(err.field(), Some("shutdown.timeout"));
        assert!(err.to_string().contains("longer than zero"));
    }

    #[test]
    fn test_every_check_runs() {
        let mut ctx = ValidationContext::new();
        Validator::new(&mut ctx)
            .positive("min_batch", &0)
            .non_zero_duration("interval", Duration::ZERO)
            .custom("steps", || false, "must not be empty");
        assert_eq!(ctx.errors().len(), 3);
        assert_eq!(
            ctx.into_result().unwrap_err().field(),
            Some("min_batch")
        );
    }

    #[test]
    fn test_passing_checks() {
        let mut ctx = ValidationContext::scoped("trainer");
        Validator::new(&mut ctx)
            .positive("min_batch", &1)
            .non_zero_duration("interval", Duration::from_secs(1))
            .custom("symbols", || true, "unused");
        assert!(ctx.into_result().is_ok());
    }

    #[test]
    fn test_unset_variables_leave_targets_alone() {
        let mut flag = false;
        EnvOverride::apply_bool("RAMPART_TEST_UNSET_VAR_81723", &mut flag);
        assert!(!flag);

        let mut interval = Duration::from_secs(3600);
        EnvOverride::apply_duration("RAMPART_TEST_UNSET_VAR_81723", &mut interval);
        assert_eq!(interval, Duration::from_secs(3600));

        let mut cap = 10usize;
        EnvOverride::apply_number("RAMPART_TEST_UNSET_VAR_81723", &mut cap);
        assert_eq!(cap, 10);
    }
}
