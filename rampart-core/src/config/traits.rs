//! Configuration traits for validation and environment overrides.

use crate::error::ConfigError;

/// Trait for configuration types that can be validated.
///
/// Component constructors call [`Validatable::validate`] so malformed
/// configuration fails at startup instead of inside the trading loop.
///
/// # Example
///
/// ```rust
/// use rampart_core::config::Validatable;
/// use rampart_core::error::ConfigError;
///
/// struct WindowConfig {
///     min_batch: usize,
///     max_batch: usize,
/// }
///
/// impl Validatable for WindowConfig {
///     fn validate(&self) -> Result<(), ConfigError> {
///         if self.min_batch > self.max_batch {
///             return Err(ConfigError::invalid_value("min_batch", "exceeds max_batch"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Validatable {
    /// Validates the configuration.
    fn validate(&self) -> Result<(), ConfigError>;
}

/// Trait for configuration types that accept environment variable overrides.
pub trait Configurable: Sized {
    /// Applies environment variable overrides using `prefix` (e.g. `"RAMPART"`).
    fn apply_env_overrides(&mut self, prefix: &str);

    /// Returns the environment variable names this configuration reads.
    fn env_var_names(prefix: &str) -> Vec<String>;
}
