//! Errors raised while loading or checking configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A configuration problem.
///
/// Field names are dotted paths from the root of the component's
/// configuration, e.g. `promotion.ramp_steps`.
///
/// ```
/// use rampart_core::error::ConfigError;
///
/// let error = ConfigError::invalid_value("promotion.ramp_steps", "must not be empty");
/// assert_eq!(error.field(), Some("promotion.ramp_steps"));
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigError {
    /// A required setting was not provided.
    #[error("config: `{field}` is required")]
    MissingField {
        /// Dotted path of the setting
        field: String,
    },

    /// A setting was provided but is out of range or inconsistent.
    #[error("config: `{field}` {reason}")]
    InvalidValue {
        /// Dotted path of the setting
        field: String,
        /// What is wrong, phrased to follow the field name
        reason: String,
    },

    /// The file could not be opened.
    #[error("config: cannot read {path}: {reason}")]
    FileReadError {
        /// File path
        path: String,
        /// Underlying I/O error
        reason: String,
    },

    /// The file was read but does not parse, or has an unknown extension.
    #[error("config: {path} is not valid: {reason}")]
    InvalidFormat {
        /// File path
        path: String,
        /// Parser message
        reason: String,
    },
}

impl ConfigError {
    /// Reports a required setting that is absent.
    #[must_use]
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Reports a setting with an unusable value.
    #[must_use]
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Dotted path of the offending setting, when there is one.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MissingField { field } | Self::InvalidValue { field, .. } => Some(field),
            Self::FileReadError { .. } | Self::InvalidFormat { .. } => None,
        }
    }
}
