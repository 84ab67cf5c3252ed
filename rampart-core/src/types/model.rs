//! Model references and validation results.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ValidationError;

/// Opaque reference to a trained model produced by the external trainer.
///
/// The envelope never inspects model contents; it only moves references
/// between the candidate slot, the production history and rollback records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelRef(String);

impl ModelRef {
    /// Creates a new `ModelRef`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyModelRef` for blank references.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        if s.trim().is_empty() {
            return Err(ValidationError::EmptyModelRef);
        }
        Ok(Self(s))
    }

    /// Returns the reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ModelRef {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ModelRef> for String {
    fn from(model: ModelRef) -> Self {
        model.0
    }
}

/// Outcome of shadow validation for a candidate model.
///
/// Both model deployment and promotion initialization consume this shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Whether the validator approved the candidate.
    pub approved: bool,
    /// Validator confidence in `[0, 1]`.
    pub confidence: f64,
    /// Scalar performance estimate (e.g. validation Sharpe).
    pub performance_estimate: f64,
}

impl ValidationReport {
    /// Creates an approved report.
    #[must_use]
    pub const fn approved(confidence: f64, performance_estimate: f64) -> Self {
        Self {
            approved: true,
            confidence,
            performance_estimate,
        }
    }

    /// Creates a rejected report.
    #[must_use]
    pub const fn rejected(confidence: f64, performance_estimate: f64) -> Self {
        Self {
            approved: false,
            confidence,
            performance_estimate,
        }
    }

    /// Returns true if approved with at least `min_confidence`.
    #[must_use]
    pub fn passes(&self, min_confidence: f64) -> bool {
        self.approved && self.confidence >= min_confidence
    }
}
