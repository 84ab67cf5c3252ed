//! Trainer error types.

use std::time::Duration;
use thiserror::Error;

use rampart_core::error::{ConfigError, StorageError};
use rampart_risk::RiskError;

/// Failure reported by, or imposed on, an external collaborator call.
///
/// These never escape a training cycle; they become a failed outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The collaborator returned an error.
    #[error("{operation} failed: {reason}")]
    Failed {
        /// Collaborator operation
        operation: String,
        /// Reported reason
        reason: String,
    },

    /// The call did not finish within its time budget.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Collaborator operation
        operation: String,
        /// Configured limit
        after: Duration,
    },

    /// The call panicked.
    #[error("{operation} panicked")]
    Panicked {
        /// Collaborator operation
        operation: String,
    },

    /// The collaborator answered with something unusable.
    #[error("{operation} returned an invalid response: {reason}")]
    InvalidResponse {
        /// Collaborator operation
        operation: String,
        /// What was wrong with it
        reason: String,
    },
}

impl CollaboratorError {
    /// Creates a [`CollaboratorError::Failed`].
    pub fn failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Creates a [`CollaboratorError::InvalidResponse`].
    pub fn invalid_response(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if retrying on the next tick may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Failed { .. })
    }

    /// Returns the collaborator operation that failed.
    #[must_use]
    pub fn operation(&self) -> &str {
        match self {
            Self::Failed { operation, .. }
            | Self::Timeout { operation, .. }
            | Self::Panicked { operation }
            | Self::InvalidResponse { operation, .. } => operation,
        }
    }
}

/// Errors building or restoring an [`OnlineTrainer`](crate::OnlineTrainer).
#[derive(Error, Debug)]
pub enum TrainerError {
    /// Invalid configuration.
    #[error("invalid trainer configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// Persisted trainer state could not be loaded.
    #[error("trainer state storage failed: {0}")]
    Storage(#[from] StorageError),

    /// The promotion gate refused a request.
    #[error(transparent)]
    Risk(#[from] RiskError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_transient() {
        let err = CollaboratorError::Timeout {
            operation: "train".to_string(),
            after: Duration::from_secs(30),
        };
        assert!(err.is_transient());
        assert_eq!(err.operation(), "train");
        assert!(err.to_string().contains("30s"));
    }

    #[test]
    fn test_panic_is_not_transient() {
        let err = CollaboratorError::Panicked {
            operation: "validate".to_string(),
        };
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "validate panicked");
    }

    #[test]
    fn test_config_error_converts() {
        let err: TrainerError = ConfigError::missing_field("symbols").into();
        assert!(matches!(err, TrainerError::InvalidConfig(_)));
    }
}
