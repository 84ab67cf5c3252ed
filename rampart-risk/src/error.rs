//! Risk module error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use rampart_core::error::{ConfigError, StorageError};

/// Errors returned by the promotion gate and rollback controller.
///
/// Every variant except `InvalidConfig` and `Storage` is an invalid call: the
/// request was refused and no state changed.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskError {
    /// The operation requires live trading.
    #[error("{operation} rejected: strategy is not live")]
    NotLive {
        /// The refused operation.
        operation: String,
    },

    /// A validation result was not good enough to go live.
    #[error("promotion rejected: {reason}")]
    PromotionRejected {
        /// Why it was rejected.
        reason: String,
    },

    /// Already at the top of the ramp.
    #[error("already at max step {step}")]
    AtMaxStep {
        /// The current (final) step.
        step: usize,
    },

    /// Advancement requested without override while criteria are unmet.
    #[error("advancement criteria not met at step {step}: {}", unmet.join("; "))]
    AdvancementCriteriaNotMet {
        /// The current step.
        step: usize,
        /// Human-readable unmet criteria.
        unmet: Vec<String>,
    },

    /// A fill could not be recorded.
    #[error("invalid trade: {reason}")]
    InvalidTrade {
        /// Why the fill was refused.
        reason: String,
    },

    /// Invalid configuration.
    #[error("invalid risk configuration: {reason}")]
    InvalidConfig {
        /// Reason the configuration is invalid.
        reason: String,
    },

    /// Persisted state could not be loaded.
    #[error("risk state storage failed: {reason}")]
    Storage {
        /// Underlying storage failure.
        reason: String,
    },
}

impl RiskError {
    /// Returns true if the caller issued a call that is invalid in the current state.
    #[must_use]
    pub const fn is_invalid_call(&self) -> bool {
        matches!(
            self,
            Self::NotLive { .. }
                | Self::PromotionRejected { .. }
                | Self::AtMaxStep { .. }
                | Self::AdvancementCriteriaNotMet { .. }
                | Self::InvalidTrade { .. }
        )
    }

    pub(crate) fn not_live(operation: &str) -> Self {
        Self::NotLive {
            operation: operation.to_string(),
        }
    }
}

impl From<ConfigError> for RiskError {
    fn from(e: ConfigError) -> Self {
        Self::InvalidConfig {
            reason: e.to_string(),
        }
    }
}

impl From<StorageError> for RiskError {
    fn from(e: StorageError) -> Self {
        Self::Storage {
            reason: e.to_string(),
        }
    }
}
