//! Training run lifecycle and status snapshots.

use rampart_core::events::RollbackEvent;
use rampart_core::types::{ModelRef, Symbol, Timestamp};
use rampart_drift::{AlertCounts, DriftAssessment, FeatureBaseline};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use uuid::Uuid;

use crate::registry::{DeployedModel, ModelRegistry};

/// What started a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    /// Interval timer
    Scheduled,
    /// Manual request
    Forced,
}

impl RunTrigger {
    /// Returns the trigger label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Forced => "forced",
        }
    }
}

impl fmt::Display for RunTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a cycle ended. None of these are errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TrainingOutcome {
    /// Not enough recent samples.
    InsufficientData {
        /// Samples collected
        samples: usize,
        /// Minimum required
        required: usize,
    },
    /// The candidate was not approved; production is unchanged.
    ValidationRejected {
        /// Rejected candidate
        candidate: ModelRef,
        /// Validator confidence
        confidence: f64,
        /// Validator performance estimate
        performance_estimate: f64,
        /// Why it was rejected
        reason: String,
    },
    /// The candidate entered production.
    Deployed {
        /// Deployed model
        model: ModelRef,
        /// Its generation
        generation: u64,
        /// Whether the promotion gate went live
        promotion_started: bool,
    },
    /// A collaborator failed, timed out or panicked.
    Failed {
        /// Failure description
        error: String,
    },
    /// Critical drift; retraining skipped and rollback performed.
    DriftRollback {
        /// Symbols at red
        symbols: Vec<Symbol>,
    },
}

impl TrainingOutcome {
    /// Returns the outcome label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientData { .. } => "insufficient_data",
            Self::ValidationRejected { .. } => "validation_rejected",
            Self::Deployed { .. } => "deployed",
            Self::Failed { .. } => "failed",
            Self::DriftRollback { .. } => "drift_rollback",
        }
    }

    /// Returns true if a new model entered production.
    #[must_use]
    pub const fn is_deployed(&self) -> bool {
        matches!(self, Self::Deployed { .. })
    }
}

/// Lifecycle of one retraining attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRunState {
    /// Run identifier
    pub run_id: Uuid,
    /// What started it
    pub trigger: RunTrigger,
    /// Start time
    pub started_at: Timestamp,
    /// End time, once finished
    pub finished_at: Option<Timestamp>,
    /// Samples handed to the training routine
    pub batch_size: usize,
    /// Outcome, once finished
    pub outcome: Option<TrainingOutcome>,
    /// Candidate produced, if training got that far
    pub model: Option<ModelRef>,
}

impl TrainingRunState {
    pub(crate) fn new(trigger: RunTrigger, started_at: Timestamp) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            trigger,
            started_at,
            finished_at: None,
            batch_size: 0,
            outcome: None,
            model: None,
        }
    }

    /// Returns the run duration in milliseconds, once finished.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| end.as_millis() - self.started_at.as_millis())
    }
}

/// Result of asking the trainer to run a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleResult {
    /// The cycle ran to an outcome.
    Completed(TrainingRunState),
    /// Another cycle held the single-flight guard; nothing was done.
    AlreadyRunning,
}

impl CycleResult {
    /// Returns the outcome of a completed cycle.
    #[must_use]
    pub fn outcome(&self) -> Option<&TrainingOutcome> {
        match self {
            Self::Completed(run) => run.outcome.as_ref(),
            Self::AlreadyRunning => None,
        }
    }
}

/// Persisted trainer state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TrainerSnapshot {
    pub generation: u64,
    pub last_training_time: Option<Timestamp>,
    pub registry: ModelRegistry,
    pub runs: VecDeque<TrainingRunState>,
    #[serde(default)]
    pub baselines: Vec<FeatureBaseline>,
}

/// Trainer status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerStatus {
    /// Whether a cycle is in progress
    pub is_training: bool,
    /// Time of the last deployment
    pub last_training_time: Option<Timestamp>,
    /// Deployments so far
    pub generation: u64,
    /// Production model
    pub current_model: Option<DeployedModel>,
    /// Retained production models, oldest first
    pub production_history: Vec<DeployedModel>,
    /// Recent runs, oldest first
    pub recent_runs: Vec<TrainingRunState>,
}

/// Drift status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftStatus {
    /// Recent assessments, oldest first
    pub recent: Vec<DriftAssessment>,
    /// Assessments per alert level
    pub counts: AlertCounts,
    /// Recent rollbacks, oldest first
    pub rollbacks: Vec<RollbackEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serializes_tagged() {
        let outcome = TrainingOutcome::InsufficientData {
            samples: 12,
            required: 100,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "insufficient_data");
        assert_eq!(json["required"], 100);
        assert_eq!(outcome.as_str(), "insufficient_data");
        assert!(!outcome.is_deployed());
    }

    #[test]
    fn test_run_duration() {
        let mut run = TrainingRunState::new(RunTrigger::Forced, Timestamp::new_unchecked(1_000));
        assert_eq!(run.duration_ms(), None);
        run.finished_at = Some(Timestamp::new_unchecked(4_500));
        assert_eq!(run.duration_ms(), Some(3_500));
    }
}
