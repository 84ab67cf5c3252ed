//! External collaborator contracts.
//!
//! Feature generation, data storage, model fitting and model validation live
//! outside the envelope. The trainer only sees these traits; every call is
//! bounded by a timeout and isolated from panics.

use async_trait::async_trait;
use rampart_core::types::{ModelRef, Symbol, Timestamp, ValidationReport};
use rampart_drift::FeatureMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::CollaboratorError;

/// One labeled (features, action, outcome) sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    /// Instrument the sample was taken from
    pub symbol: Symbol,
    /// Observation time
    pub timestamp: Timestamp,
    /// Feature vector at decision time
    pub features: FeatureMap,
    /// Action taken, opaque to the envelope
    pub action: String,
    /// Realized outcome of the action
    pub outcome: f64,
}

/// Context handed to the training routine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingParams {
    /// Training run id, for log correlation
    pub run_id: Uuid,
    /// Generation the candidate would receive if deployed
    pub generation: u64,
    /// Current production model, if any
    pub base_model: Option<ModelRef>,
}

/// Current feature statistics and realized performance per symbol.
#[async_trait]
pub trait FeatureSource: Send + Sync {
    /// Returns the current scalar feature values for `symbol`.
    async fn features(&self, symbol: &Symbol) -> Result<FeatureMap, CollaboratorError>;

    /// Returns the current value of the performance metric for `symbol`.
    async fn performance(&self, symbol: &Symbol) -> Result<f64, CollaboratorError>;
}

/// Recent labeled samples.
#[async_trait]
pub trait TrainingDataSource: Send + Sync {
    /// Returns samples for `symbols` observed at or after `since`, oldest first.
    async fn collect_recent(
        &self,
        symbols: &[Symbol],
        since: Timestamp,
    ) -> Result<Vec<LabeledSample>, CollaboratorError>;
}

/// Produces a candidate model from samples.
#[async_trait]
pub trait ModelTrainer: Send + Sync {
    /// Trains a candidate and returns its reference.
    async fn train(
        &self,
        samples: &[LabeledSample],
        params: &TrainingParams,
    ) -> Result<ModelRef, CollaboratorError>;
}

/// Judges a candidate model.
#[async_trait]
pub trait ModelValidator: Send + Sync {
    /// Validates `candidate`, typically through a shadow or out-of-sample run.
    async fn validate(&self, candidate: &ModelRef) -> Result<ValidationReport, CollaboratorError>;
}

/// The four collaborators a trainer needs.
#[derive(Clone)]
pub struct Collaborators {
    /// Feature statistics
    pub features: Arc<dyn FeatureSource>,
    /// Training samples
    pub data: Arc<dyn TrainingDataSource>,
    /// Training routine
    pub trainer: Arc<dyn ModelTrainer>,
    /// Validation routine
    pub validator: Arc<dyn ModelValidator>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
