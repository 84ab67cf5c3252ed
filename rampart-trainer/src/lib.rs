//! # Rampart Trainer
//!
//! Periodic retraining wrapped in drift checks and staged deployment.
//!
//! [`OnlineTrainer`] runs on a fixed interval. It scores every tracked symbol
//! with the drift monitor and, unless one is critical, collects recent
//! samples, trains and validates a candidate through the
//! [collaborator traits](collaborators), and deploys approved candidates at
//! the bottom of the promotion gate's capital ramp. Critical drift instead
//! rolls back both the production model ([`ModelRegistry`]) and the gate.
//!
//! Cycles are single-flight: an invocation while another runs is skipped.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod collaborators;
pub mod config;
pub mod error;
mod registry;
mod state;
mod trainer;

pub use collaborators::{
    Collaborators, FeatureSource, LabeledSample, ModelTrainer, ModelValidator, TrainingDataSource,
    TrainingParams,
};
pub use config::{DeploymentStart, TrainerConfig};
pub use error::{CollaboratorError, TrainerError};
pub use registry::{DeployedModel, ModelRegistry};
pub use state::{
    CycleResult, DriftStatus, RunTrigger, TrainerStatus, TrainingOutcome, TrainingRunState,
};
pub use trainer::{OnlineTrainer, relative_improvement};
