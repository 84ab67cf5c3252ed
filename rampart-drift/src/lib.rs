//! # Rampart Drift
//!
//! Baselines and drift assessment.
//!
//! [`BaselineStore`] holds the last trusted fingerprint of each tracked
//! symbol. [`DriftMonitor`] compares fresh observations against it and
//! classifies the result as green, yellow or red.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

mod baseline;
mod config;
mod monitor;

pub use baseline::{BaselineStore, FeatureBaseline, FeatureMap};
pub use config::DriftConfig;
pub use monitor::{AlertCounts, DriftAssessment, DriftMonitor, classify};
