//! Production model history.

use rampart_core::types::{ModelRef, Timestamp};
use rampart_risk::RollbackTarget;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// A model that was put into production.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployedModel {
    /// Model reference
    pub model: ModelRef,
    /// Deployment generation, starting at 1
    pub generation: u64,
    /// Training run that produced it
    pub run_id: Uuid,
    /// Deployment time
    pub deployed_at: Timestamp,
    /// Validation confidence
    pub confidence: f64,
    /// Validation performance estimate
    pub performance_estimate: f64,
}

/// Bounded stack of production models, newest last.
///
/// The newest entry is the model in production. Rolling back pops it and
/// falls back to its predecessor; the oldest entry is never popped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRegistry {
    cap: usize,
    models: VecDeque<DeployedModel>,
}

impl ModelRegistry {
    /// Creates an empty registry keeping at most `cap` models.
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            models: VecDeque::new(),
        }
    }

    /// Returns the production model.
    #[must_use]
    pub fn current(&self) -> Option<&DeployedModel> {
        self.models.back()
    }

    /// Returns true if a previous model is available to roll back to.
    #[must_use]
    pub fn can_roll_back(&self) -> bool {
        self.models.len() > 1
    }

    /// Makes `model` the production model. Returns the evicted oldest entry.
    pub fn push(&mut self, model: DeployedModel) -> Option<DeployedModel> {
        let evicted = if self.models.len() >= self.cap {
            self.models.pop_front()
        } else {
            None
        };
        self.models.push_back(model);
        evicted
    }

    /// Applies a new cap, dropping the oldest entries if needed.
    pub fn set_cap(&mut self, cap: usize) {
        self.cap = cap.max(1);
        while self.models.len() > self.cap {
            self.models.pop_front();
        }
    }

    /// Returns the history, oldest first.
    #[must_use]
    pub fn models(&self) -> Vec<DeployedModel> {
        self.models.iter().cloned().collect()
    }

    /// Returns the number of retained models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Returns true if nothing has been deployed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl RollbackTarget for ModelRegistry {
    fn current_reference(&self) -> String {
        self.current()
            .map_or_else(|| "none".to_string(), |m| m.model.to_string())
    }

    fn restore_previous(&mut self) -> String {
        if self.can_roll_back() {
            self.models.pop_back();
        }
        self.current_reference()
    }
}
