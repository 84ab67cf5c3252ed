//! Rollback execution and audit trail.
//!
//! A [`RollbackTarget`] knows how to step back to its previous safe
//! configuration. [`RollbackController`] drives the restore, clears the
//! target's in-flight counters and appends a [`RollbackEvent`] to a bounded
//! history that is persisted when a store is attached.

use parking_lot::RwLock;
use rampart_core::clock::Clock;
use rampart_core::events::{RollbackEvent, RollbackSource};
use rampart_core::storage::{self, StateStore};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::RiskError;

const HISTORY_KEY: &str = "rollback_history";

/// Something that can be reverted to a previous safe configuration.
pub trait RollbackTarget {
    /// Reference to the configuration currently in effect.
    fn current_reference(&self) -> String;

    /// Reverts to the previous safe configuration and returns its reference.
    fn restore_previous(&mut self) -> String;

    /// Clears counters accumulated under the reverted configuration.
    fn reset_counters(&mut self) {}
}

/// Rollback controller configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackConfig {
    /// Maximum number of events retained; oldest are dropped first.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
}

fn default_history_cap() -> usize {
    100
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            history_cap: default_history_cap(),
        }
    }
}

/// Executes rollbacks and keeps their audit trail.
pub struct RollbackController {
    config: RollbackConfig,
    history: RwLock<VecDeque<RollbackEvent>>,
    clock: Arc<dyn Clock>,
    store: Option<Arc<dyn StateStore>>,
}

impl RollbackController {
    /// Creates a controller with an empty in-memory history.
    #[must_use]
    pub fn new(config: RollbackConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            history: RwLock::new(VecDeque::new()),
            clock,
            store: None,
        }
    }

    /// Creates a shared controller.
    #[must_use]
    pub fn new_shared(config: RollbackConfig, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self::new(config, clock))
    }

    /// Attaches a store, loading any previously persisted history.
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Result<Self, RiskError> {
        if let Some(saved) =
            storage::load_typed::<VecDeque<RollbackEvent>>(store.as_ref(), HISTORY_KEY)?
        {
            let mut history = saved;
            while history.len() > self.config.history_cap {
                history.pop_front();
            }
            *self.history.write() = history;
        }
        self.store = Some(store);
        Ok(self)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &RollbackConfig {
        &self.config
    }

    /// Reverts `target`, clears its counters and records the event.
    pub fn execute(
        &self,
        source: RollbackSource,
        target: &mut dyn RollbackTarget,
        reason: impl Into<String>,
    ) -> RollbackEvent {
        let prior = target.current_reference();
        let restored = target.restore_previous();
        target.reset_counters();
        self.record(source, reason, prior, restored)
    }

    /// Records a rollback performed elsewhere.
    pub fn record(
        &self,
        source: RollbackSource,
        reason: impl Into<String>,
        prior_ref: impl Into<String>,
        restored_ref: impl Into<String>,
    ) -> RollbackEvent {
        let event = RollbackEvent {
            id: Uuid::new_v4(),
            timestamp: self.clock.now(),
            source,
            reason: reason.into(),
            prior_ref: prior_ref.into(),
            restored_ref: restored_ref.into(),
        };

        error!(
            id = %event.id,
            source = %event.source,
            prior = %event.prior_ref,
            restored = %event.restored_ref,
            reason = %event.reason,
            "ROLLBACK EXECUTED"
        );

        let mut history = self.history.write();
        if history.len() >= self.config.history_cap {
            history.pop_front();
        }
        history.push_back(event.clone());

        if let Some(store) = &self.store
            && let Err(e) = storage::save_typed(store.as_ref(), HISTORY_KEY, &*history)
        {
            warn!(error = %e, "Failed to persist rollback history");
        }

        event
    }

    /// Returns the full retained history, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<RollbackEvent> {
        self.history.read().iter().cloned().collect()
    }

    /// Returns up to `limit` most recent events, oldest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<RollbackEvent> {
        let history = self.history.read();
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    /// Returns the number of retained events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.history.read().len()
    }

    /// Returns true if no rollback has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.history.read().is_empty()
    }
}

impl fmt::Debug for RollbackController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RollbackController")
            .field("config", &self.config)
            .field("events", &self.len())
            .field("persistent", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rampart_core::clock::ManualClock;
    use rampart_core::storage::MemoryStateStore;
    use rampart_core::types::Timestamp;

    #[derive(Default)]
    struct Versions {
        current: u32,
        counter: u32,
    }

    impl RollbackTarget for Versions {
        fn current_reference(&self) -> String {
            format!("v{}", self.current)
        }

        fn restore_previous(&mut self) -> String {
            self.current = self.current.saturating_sub(1);
            self.current_reference()
        }

        fn reset_counters(&mut self) {
            self.counter = 0;
        }
    }

    fn controller(cap: usize) -> RollbackController {
        RollbackController::new(
            RollbackConfig { history_cap: cap },
            ManualClock::new_shared(Timestamp::new_unchecked(42)),
        )
    }

    #[test]
    fn test_execute_restores_and_resets() {
        let controller = controller(10);
        let mut target = Versions {
            current: 3,
            counter: 7,
        };

        let event = controller.execute(RollbackSource::Operator, &mut target, "manual");

        assert_eq!(target.current, 2);
        assert_eq!(target.counter, 0);
        assert_eq!(event.prior_ref, "v3");
        assert_eq!(event.restored_ref, "v2");
        assert_eq!(event.timestamp.as_millis(), 42);
        assert_eq!(controller.history(), vec![event]);
    }

    #[test]
    fn test_history_is_bounded_ring() {
        let controller = controller(3);
        for i in 0..5 {
            controller.record(RollbackSource::Drift, format!("r{i}"), "a", "b");
        }
        let reasons: Vec<_> = controller.history().into_iter().map(|e| e.reason).collect();
        assert_eq!(reasons, vec!["r2", "r3", "r4"]);
        assert_eq!(controller.recent(1)[0].reason, "r4");
        assert_eq!(controller.recent(10).len(), 3);
    }

    #[test]
    fn test_history_survives_restart() {
        let store: Arc<dyn StateStore> = MemoryStateStore::new_shared();
        let first = controller(10).with_store(Arc::clone(&store)).unwrap();
        first.record(RollbackSource::PromotionGate, "5 consecutive losses", "step:1", "step:0");

        let second = controller(10).with_store(store).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second.history()[0].source, RollbackSource::PromotionGate);
    }
}
