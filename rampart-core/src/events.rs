//! Typed event notifications.
//!
//! Components publish [`RampartEvent`]s to an [`EventBus`]. Listeners either
//! register a callback (removed again with [`EventBus::unsubscribe`]) or take
//! a broadcast receiver from [`EventBus::subscribe_channel`].
//!
//! Components publish only after releasing their own locks, so callbacks may
//! read component status without deadlocking. Callbacks must not call back
//! into mutating entry points of the component that emitted the event.

use crate::types::{AlertLevel, ModelRef, Symbol, Timestamp};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

/// Origin of a rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackSource {
    /// Critical drift detected by the retraining scheduler
    Drift,
    /// Automatic promotion gate trigger
    PromotionGate,
    /// Manual operator action
    Operator,
}

impl fmt::Display for RollbackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drift => write!(f, "drift"),
            Self::PromotionGate => write!(f, "promotion_gate"),
            Self::Operator => write!(f, "operator"),
        }
    }
}

/// Audit record of a reversal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackEvent {
    /// Unique identifier
    pub id: Uuid,
    /// When the rollback happened
    pub timestamp: Timestamp,
    /// What initiated it
    pub source: RollbackSource,
    /// Human-readable reason
    pub reason: String,
    /// Configuration or model in effect before the rollback
    pub prior_ref: String,
    /// Configuration or model in effect after the rollback
    pub restored_ref: String,
}

/// Notification published by envelope components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RampartEvent {
    /// Promotion gate accepted a validation result and went live at step 0.
    PromotionInitialized {
        /// Event time
        timestamp: Timestamp,
        /// Validator confidence that was accepted
        confidence: f64,
    },
    /// Promotion gate moved up one rung.
    StepAdvanced {
        /// Event time
        timestamp: Timestamp,
        /// Step before the advance
        from_step: usize,
        /// Step after the advance
        to_step: usize,
        /// Notional fraction now in effect
        notional: Decimal,
        /// Whether criteria were bypassed by an operator
        admin_override: bool,
    },
    /// A rollback was executed.
    Rollback(RollbackEvent),
    /// Promotion gate fell back to shadow mode.
    ShadowModeEntered {
        /// Event time
        timestamp: Timestamp,
        /// Why live trading ended
        reason: String,
    },
    /// Operator stopped live trading.
    LiveTradingStopped {
        /// Event time
        timestamp: Timestamp,
    },
    /// A symbol crossed the warning or rollback drift threshold.
    DriftAlert {
        /// Event time
        timestamp: Timestamp,
        /// Affected symbol
        symbol: Symbol,
        /// Assessed level
        level: AlertLevel,
        /// Larger of the feature and performance drift scores
        score: f64,
    },
    /// A retraining cycle finished.
    TrainingCompleted {
        /// Event time
        timestamp: Timestamp,
        /// Run identifier
        run_id: Uuid,
        /// Outcome label
        outcome: String,
    },
    /// A validated model entered production.
    ModelDeployed {
        /// Event time
        timestamp: Timestamp,
        /// Deployed model
        model: ModelRef,
        /// Deployment generation counter
        generation: u64,
    },
}

impl RampartEvent {
    /// Returns the event type name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PromotionInitialized { .. } => "promotion_initialized",
            Self::StepAdvanced { .. } => "step_advanced",
            Self::Rollback(_) => "rollback",
            Self::ShadowModeEntered { .. } => "shadow_mode_entered",
            Self::LiveTradingStopped { .. } => "live_trading_stopped",
            Self::DriftAlert { .. } => "drift_alert",
            Self::TrainingCompleted { .. } => "training_completed",
            Self::ModelDeployed { .. } => "model_deployed",
        }
    }

    /// Returns true for events that pull capital out of live exposure.
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::Rollback(_) | Self::ShadowModeEntered { .. } | Self::LiveTradingStopped { .. }
        ) || matches!(
            self,
            Self::DriftAlert {
                level: AlertLevel::Red,
                ..
            }
        )
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type Callback = Arc<dyn Fn(&RampartEvent) + Send + Sync>;

/// Fan-out of [`RampartEvent`]s to callbacks and broadcast receivers.
pub struct EventBus {
    callbacks: RwLock<Vec<(SubscriptionId, Callback)>>,
    sender: broadcast::Sender<RampartEvent>,
    next_id: AtomicU64,
    published: AtomicU64,
}

impl EventBus {
    /// Default broadcast channel capacity.
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Creates a bus with the default channel capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Creates a bus whose broadcast channel holds `capacity` events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            callbacks: RwLock::new(Vec::new()),
            sender,
            next_id: AtomicU64::new(1),
            published: AtomicU64::new(0),
        }
    }

    /// Creates a shared bus.
    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Registers a callback invoked synchronously for every event.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&RampartEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks.write().push((id, Arc::new(callback)));
        debug!(subscription = %id, "Event callback registered");
        id
    }

    /// Removes a callback. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.write();
        let before = callbacks.len();
        callbacks.retain(|(sub, _)| *sub != id);
        before != callbacks.len()
    }

    /// Returns a broadcast receiver for asynchronous consumers.
    #[must_use]
    pub fn subscribe_channel(&self) -> broadcast::Receiver<RampartEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of registered callbacks.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.callbacks.read().len()
    }

    /// Returns the total number of events published.
    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Delivers an event to every callback and channel receiver.
    ///
    /// A panicking callback is logged and skipped.
    pub fn publish(&self, event: RampartEvent) {
        let callbacks: Vec<Callback> = self
            .callbacks
            .read()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
                warn!(event = event.kind(), "Event callback panicked");
            }
        }

        self.published.fetch_add(1, Ordering::Relaxed);
        // No receivers is not an error.
        let _ = self.sender.send(event);
    }

    /// Publishes events in order.
    pub fn publish_all(&self, events: impl IntoIterator<Item = RampartEvent>) {
        for event in events {
            self.publish(event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("published", &self.events_published())
            .finish_non_exhaustive()
    }
}
