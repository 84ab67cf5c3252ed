//! Drift-aware retraining scheduler.
//!
//! Each cycle:
//!
//! 1. Assesses drift for every tracked symbol. Any red symbol skips
//!    retraining: the production model and the promotion gate are rolled back
//!    and baselines are reset from the current observations.
//! 2. Collects a bounded window of recent samples.
//! 3. Trains a candidate.
//! 4. Validates it.
//! 5. Deploys it and hands capital allocation to the promotion gate.
//!
//! Steps 2 to 4 run outside any lock. Collaborator calls are bounded by
//! timeouts and isolated from panics; failures end the cycle as
//! [`TrainingOutcome::Failed`].

use futures::FutureExt;
use futures::future::try_join_all;
use parking_lot::Mutex;
use rampart_core::clock::Clock;
use rampart_core::config::Validatable;
use rampart_core::events::{EventBus, RampartEvent, RollbackSource};
use rampart_core::storage::{self, StateStore};
use rampart_core::types::{AlertLevel, ModelRef, Symbol, Timestamp, ValidationReport};
use rampart_drift::{DriftAssessment, DriftMonitor, FeatureBaseline, FeatureMap};
use rampart_risk::{PromotionGate, RollbackController};
use rampart_telemetry::spans::{drift_span, training_run_span};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{Instrument, debug, error, info, warn};

use crate::collaborators::{Collaborators, TrainingParams};
use crate::config::{DeploymentStart, TrainerConfig};
use crate::error::{CollaboratorError, TrainerError};
use crate::registry::{DeployedModel, ModelRegistry};
use crate::state::{
    CycleResult, DriftStatus, RunTrigger, TrainerSnapshot, TrainerStatus, TrainingOutcome,
    TrainingRunState,
};

const STORE_KEY: &str = "trainer";
const STATUS_LIMIT: usize = 50;

/// Relative improvement of `candidate` over `production`:
/// `(candidate - production) / max(|production|, 0.1)`.
#[must_use]
pub fn relative_improvement(candidate: f64, production: f64) -> f64 {
    (candidate - production) / production.abs().max(0.1)
}

struct TrainerState {
    is_training: bool,
    last_training_time: Option<Timestamp>,
    generation: u64,
    registry: ModelRegistry,
    runs: VecDeque<TrainingRunState>,
}

/// Releases the single-flight flag on drop, including on panic or cancellation.
struct TrainingGuard<'a> {
    state: &'a Mutex<TrainerState>,
}

impl Drop for TrainingGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().is_training = false;
    }
}

struct Observation {
    symbol: Symbol,
    features: FeatureMap,
    performance: f64,
}

async fn bounded<T, F>(operation: &str, limit: Duration, call: F) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    match tokio::time::timeout(limit, AssertUnwindSafe(call).catch_unwind()).await {
        Err(_) => Err(CollaboratorError::Timeout {
            operation: operation.to_string(),
            after: limit,
        }),
        Ok(Err(_)) => Err(CollaboratorError::Panicked {
            operation: operation.to_string(),
        }),
        Ok(Ok(result)) => result,
    }
}

fn failed(error: &CollaboratorError) -> TrainingOutcome {
    TrainingOutcome::Failed {
        error: error.to_string(),
    }
}

/// Periodic retraining with drift rollback and staged deployment.
///
/// The promotion gate is only called once the trainer state is released, so
/// event bus callbacks may query the trainer.
pub struct OnlineTrainer {
    config: TrainerConfig,
    drift: Arc<DriftMonitor>,
    gate: Arc<PromotionGate>,
    rollback: Arc<RollbackController>,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    collaborators: Collaborators,
    state: Mutex<TrainerState>,
    store: Option<Arc<dyn StateStore>>,
}

impl OnlineTrainer {
    /// Creates a trainer, validating `config`.
    ///
    /// Rollbacks are recorded through the gate's rollback controller.
    pub fn new(
        config: TrainerConfig,
        drift: Arc<DriftMonitor>,
        gate: Arc<PromotionGate>,
        events: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        collaborators: Collaborators,
    ) -> Result<Self, TrainerError> {
        config.validate()?;
        let rollback = Arc::clone(gate.rollback_controller());
        let state = TrainerState {
            is_training: false,
            last_training_time: None,
            generation: 0,
            registry: ModelRegistry::new(config.production_history_cap),
            runs: VecDeque::new(),
        };
        Ok(Self {
            config,
            drift,
            gate,
            rollback,
            events,
            clock,
            collaborators,
            state: Mutex::new(state),
            store: None,
        })
    }

    /// Attaches a store, restoring counters, production history, recent runs
    /// and baselines.
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Result<Self, TrainerError> {
        if let Some(saved) = storage::load_typed::<TrainerSnapshot>(store.as_ref(), STORE_KEY)? {
            let state = self.state.get_mut();
            state.generation = saved.generation;
            state.last_training_time = saved.last_training_time;
            state.registry = saved.registry;
            state.registry.set_cap(self.config.production_history_cap);
            state.runs = saved.runs;
            while state.runs.len() > self.config.run_history_cap {
                state.runs.pop_front();
            }
            if !saved.baselines.is_empty() {
                self.drift.baselines().restore(saved.baselines);
            }
            info!(
                generation = state.generation,
                models = state.registry.len(),
                runs = state.runs.len(),
                "Trainer state restored"
            );
        }
        self.store = Some(store);
        Ok(self)
    }

    fn persist(&self, state: &TrainerState) {
        let Some(store) = &self.store else {
            return;
        };
        let snapshot = TrainerSnapshot {
            generation: state.generation,
            last_training_time: state.last_training_time,
            registry: state.registry.clone(),
            runs: state.runs.clone(),
            baselines: self.drift.baselines().snapshot(),
        };
        if let Err(e) = storage::save_typed(store.as_ref(), STORE_KEY, &snapshot) {
            error!(error = %e, "Failed to persist trainer state");
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Returns the promotion gate deployments are handed to.
    #[must_use]
    pub fn gate(&self) -> &Arc<PromotionGate> {
        &self.gate
    }

    /// Returns the drift monitor.
    #[must_use]
    pub fn drift_monitor(&self) -> &Arc<DriftMonitor> {
        &self.drift
    }

    /// Returns true while a cycle holds the single-flight guard.
    #[must_use]
    pub fn is_training(&self) -> bool {
        self.state.lock().is_training
    }

    /// Returns the time of the last deployment.
    #[must_use]
    pub fn last_training_time(&self) -> Option<Timestamp> {
        self.state.lock().last_training_time
    }

    fn try_begin(&self) -> Option<TrainingGuard<'_>> {
        let mut state = self.state.lock();
        if state.is_training {
            return None;
        }
        state.is_training = true;
        Some(TrainingGuard { state: &self.state })
    }

    /// Runs one scheduled cycle unless one is already in progress.
    pub async fn run_micro_batch_training(&self) -> CycleResult {
        self.run_cycle(RunTrigger::Scheduled).await
    }

    /// Runs one cycle on demand, still single-flight.
    pub async fn force_trigger_training(&self) -> CycleResult {
        info!("Manual training requested");
        self.run_cycle(RunTrigger::Forced).await
    }

    async fn run_cycle(&self, trigger: RunTrigger) -> CycleResult {
        let Some(_guard) = self.try_begin() else {
            debug!(trigger = %trigger, "Training cycle already in progress; skipped");
            return CycleResult::AlreadyRunning;
        };

        let mut run = TrainingRunState::new(trigger, self.clock.now());
        let span = training_run_span(&run.run_id.to_string(), trigger.as_str());
        let mut events = Vec::new();
        let outcome = self.cycle(&mut run, &mut events).instrument(span).await;

        match &outcome {
            TrainingOutcome::Failed { error } => {
                error!(run_id = %run.run_id, error = %error, "Training cycle failed");
            }
            other => info!(
                run_id = %run.run_id,
                outcome = other.as_str(),
                batch_size = run.batch_size,
                "Training cycle finished"
            ),
        }

        let finished_at = self.clock.now();
        run.finished_at = Some(finished_at);
        events.push(RampartEvent::TrainingCompleted {
            timestamp: finished_at,
            run_id: run.run_id,
            outcome: outcome.as_str().to_string(),
        });
        run.outcome = Some(outcome);

        {
            let mut state = self.state.lock();
            if state.runs.len() >= self.config.run_history_cap {
                state.runs.pop_front();
            }
            state.runs.push_back(run.clone());
            self.persist(&state);
        }

        self.events.publish_all(events);
        CycleResult::Completed(run)
    }

    async fn cycle(
        &self,
        run: &mut TrainingRunState,
        events: &mut Vec<RampartEvent>,
    ) -> TrainingOutcome {
        let observations = match self.observe_all().await {
            Ok(observations) => observations,
            Err(e) => return failed(&e),
        };

        let critical: Vec<Symbol> = self
            .assess(&observations, events)
            .into_iter()
            .filter(|a| a.rollback_recommended)
            .map(|a| a.symbol)
            .collect();
        if !critical.is_empty() {
            self.drift_rollback(&critical, observations, events);
            return TrainingOutcome::DriftRollback { symbols: critical };
        }

        let since = run.started_at.saturating_sub(self.config.data_window);
        let mut samples = match bounded(
            "collect_recent",
            self.config.collection_timeout,
            self.collaborators
                .data
                .collect_recent(&self.config.symbols, since),
        )
        .await
        {
            Ok(samples) => samples,
            Err(e) => return failed(&e),
        };

        if samples.len() > self.config.max_batch_size {
            let excess = samples.len() - self.config.max_batch_size;
            samples.drain(..excess);
        }
        run.batch_size = samples.len();
        if samples.len() < self.config.min_batch_size {
            info!(
                samples = samples.len(),
                required = self.config.min_batch_size,
                "Insufficient data for retraining"
            );
            return TrainingOutcome::InsufficientData {
                samples: samples.len(),
                required: self.config.min_batch_size,
            };
        }

        let params = {
            let state = self.state.lock();
            TrainingParams {
                run_id: run.run_id,
                generation: state.generation + 1,
                base_model: state.registry.current().map(|m| m.model.clone()),
            }
        };
        let candidate = match bounded(
            "train",
            self.config.training_timeout,
            self.collaborators.trainer.train(&samples, &params),
        )
        .await
        {
            Ok(candidate) => candidate,
            Err(e) => return failed(&e),
        };
        run.model = Some(candidate.clone());
        info!(candidate = %candidate, batch_size = run.batch_size, "Candidate trained");

        let report = match bounded(
            "validate",
            self.config.validation_timeout,
            self.collaborators.validator.validate(&candidate),
        )
        .await
        {
            Ok(report) => report,
            Err(e) => return failed(&e),
        };

        if !report.approved {
            info!(
                candidate = %candidate,
                confidence = report.confidence,
                performance_estimate = report.performance_estimate,
                "Candidate rejected by validation"
            );
            return TrainingOutcome::ValidationRejected {
                candidate,
                confidence: report.confidence,
                performance_estimate: report.performance_estimate,
                reason: "validator did not approve".to_string(),
            };
        }

        self.commit(run, candidate, report, events)
    }

    async fn observe(&self, symbol: &Symbol) -> Result<Observation, CollaboratorError> {
        let source = &self.collaborators.features;
        let limit = self.config.feature_timeout;
        let (features, performance) = futures::try_join!(
            bounded("features", limit, source.features(symbol)),
            bounded("performance", limit, source.performance(symbol)),
        )?;
        Ok(Observation {
            symbol: symbol.clone(),
            features,
            performance,
        })
    }

    async fn observe_all(&self) -> Result<Vec<Observation>, CollaboratorError> {
        try_join_all(self.config.symbols.iter().map(|symbol| self.observe(symbol))).await
    }

    fn assess(
        &self,
        observations: &[Observation],
        events: &mut Vec<RampartEvent>,
    ) -> Vec<DriftAssessment> {
        observations
            .iter()
            .map(|obs| {
                let _span = drift_span(obs.symbol.as_str()).entered();
                let assessment = self
                    .drift
                    .assess(&obs.symbol, &obs.features, obs.performance);

                match assessment.alert_level {
                    AlertLevel::Green => {}
                    AlertLevel::Yellow => warn!(
                        symbol = %obs.symbol,
                        score = assessment.max_score(),
                        "Drift warning"
                    ),
                    AlertLevel::Red => error!(
                        symbol = %obs.symbol,
                        score = assessment.max_score(),
                        "Critical drift"
                    ),
                }
                if assessment.alert_level != AlertLevel::Green {
                    events.push(RampartEvent::DriftAlert {
                        timestamp: assessment.timestamp,
                        symbol: obs.symbol.clone(),
                        level: assessment.alert_level,
                        score: assessment.max_score(),
                    });
                }
                assessment
            })
            .collect()
    }

    fn drift_rollback(
        &self,
        critical: &[Symbol],
        observations: Vec<Observation>,
        events: &mut Vec<RampartEvent>,
    ) {
        let symbols = critical
            .iter()
            .map(Symbol::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let reason = format!("critical drift in {symbols}");
        error!(symbols = %symbols, "Retraining skipped; rolling back");

        let now = self.clock.now();
        let mut state = self.state.lock();
        if state.registry.can_roll_back() {
            let event = self
                .rollback
                .execute(RollbackSource::Drift, &mut state.registry, reason.clone());
            events.push(RampartEvent::Rollback(event));
        }
        self.drift.baselines().replace_all(
            observations
                .into_iter()
                .map(|o| FeatureBaseline::new(o.symbol, o.features, o.performance, now)),
        );
        self.persist(&state);
        drop(state);

        self.gate.rollback(RollbackSource::Drift, reason);
    }

    fn commit(
        &self,
        run: &TrainingRunState,
        candidate: ModelRef,
        report: ValidationReport,
        events: &mut Vec<RampartEvent>,
    ) -> TrainingOutcome {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if self.config.require_improvement
            && let Some(current) = state.registry.current()
        {
            let improvement =
                relative_improvement(report.performance_estimate, current.performance_estimate);
            if improvement.is_nan() || improvement <= self.config.min_improvement {
                info!(
                    candidate = %candidate,
                    production = %current.model,
                    improvement,
                    "Candidate does not improve on production"
                );
                return TrainingOutcome::ValidationRejected {
                    reason: format!(
                        "improvement {improvement:.4} over {} does not exceed {:.4}",
                        current.model, self.config.min_improvement
                    ),
                    candidate,
                    confidence: report.confidence,
                    performance_estimate: report.performance_estimate,
                };
            }
        }

        state.generation += 1;
        let generation = state.generation;
        state.registry.push(DeployedModel {
            model: candidate.clone(),
            generation,
            run_id: run.run_id,
            deployed_at: now,
            confidence: report.confidence,
            performance_estimate: report.performance_estimate,
        });
        state.last_training_time = Some(now);
        self.persist(&state);
        drop(state);

        let promotion_started = match self.config.deployment_start {
            DeploymentStart::LowestStep => match self.gate.initialize_promotion(&report) {
                Ok(()) => true,
                Err(e) => {
                    warn!(model = %candidate, error = %e, "Promotion not started");
                    self.gate
                        .enter_shadow_mode(format!("model {candidate} not cleared for live"));
                    false
                }
            },
            DeploymentStart::Shadow => {
                self.gate
                    .enter_shadow_mode(format!("model {candidate} deployed in shadow"));
                false
            }
        };

        info!(
            model = %candidate,
            generation,
            confidence = report.confidence,
            promotion_started,
            "Model deployed"
        );
        events.push(RampartEvent::ModelDeployed {
            timestamp: now,
            model: candidate.clone(),
            generation,
        });
        TrainingOutcome::Deployed {
            model: candidate,
            generation,
            promotion_started,
        }
    }

    /// Installs baselines for every symbol from current observations.
    ///
    /// All symbols are fetched before anything is installed, so a failure
    /// leaves the existing baselines untouched.
    pub async fn warm_up(&self) -> Result<usize, CollaboratorError> {
        self.install_baselines("warm-up").await
    }

    /// Replaces every baseline with current observations.
    pub async fn reset_baselines(&self) -> Result<usize, CollaboratorError> {
        self.install_baselines("reset").await
    }

    async fn install_baselines(&self, reason: &str) -> Result<usize, CollaboratorError> {
        let observations = self.observe_all().await?;
        let now = self.clock.now();
        let count = observations.len();
        self.drift.baselines().replace_all(
            observations
                .into_iter()
                .map(|o| FeatureBaseline::new(o.symbol, o.features, o.performance, now)),
        );
        {
            let state = self.state.lock();
            self.persist(&state);
        }
        info!(symbols = count, reason, "Baselines installed");
        Ok(count)
    }

    /// Returns recent assessments, per-level counts and recent rollbacks.
    #[must_use]
    pub fn drift_status(&self) -> DriftStatus {
        DriftStatus {
            recent: self.drift.recent(STATUS_LIMIT),
            counts: self.drift.alert_counts(),
            rollbacks: self.rollback.recent(STATUS_LIMIT),
        }
    }

    /// Returns the trainer status.
    #[must_use]
    pub fn trainer_status(&self) -> TrainerStatus {
        let state = self.state.lock();
        TrainerStatus {
            is_training: state.is_training,
            last_training_time: state.last_training_time,
            generation: state.generation,
            current_model: state.registry.current().cloned(),
            production_history: state.registry.models(),
            recent_runs: state.runs.iter().cloned().collect(),
        }
    }

    /// Runs cycles every `interval` until `shutdown` fires.
    ///
    /// The timer is re-armed after each cycle completes, so cycles never
    /// overlap and a slow cycle delays the next one.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval = ?self.config.interval,
            symbols = self.config.symbols.len(),
            "Online trainer started"
        );
        if self.config.run_on_start {
            self.run_micro_batch_training().await;
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                () = tokio::time::sleep(self.config.interval) => {
                    self.run_micro_batch_training().await;
                }
            }
        }
        info!("Online trainer stopped");
    }
}

impl fmt::Debug for OnlineTrainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("OnlineTrainer")
            .field("symbols", &self.config.symbols)
            .field("is_training", &state.is_training)
            .field("generation", &state.generation)
            .field("persistent", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        FeatureSource, LabeledSample, ModelTrainer, ModelValidator, TrainingDataSource,
    };
    use async_trait::async_trait;
    use rampart_core::clock::ManualClock;
    use rampart_core::storage::MemoryStateStore;
    use rampart_drift::{BaselineStore, DriftConfig};
    use rampart_risk::{PromotionConfig, RollbackConfig};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{OnceLock, Weak};
    use tokio::sync::Notify;

    const BTC: &str = "BTC-USDT";

    #[derive(Default)]
    struct StaticFeatures {
        values: Mutex<HashMap<Symbol, (f64, f64)>>,
    }

    impl StaticFeatures {
        fn set(&self, symbol: &str, volatility: f64, performance: f64) {
            self.values
                .lock()
                .insert(Symbol::new_unchecked(symbol), (volatility, performance));
        }
    }

    #[async_trait]
    impl FeatureSource for StaticFeatures {
        async fn features(&self, symbol: &Symbol) -> Result<FeatureMap, CollaboratorError> {
            let (volatility, _) = self
                .values
                .lock()
                .get(symbol)
                .copied()
                .ok_or_else(|| CollaboratorError::failed("features", format!("unknown {symbol}")))?;
            Ok(FeatureMap::from([("volatility".to_string(), volatility)]))
        }

        async fn performance(&self, symbol: &Symbol) -> Result<f64, CollaboratorError> {
            self.values
                .lock()
                .get(symbol)
                .map(|(_, p)| *p)
                .ok_or_else(|| CollaboratorError::failed("performance", format!("unknown {symbol}")))
        }
    }

    struct CountingData {
        samples: AtomicUsize,
    }

    #[async_trait]
    impl TrainingDataSource for CountingData {
        async fn collect_recent(
            &self,
            symbols: &[Symbol],
            since: Timestamp,
        ) -> Result<Vec<LabeledSample>, CollaboratorError> {
            let n = self.samples.load(Ordering::SeqCst);
            Ok((0..n)
                .map(|i| LabeledSample {
                    symbol: symbols[0].clone(),
                    timestamp: since,
                    features: FeatureMap::new(),
                    action: "buy".to_string(),
                    outcome: f64::from(u32::try_from(i).unwrap_or(u32::MAX)),
                })
                .collect())
        }
    }

    #[derive(Default)]
    struct ScriptedTrainer {
        calls: AtomicUsize,
        delay: Mutex<Duration>,
        panic: AtomicBool,
        started: Notify,
    }

    #[async_trait]
    impl ModelTrainer for ScriptedTrainer {
        async fn train(
            &self,
            samples: &[LabeledSample],
            params: &TrainingParams,
        ) -> Result<ModelRef, CollaboratorError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.started.notify_one();
            let delay = *self.delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            assert!(!samples.is_empty());
            assert!(params.generation >= 1);
            if self.panic.load(Ordering::SeqCst) {
                panic!("trainer crashed");
            }
            Ok(ModelRef::new(format!("model-{n}")).unwrap())
        }
    }

    struct FixedValidator {
        report: Mutex<ValidationReport>,
    }

    #[async_trait]
    impl ModelValidator for FixedValidator {
        async fn validate(&self, _: &ModelRef) -> Result<ValidationReport, CollaboratorError> {
            Ok(*self.report.lock())
        }
    }

    struct Harness {
        trainer: Arc<OnlineTrainer>,
        gate: Arc<PromotionGate>,
        features: Arc<StaticFeatures>,
        data: Arc<CountingData>,
        model_trainer: Arc<ScriptedTrainer>,
        validator: Arc<FixedValidator>,
        events: Arc<EventBus>,
    }

    fn config() -> TrainerConfig {
        TrainerConfig::new(vec![Symbol::new_unchecked(BTC)]).with_batch_bounds(10, 100)
    }

    fn harness_with(config: TrainerConfig, store: Option<Arc<dyn StateStore>>) -> Harness {
        let clock = ManualClock::new_shared(Timestamp::new_unchecked(1_700_000_000_000));
        let events = EventBus::new_shared();
        let rollback = RollbackController::new_shared(RollbackConfig::default(), clock.clone());
        let gate = Arc::new(
            PromotionGate::new(
                PromotionConfig::default(),
                rollback,
                Arc::clone(&events),
                clock.clone(),
            )
            .unwrap(),
        );
        let drift = Arc::new(
            DriftMonitor::new(DriftConfig::default(), BaselineStore::new_shared(), clock.clone())
                .unwrap(),
        );

        let features = Arc::new(StaticFeatures::default());
        features.set(BTC, 10.0, 1.0);
        let data = Arc::new(CountingData {
            samples: AtomicUsize::new(50),
        });
        let model_trainer = Arc::new(ScriptedTrainer::default());
        let validator = Arc::new(FixedValidator {
            report: Mutex::new(ValidationReport::approved(0.9, 1.0)),
        });

        let collaborators = Collaborators {
            features: features.clone(),
            data: data.clone(),
            trainer: model_trainer.clone(),
            validator: validator.clone(),
        };
        let mut trainer = OnlineTrainer::new(
            config,
            drift,
            Arc::clone(&gate),
            Arc::clone(&events),
            clock,
            collaborators,
        )
        .unwrap();
        if let Some(store) = store {
            trainer = trainer.with_store(store).unwrap();
        }

        Harness {
            trainer: Arc::new(trainer),
            gate,
            features,
            data,
            model_trainer,
            validator,
            events,
        }
    }

    fn harness() -> Harness {
        harness_with(config(), None)
    }

    fn drain(rx: &mut broadcast::Receiver<RampartEvent>) -> Vec<&'static str> {
        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind());
        }
        kinds
    }

    #[test]
    fn test_relative_improvement() {
        assert!((relative_improvement(1.05, 1.0) - 0.05).abs() < 1e-12);
        assert!((relative_improvement(0.05, 0.0) - 0.5).abs() < 1e-12);
        assert!((relative_improvement(-0.5, -1.0) - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_deploys_and_starts_promotion() {
        let h = harness();
        let mut rx = h.events.subscribe_channel();
        assert_eq!(h.trainer.warm_up().await.unwrap(), 1);

        let result = h.trainer.force_trigger_training().await;
        let CycleResult::Completed(run) = result else {
            panic!("cycle did not run");
        };
        assert_eq!(
            run.outcome,
            Some(TrainingOutcome::Deployed {
                model: ModelRef::new("model-1").unwrap(),
                generation: 1,
                promotion_started: true,
            })
        );
        assert_eq!(run.batch_size, 50);
        assert_eq!(run.trigger, RunTrigger::Forced);

        assert!(h.gate.is_live());
        assert_eq!(h.gate.current_step(), 0);

        let status = h.trainer.trainer_status();
        assert!(!status.is_training);
        assert_eq!(status.generation, 1);
        assert!(status.last_training_time.is_some());
        assert_eq!(status.current_model.unwrap().model.as_str(), "model-1");
        assert_eq!(status.recent_runs.len(), 1);

        let kinds = drain(&mut rx);
        assert_eq!(
            kinds,
            vec!["promotion_initialized", "model_deployed", "training_completed"]
        );
    }

    #[tokio::test]
    async fn test_insufficient_data_is_an_outcome() {
        let h = harness();
        h.data.samples.store(3, Ordering::SeqCst);

        let result = h.trainer.run_micro_batch_training().await;
        assert_eq!(
            result.outcome(),
            Some(&TrainingOutcome::InsufficientData {
                samples: 3,
                required: 10
            })
        );
        assert_eq!(h.model_trainer.calls.load(Ordering::SeqCst), 0);
        assert!(h.trainer.last_training_time().is_none());
        assert!(!h.gate.is_live());
    }

    #[tokio::test]
    async fn test_batch_truncated_to_max() {
        let h = harness();
        h.data.samples.store(500, Ordering::SeqCst);
        let CycleResult::Completed(run) = h.trainer.force_trigger_training().await else {
            panic!("cycle did not run");
        };
        assert_eq!(run.batch_size, 100);
    }

    #[tokio::test]
    async fn test_validation_rejection_keeps_production() {
        let h = harness();
        h.trainer.force_trigger_training().await;
        let deployed_at = h.trainer.last_training_time();

        *h.validator.report.lock() = ValidationReport::rejected(0.4, 0.2);
        let result = h.trainer.force_trigger_training().await;
        assert!(matches!(
            result.outcome(),
            Some(TrainingOutcome::ValidationRejected { .. })
        ));

        let status = h.trainer.trainer_status();
        assert_eq!(status.generation, 1);
        assert_eq!(status.current_model.unwrap().model.as_str(), "model-1");
        assert_eq!(h.trainer.last_training_time(), deployed_at);
    }

    #[tokio::test]
    async fn test_critical_drift_rolls_back_and_resets_baselines() {
        let h = harness();
        h.trainer.warm_up().await.unwrap();
        h.trainer.force_trigger_training().await;
        h.trainer.force_trigger_training().await;
        h.gate.advance_step(true).unwrap();
        assert_eq!(h.trainer.trainer_status().generation, 2);

        let mut rx = h.events.subscribe_channel();
        h.features.set(BTC, 12.6, 1.0);
        let result = h.trainer.run_micro_batch_training().await;
        assert_eq!(
            result.outcome(),
            Some(&TrainingOutcome::DriftRollback {
                symbols: vec![Symbol::new_unchecked(BTC)]
            })
        );
        assert_eq!(h.model_trainer.calls.load(Ordering::SeqCst), 2);

        let status = h.trainer.trainer_status();
        assert_eq!(status.current_model.unwrap().model.as_str(), "model-1");
        assert_eq!(h.gate.current_step(), 0);
        assert!(h.gate.is_live());

        let drift = h.trainer.drift_status();
        assert_eq!(drift.counts.red, 1);
        let drift_rollbacks: Vec<_> = drift
            .rollbacks
            .iter()
            .filter(|e| e.source == RollbackSource::Drift)
            .collect();
        assert_eq!(drift_rollbacks.len(), 2);
        assert!(
            drift_rollbacks
                .iter()
                .all(|e| e.reason == "critical drift in BTC-USDT")
        );

        let kinds = drain(&mut rx);
        assert!(kinds.contains(&"drift_alert"));
        assert_eq!(kinds.iter().filter(|k| **k == "rollback").count(), 2);

        // The reset baseline makes the same observation green.
        let result = h.trainer.run_micro_batch_training().await;
        assert!(result.outcome().unwrap().is_deployed());
    }

    #[tokio::test]
    async fn test_drift_rollback_without_history_still_audited() {
        let h = harness();
        h.trainer.warm_up().await.unwrap();
        h.features.set(BTC, 5.0, 1.0);

        let result = h.trainer.force_trigger_training().await;
        assert!(matches!(
            result.outcome(),
            Some(TrainingOutcome::DriftRollback { .. })
        ));
        let rollbacks = h.trainer.drift_status().rollbacks;
        assert_eq!(rollbacks.len(), 1);
        assert_eq!(rollbacks[0].restored_ref, "shadow");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_event_callbacks_may_query_the_trainer() {
        let h = harness();
        let slot: Arc<OnceLock<Weak<OnlineTrainer>>> = Arc::new(OnceLock::new());
        let seen: Arc<Mutex<Vec<(&'static str, u64)>>> = Arc::default();
        {
            let slot = Arc::clone(&slot);
            let seen = Arc::clone(&seen);
            h.events.subscribe(move |event| {
                if let Some(trainer) = slot.get().and_then(Weak::upgrade) {
                    let generation = trainer.trainer_status().generation;
                    seen.lock().push((event.kind(), generation));
                }
            });
        }
        slot.set(Arc::downgrade(&h.trainer)).unwrap();
        h.trainer.warm_up().await.unwrap();

        let trainer = Arc::clone(&h.trainer);
        let gate = Arc::clone(&h.gate);
        let features = Arc::clone(&h.features);
        let cycles = tokio::spawn(async move {
            trainer.force_trigger_training().await;
            trainer.force_trigger_training().await;
            gate.advance_step(true).unwrap();
            features.set(BTC, 12.6, 1.0);
            trainer.run_micro_batch_training().await
        });
        let result = tokio::time::timeout(Duration::from_secs(5), cycles)
            .await
            .expect("cycles stalled in an event callback")
            .unwrap();
        assert!(matches!(
            result.outcome(),
            Some(TrainingOutcome::DriftRollback { .. })
        ));

        let seen = seen.lock();
        assert!(seen.contains(&("promotion_initialized", 1)));
        assert!(seen.contains(&("promotion_initialized", 2)));
        assert!(seen.iter().any(|(kind, _)| *kind == "rollback"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_invocation_is_skipped() {
        let h = harness();
        *h.model_trainer.delay.lock() = Duration::from_secs(60);

        let trainer = Arc::clone(&h.trainer);
        let first = tokio::spawn(async move { trainer.force_trigger_training().await });
        h.model_trainer.started.notified().await;

        assert!(h.trainer.is_training());
        assert_eq!(
            h.trainer.run_micro_batch_training().await,
            CycleResult::AlreadyRunning
        );
        assert!(h.trainer.last_training_time().is_none());
        assert_eq!(h.model_trainer.calls.load(Ordering::SeqCst), 1);

        let result = first.await.unwrap();
        assert!(result.outcome().unwrap().is_deployed());
        assert!(!h.trainer.is_training());
        assert!(h.trainer.last_training_time().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_training_timeout_fails_cycle() {
        let h = harness_with(
            config().with_training_timeout(Duration::from_secs(1)),
            None,
        );
        *h.model_trainer.delay.lock() = Duration::from_secs(3600);

        let result = h.trainer.force_trigger_training().await;
        match result.outcome() {
            Some(TrainingOutcome::Failed { error }) => assert!(error.contains("timed out")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(!h.trainer.is_training());
        assert!(h.trainer.last_training_time().is_none());
    }

    #[tokio::test]
    async fn test_panicking_trainer_fails_cycle_and_recovers() {
        let h = harness();
        h.model_trainer.panic.store(true, Ordering::SeqCst);

        let result = h.trainer.force_trigger_training().await;
        assert_eq!(
            result.outcome(),
            Some(&TrainingOutcome::Failed {
                error: "train panicked".to_string()
            })
        );
        assert!(!h.trainer.is_training());

        h.model_trainer.panic.store(false, Ordering::SeqCst);
        let result = h.trainer.force_trigger_training().await;
        assert!(result.outcome().unwrap().is_deployed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_cycle_releases_guard() {
        let h = harness();
        *h.model_trainer.delay.lock() = Duration::from_secs(60);

        let trainer = Arc::clone(&h.trainer);
        let cycle = tokio::spawn(async move { trainer.force_trigger_training().await });
        h.model_trainer.started.notified().await;
        assert!(h.trainer.is_training());

        cycle.abort();
        assert!(cycle.await.unwrap_err().is_cancelled());
        assert!(!h.trainer.is_training());
    }

    #[tokio::test]
    async fn test_feature_failure_fails_cycle() {
        let config = TrainerConfig::new(vec![
            Symbol::new_unchecked(BTC),
            Symbol::new_unchecked("ETH-USDT"),
        ])
        .with_batch_bounds(10, 100);
        let h = harness_with(config, None);

        assert!(h.trainer.warm_up().await.is_err());
        let result = h.trainer.force_trigger_training().await;
        match result.outcome() {
            Some(TrainingOutcome::Failed { error }) => assert!(error.contains("ETH-USDT")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_required_improvement() {
        let h = harness_with(config().with_required_improvement(0.1), None);
        h.trainer.force_trigger_training().await;

        *h.validator.report.lock() = ValidationReport::approved(0.9, 1.05);
        let result = h.trainer.force_trigger_training().await;
        match result.outcome() {
            Some(TrainingOutcome::ValidationRejected { reason, .. }) => {
                assert!(reason.contains("improvement"), "{reason}");
            }
            other => panic!("expected rejection, got {other:?}"),
        }

        *h.validator.report.lock() = ValidationReport::approved(0.9, 1.2);
        let result = h.trainer.force_trigger_training().await;
        assert!(result.outcome().unwrap().is_deployed());
        assert_eq!(h.trainer.trainer_status().generation, 2);
    }

    #[tokio::test]
    async fn test_shadow_deployment() {
        let h = harness_with(
            config().with_deployment_start(DeploymentStart::Shadow),
            None,
        );
        let result = h.trainer.force_trigger_training().await;
        assert!(matches!(
            result.outcome(),
            Some(TrainingOutcome::Deployed {
                promotion_started: false,
                ..
            })
        ));
        assert!(!h.gate.is_live());
        assert_eq!(h.trainer.trainer_status().generation, 1);
    }

    #[tokio::test]
    async fn test_low_confidence_deploys_in_shadow() {
        let h = harness();
        h.trainer.force_trigger_training().await;
        assert!(h.gate.is_live());

        *h.validator.report.lock() = ValidationReport::approved(0.5, 1.0);
        let result = h.trainer.force_trigger_training().await;
        assert!(matches!(
            result.outcome(),
            Some(TrainingOutcome::Deployed {
                generation: 2,
                promotion_started: false,
                ..
            })
        ));
        assert!(!h.gate.is_live());
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let store: Arc<dyn StateStore> = MemoryStateStore::new_shared();
        let first = harness_with(config(), Some(Arc::clone(&store)));
        first.trainer.warm_up().await.unwrap();
        first.trainer.force_trigger_training().await;

        let second = harness_with(config(), Some(store));
        let status = second.trainer.trainer_status();
        assert_eq!(status.generation, 1);
        assert_eq!(status.current_model.unwrap().model.as_str(), "model-1");
        assert_eq!(status.recent_runs.len(), 1);
        assert_eq!(
            second.trainer.last_training_time(),
            first.trainer.last_training_time()
        );
        assert_eq!(second.trainer.drift_monitor().baselines().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_ticks_until_shutdown() {
        let h = harness_with(config().with_interval(Duration::from_secs(60)), None);
        let (tx, rx) = broadcast::channel(1);

        let trainer = Arc::clone(&h.trainer);
        let handle = tokio::spawn(async move { trainer.run(rx).await });

        tokio::time::sleep(Duration::from_secs(150)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        let status = h.trainer.trainer_status();
        assert_eq!(status.recent_runs.len(), 2);
        assert!(
            status
                .recent_runs
                .iter()
                .all(|r| r.trigger == RunTrigger::Scheduled)
        );
    }
}
