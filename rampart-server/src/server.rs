//! Server lifecycle.
//!
//! [`RampartServer`] wires the envelope together, then runs three background
//! tasks until shutdown: the retraining loop, the fill reader and an event
//! logger. The calling task logs status on a fixed interval.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use rampart_core::clock::{Clock, SystemClock};
use rampart_core::config::ConfigLoader;
use rampart_core::error::{ConfigError, StorageError};
use rampart_core::events::{EventBus, RampartEvent};
use rampart_core::storage::{FileStateStore, StateStore};
use rampart_drift::{BaselineStore, DriftMonitor};
use rampart_risk::{PromotionGate, RiskError, RollbackController};
use rampart_telemetry::logging::init_logging;
use rampart_trainer::{Collaborators, OnlineTrainer, TrainerError};

use crate::collaborators;
use crate::config::ServerConfig;
use crate::fills::{FillStats, feed_fills};
use crate::shutdown::{ShutdownController, listen_for_signals};

/// Prefix for environment overrides, e.g. `RAMPART_LOG_LEVEL`.
pub const ENV_PREFIX: &str = "RAMPART";

/// Server lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Not initialized, or shut down
    Stopped,
    /// Initialized, not yet running
    Starting,
    /// Running
    Running,
    /// Draining background tasks
    ShuttingDown,
}

/// The assembled envelope components.
#[derive(Debug, Clone)]
pub struct Envelope {
    events: Arc<EventBus>,
    gate: Arc<PromotionGate>,
    trainer: Arc<OnlineTrainer>,
}

impl Envelope {
    /// Builds every component from `config` and restores persisted state
    /// from `store`.
    pub fn assemble(
        config: &ServerConfig,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        collaborators: Collaborators,
    ) -> Result<Self, ServerError> {
        let events = EventBus::new_shared();

        let rollback = Arc::new(
            RollbackController::new(config.rollback.clone(), Arc::clone(&clock))
                .with_store(Arc::clone(&store))?,
        );
        let gate = Arc::new(
            PromotionGate::new(
                config.promotion.clone(),
                rollback,
                Arc::clone(&events),
                Arc::clone(&clock),
            )?
            .with_store(Arc::clone(&store))?,
        );
        let drift = Arc::new(DriftMonitor::new(
            config.drift.clone(),
            BaselineStore::new_shared(),
            Arc::clone(&clock),
        )?);
        let trainer = Arc::new(
            OnlineTrainer::new(
                config.trainer.clone(),
                drift,
                Arc::clone(&gate),
                Arc::clone(&events),
                clock,
                collaborators,
            )?
            .with_store(store)?,
        );

        Ok(Self {
            events,
            gate,
            trainer,
        })
    }

    /// Returns the event bus.
    #[must_use]
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Returns the promotion gate.
    #[must_use]
    pub fn gate(&self) -> &Arc<PromotionGate> {
        &self.gate
    }

    /// Returns the online trainer.
    #[must_use]
    pub fn trainer(&self) -> &Arc<OnlineTrainer> {
        &self.trainer
    }

    fn log_status(&self) {
        let promotion = self.gate.promotion_status();
        let trainer = self.trainer.trainer_status();
        info!(
            strategy = %promotion.strategy,
            step = promotion.current_step,
            notional = %promotion.current_notional,
            is_live = promotion.is_live,
            can_advance = promotion.can_advance,
            needs_rollback = promotion.needs_rollback,
            trades = promotion.performance.trades,
            generation = trainer.generation,
            is_training = trainer.is_training,
            model = ?trainer.current_model.as_ref().map(|m| m.model.as_str()),
            "Envelope status"
        );
    }
}

/// Runs the envelope until SIGINT/SIGTERM or [`RampartServer::shutdown`].
pub struct RampartServer {
    config: ServerConfig,
    state: Arc<RwLock<ServerState>>,
    shutdown: ShutdownController,
    envelope: Option<Envelope>,
    _log_guards: Vec<WorkerGuard>,
}

impl RampartServer {
    /// Creates a stopped server.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(ServerState::Stopped)),
            shutdown: ShutdownController::new(),
            envelope: None,
            _log_guards: Vec::new(),
        }
    }

    /// Loads, overrides from `RAMPART_*` variables, and validates a config file.
    pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ServerConfig, ServerError> {
        Ok(ConfigLoader::new()
            .with_env_prefix(ENV_PREFIX)
            .load_validated(path)?)
    }

    /// Returns the lifecycle state.
    pub async fn state(&self) -> ServerState {
        *self.state.read().await
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> &ShutdownController {
        &self.shutdown
    }

    /// Returns the envelope once initialized.
    #[must_use]
    pub fn envelope(&self) -> Option<&Envelope> {
        self.envelope.as_ref()
    }

    /// Initializes logging, opens the state directory and builds the
    /// envelope with file and command collaborators.
    pub async fn initialize(&mut self) -> Result<(), ServerError> {
        self.init_logging()?;

        let store: Arc<dyn StateStore> = Arc::new(FileStateStore::open(&self.config.state_dir)?);
        info!(state_dir = %self.config.state_dir.display(), "State store opened");

        let collaborators = collaborators::from_config(&self.config.collaborators);
        self.initialize_with(store, SystemClock::new_shared(), collaborators)
            .await
    }

    /// Builds the envelope from explicit parts and warms drift baselines.
    ///
    /// Logging is left untouched.
    pub async fn initialize_with(
        &mut self,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        collaborators: Collaborators,
    ) -> Result<(), ServerError> {
        {
            let mut state = self.state.write().await;
            if *state != ServerState::Stopped {
                return Err(ServerError::InvalidState(
                    "server must be stopped to initialize".to_string(),
                ));
            }
            *state = ServerState::Starting;
        }

        let envelope = match Envelope::assemble(&self.config, store, clock, collaborators) {
            Ok(envelope) => envelope,
            Err(e) => {
                *self.state.write().await = ServerState::Stopped;
                return Err(e);
            }
        };

        match envelope.trainer.warm_up().await {
            Ok(count) => info!(baselines = count, "Drift baselines warmed up"),
            Err(e) => warn!(
                error = %e,
                "Baseline warm-up failed; baselines will be taken from first observations"
            ),
        }

        self.envelope = Some(envelope);
        info!("Rampart server initialized");
        Ok(())
    }

    fn init_logging(&mut self) -> Result<(), ServerError> {
        let guards = init_logging(&self.config.logging).map_err(|e| {
            ServerError::Initialization(format!("failed to initialize logging: {e}"))
        })?;
        self._log_guards = guards;
        info!(level = %self.config.logging.level, "Logging initialized");
        Ok(())
    }

    /// Runs until shutdown, then drains background tasks.
    pub async fn run(&self) -> Result<(), ServerError> {
        {
            let mut state = self.state.write().await;
            if *state != ServerState::Starting {
                return Err(ServerError::InvalidState(
                    "server must be initialized before running".to_string(),
                ));
            }
            *state = ServerState::Running;
        }
        let envelope = self.envelope.clone().ok_or_else(|| {
            ServerError::InvalidState("server has no envelope".to_string())
        })?;

        let signals = tokio::spawn(listen_for_signals(self.shutdown.clone()));
        let status_rx = self.shutdown.subscribe();

        let trainer_task = {
            let trainer = Arc::clone(&envelope.trainer);
            let rx = self.shutdown.subscribe();
            tokio::spawn(async move { trainer.run(rx).await })
        };

        let fills_task = self.config.fills.stdin.then(|| {
            let gate = Arc::clone(&envelope.gate);
            let rx = self.shutdown.subscribe();
            tokio::spawn(async move {
                feed_fills(BufReader::new(tokio::io::stdin()), gate, rx).await
            })
        });

        let events_task = spawn_event_logger(
            envelope.events.subscribe_channel(),
            self.shutdown.subscribe(),
        );

        info!(
            symbols = self.config.trainer.symbols.len(),
            strategy = %self.config.promotion.strategy,
            fills_from_stdin = self.config.fills.stdin,
            "Rampart server running"
        );

        self.status_loop(&envelope, status_rx).await;
        signals.abort();

        self.graceful_shutdown(&envelope, trainer_task, fills_task, events_task)
            .await;
        Ok(())
    }

    async fn status_loop(&self, envelope: &Envelope, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.status_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => envelope.log_status(),
            }
        }
    }

    async fn graceful_shutdown(
        &self,
        envelope: &Envelope,
        trainer_task: JoinHandle<()>,
        fills_task: Option<JoinHandle<FillStats>>,
        events_task: JoinHandle<()>,
    ) {
        *self.state.write().await = ServerState::ShuttingDown;
        info!("Performing graceful shutdown");

        let timeout = self.config.shutdown.timeout;
        if drain("trainer", trainer_task, timeout).await.is_none() {
            warn!("Trainer did not stop in time; an in-flight cycle was abandoned");
        }
        if let Some(task) = fills_task {
            match drain("fill reader", task, timeout).await {
                Some(stats) => info!(?stats, "Fill reader stopped"),
                None => warn!("Fill reader did not stop in time"),
            }
        }
        drain("event logger", events_task, timeout).await;

        envelope.log_status();
        *self.state.write().await = ServerState::Stopped;
        self.shutdown.finish();
        info!("Graceful shutdown complete");
    }

    /// Requests shutdown.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }
}

impl std::fmt::Debug for RampartServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RampartServer")
            .field("state_dir", &self.config.state_dir)
            .field("initialized", &self.envelope.is_some())
            .field("shutdown_initiated", &self.shutdown.is_triggered())
            .finish_non_exhaustive()
    }
}

/// Waits up to `timeout` for a task, aborting it on timeout.
///
/// Returns `None` if the task timed out or panicked.
async fn drain<T>(name: &str, mut task: JoinHandle<T>, timeout: Duration) -> Option<T> {
    match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            error!(task = name, error = %e, "Background task failed");
            None
        }
        Err(_) => {
            task.abort();
            None
        }
    }
}

fn spawn_event_logger(
    mut events: broadcast::Receiver<RampartEvent>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = shutdown.recv() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(event) => {
                    let detail = serde_json::to_string(&event).unwrap_or_default();
                    if event.is_critical() {
                        warn!(kind = event.kind(), %detail, "Envelope event");
                    } else {
                        info!(kind = event.kind(), %detail, "Envelope event");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Persisted state could not be opened or read.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The promotion gate or rollback controller refused to start.
    #[error("Risk component error: {0}")]
    Risk(#[from] RiskError),

    /// The trainer refused to start.
    #[error("Trainer error: {0}")]
    Trainer(#[from] TrainerError),

    /// Startup failed.
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// Lifecycle call made in the wrong state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}
