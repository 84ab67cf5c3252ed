//! Promotion gate state machine.

use parking_lot::Mutex;
use rampart_core::clock::Clock;
use rampart_core::config::Validatable;
use rampart_core::events::{EventBus, RampartEvent, RollbackEvent, RollbackSource};
use rampart_core::storage::{self, StateStore};
use rampart_core::types::{Side, Symbol, ValidationReport};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::config::PromotionConfig;
use super::performance::StepPerformance;
use super::state::{PromotionState, PromotionTrade, StepCursor};
use super::status::{NextStepRequirements, PromotionStatus, StepSummary};
use crate::error::RiskError;
use crate::rollback::RollbackController;

/// What a recorded fill did to the ramp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum TradeDecision {
    /// Step unchanged.
    Held {
        /// Current step
        step: usize,
    },
    /// Advancement criteria met; moved up one step.
    Advanced {
        /// Step the trade was recorded in
        from_step: usize,
        /// New step
        to_step: usize,
    },
    /// A rollback trigger fired.
    RolledBack {
        /// Step the trade was recorded in
        from_step: usize,
        /// New step, or `None` if the strategy left live trading
        to_step: Option<usize>,
        /// Trigger description
        reason: String,
    },
}

impl TradeDecision {
    /// Returns true if the step or live flag changed.
    #[must_use]
    pub const fn changed_step(&self) -> bool {
        !matches!(self, Self::Held { .. })
    }
}

fn rollback_reason(
    config: &PromotionConfig,
    state: &PromotionState,
    perf: &StepPerformance,
) -> Option<String> {
    let triggers = &config.rollback;
    if state.consecutive_losses >= triggers.max_consecutive_losses {
        return Some(format!(
            "{} consecutive losses (max {})",
            state.consecutive_losses, triggers.max_consecutive_losses
        ));
    }
    if perf.max_drawdown > triggers.max_drawdown {
        return Some(format!(
            "step drawdown {:.4} exceeds {:.4}",
            perf.max_drawdown, triggers.max_drawdown
        ));
    }
    if perf.trades >= triggers.min_trades_for_sharpe && perf.sharpe < triggers.min_sharpe {
        return Some(format!(
            "step sharpe {:.3} below {:.3} after {} trades",
            perf.sharpe, triggers.min_sharpe, perf.trades
        ));
    }
    None
}

fn unmet_criteria(config: &PromotionConfig, perf: &StepPerformance) -> Vec<String> {
    let criteria = &config.advancement;
    let mut unmet = Vec::new();
    if perf.trades < criteria.min_trades_per_step {
        unmet.push(format!(
            "trades {}/{}",
            perf.trades, criteria.min_trades_per_step
        ));
    }
    if perf.sharpe < criteria.min_sharpe {
        unmet.push(format!(
            "sharpe {:.3} < {:.3}",
            perf.sharpe, criteria.min_sharpe
        ));
    }
    if perf.win_rate < criteria.min_win_rate {
        unmet.push(format!(
            "win rate {:.3} < {:.3}",
            perf.win_rate, criteria.min_win_rate
        ));
    }
    if perf.max_drawdown > criteria.max_drawdown {
        unmet.push(format!(
            "drawdown {:.4} > {:.4}",
            perf.max_drawdown, criteria.max_drawdown
        ));
    }
    unmet
}

/// Staged capital ramp for one strategy.
///
/// All mutation happens under one mutex. Events are buffered while the lock is
/// held and published after it is released, so subscribers may query the gate.
pub struct PromotionGate {
    config: PromotionConfig,
    state: Mutex<PromotionState>,
    rollback: Arc<RollbackController>,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    store: Option<Arc<dyn StateStore>>,
}

impl PromotionGate {
    /// Creates a gate in shadow mode, validating `config`.
    pub fn new(
        config: PromotionConfig,
        rollback: Arc<RollbackController>,
        events: Arc<EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RiskError> {
        config.validate()?;
        let state = PromotionState::new(config.ramp_steps.len());
        Ok(Self {
            config,
            state: Mutex::new(state),
            rollback,
            events,
            clock,
            store: None,
        })
    }

    /// Attaches a store, restoring previously persisted state.
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Result<Self, RiskError> {
        let key = self.store_key();
        if let Some(mut saved) = storage::load_typed::<PromotionState>(store.as_ref(), &key)? {
            if saved.conform_to(self.config.ramp_steps.len()) {
                warn!(
                    strategy = %self.config.strategy,
                    step = saved.current_step,
                    "Persisted step exceeded configured ramp; clamped"
                );
            }
            info!(
                strategy = %self.config.strategy,
                step = saved.current_step,
                live = saved.is_live,
                trades = saved.ledger.len(),
                "Promotion state restored"
            );
            *self.state.get_mut() = saved;
        }
        self.store = Some(store);
        Ok(self)
    }

    fn store_key(&self) -> String {
        format!("promotion.{}", self.config.strategy)
    }

    fn persist(&self, state: &PromotionState) {
        if let Some(store) = &self.store
            && let Err(e) = storage::save_typed(store.as_ref(), &self.store_key(), state)
        {
            error!(strategy = %self.config.strategy, error = %e, "Failed to persist promotion state");
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PromotionConfig {
        &self.config
    }

    /// Returns the rollback controller.
    #[must_use]
    pub fn rollback_controller(&self) -> &Arc<RollbackController> {
        &self.rollback
    }

    /// Goes live at step 0 if `report` is approved with enough confidence.
    ///
    /// Acceptance clears every counter and ledger.
    pub fn initialize_promotion(&self, report: &ValidationReport) -> Result<(), RiskError> {
        if !report.approved {
            warn!(strategy = %self.config.strategy, "Promotion rejected: validation not approved");
            return Err(RiskError::PromotionRejected {
                reason: "validation result not approved".to_string(),
            });
        }
        if !report.passes(self.config.min_confidence) {
            warn!(
                strategy = %self.config.strategy,
                confidence = report.confidence,
                min_confidence = self.config.min_confidence,
                "Promotion rejected: low confidence"
            );
            return Err(RiskError::PromotionRejected {
                reason: format!(
                    "confidence {:.3} below minimum {:.3}",
                    report.confidence, self.config.min_confidence
                ),
            });
        }

        let now = self.clock.now();
        {
            let mut state = self.state.lock();
            let mut fresh = PromotionState::new(self.config.ramp_steps.len());
            fresh.is_live = true;
            fresh.initialized_at = Some(now);
            fresh.last_transition = Some(now);
            *state = fresh;
            self.persist(&state);
        }

        info!(
            strategy = %self.config.strategy,
            confidence = report.confidence,
            notional = %self.config.notional_for(0),
            "Promotion initialized at step 0"
        );
        self.events.publish(RampartEvent::PromotionInitialized {
            timestamp: now,
            confidence: report.confidence,
        });
        Ok(())
    }

    /// Records a fill, then evaluates rollback triggers and advancement.
    ///
    /// At most one of rollback or advancement happens per call.
    pub fn process_live_trade(
        &self,
        symbol: Symbol,
        side: Side,
        notional: Decimal,
        pnl: Decimal,
    ) -> Result<TradeDecision, RiskError> {
        if notional < Decimal::ZERO {
            return Err(RiskError::InvalidTrade {
                reason: format!("negative notional {notional}"),
            });
        }

        let mut events = Vec::new();
        let decision = {
            let mut state = self.state.lock();
            if !state.is_live {
                return Err(RiskError::not_live("process_live_trade"));
            }

            let step = state.current_step;
            state.record(
                PromotionTrade {
                    timestamp: self.clock.now(),
                    symbol,
                    side,
                    notional,
                    pnl,
                    step,
                },
                self.config.ledger_cap,
            );

            let perf = state.step_performance();
            debug!(
                strategy = %self.config.strategy,
                step,
                trades = perf.trades,
                sharpe = perf.sharpe,
                win_rate = perf.win_rate,
                drawdown = perf.max_drawdown,
                losses = state.consecutive_losses,
                "Trade recorded"
            );

            let decision = if let Some(reason) = rollback_reason(&self.config, &state, &perf) {
                self.demote(&mut state, RollbackSource::PromotionGate, reason, &mut events)
                    .0
            } else if step < self.config.max_step() && unmet_criteria(&self.config, &perf).is_empty()
            {
                let to_step = self.promote(&mut state, false, &mut events);
                TradeDecision::Advanced {
                    from_step: step,
                    to_step,
                }
            } else {
                TradeDecision::Held { step }
            };

            self.persist(&state);
            decision
        };

        self.events.publish_all(events);
        Ok(decision)
    }

    fn demote(
        &self,
        state: &mut PromotionState,
        source: RollbackSource,
        reason: String,
        events: &mut Vec<RampartEvent>,
    ) -> (TradeDecision, RollbackEvent) {
        let from_step = state.current_step;
        let event = self.rollback.execute(
            source,
            &mut StepCursor {
                state: &mut *state,
                ramp: &self.config.ramp_steps,
            },
            reason.clone(),
        );
        state.last_transition = Some(event.timestamp);

        let to_step = state.is_live.then_some(state.current_step);
        events.push(RampartEvent::Rollback(event.clone()));
        match to_step {
            Some(to) => warn!(
                strategy = %self.config.strategy,
                from_step,
                to_step = to,
                reason = %reason,
                "Promotion step rolled back"
            ),
            None => {
                error!(
                    strategy = %self.config.strategy,
                    reason = %reason,
                    "Promotion rolled back to shadow mode"
                );
                events.push(RampartEvent::ShadowModeEntered {
                    timestamp: event.timestamp,
                    reason: reason.clone(),
                });
            }
        }

        (
            TradeDecision::RolledBack {
                from_step,
                to_step,
                reason,
            },
            event,
        )
    }

    fn promote(
        &self,
        state: &mut PromotionState,
        admin_override: bool,
        events: &mut Vec<RampartEvent>,
    ) -> usize {
        let from_step = state.current_step;
        if let Some(tally) = state.tallies.get_mut(from_step) {
            tally.completed = true;
        }
        state.current_step = (from_step + 1).min(self.config.max_step());
        state.clear_step();

        let now = self.clock.now();
        state.last_transition = Some(now);
        let notional = self.config.notional_for(state.current_step);

        info!(
            strategy = %self.config.strategy,
            from_step,
            to_step = state.current_step,
            notional = %notional,
            admin_override,
            "Promotion step advanced"
        );
        events.push(RampartEvent::StepAdvanced {
            timestamp: now,
            from_step,
            to_step: state.current_step,
            notional,
            admin_override,
        });
        state.current_step
    }

    /// Notional fraction for the next order: the current step's value while
    /// live, zero otherwise. Read this fresh for every sizing decision.
    #[must_use]
    pub fn current_notional(&self) -> Decimal {
        let state = self.state.lock();
        if state.is_live {
            self.config.notional_for(state.current_step)
        } else {
            Decimal::ZERO
        }
    }

    /// Moves up one step. Without `admin_override` the advancement criteria
    /// must hold. Returns the new step.
    pub fn advance_step(&self, admin_override: bool) -> Result<usize, RiskError> {
        let mut events = Vec::new();
        let to_step = {
            let mut state = self.state.lock();
            if !state.is_live {
                return Err(RiskError::not_live("advance_step"));
            }
            if state.current_step >= self.config.max_step() {
                return Err(RiskError::AtMaxStep {
                    step: state.current_step,
                });
            }
            if admin_override {
                warn!(
                    strategy = %self.config.strategy,
                    step = state.current_step,
                    "Admin override: advancing without criteria"
                );
            } else {
                let unmet = unmet_criteria(&self.config, &state.step_performance());
                if !unmet.is_empty() {
                    return Err(RiskError::AdvancementCriteriaNotMet {
                        step: state.current_step,
                        unmet,
                    });
                }
            }
            let to_step = self.promote(&mut state, admin_override, &mut events);
            self.persist(&state);
            to_step
        };

        self.events.publish_all(events);
        Ok(to_step)
    }

    /// Operator rollback: one step down, or out of live trading from step 0.
    ///
    /// While not live the request is only recorded for audit.
    pub fn trigger_rollback(&self, reason: impl Into<String>) -> RollbackEvent {
        self.rollback(RollbackSource::Operator, reason)
    }

    /// Rolls back on behalf of `source`. Same semantics as [`Self::trigger_rollback`].
    pub fn rollback(&self, source: RollbackSource, reason: impl Into<String>) -> RollbackEvent {
        let reason = reason.into();
        let mut events = Vec::new();
        let event = {
            let mut state = self.state.lock();
            let event = if state.is_live {
                self.demote(&mut state, source, reason, &mut events).1
            } else {
                let event = self.rollback.record(source, reason, "shadow", "shadow");
                events.push(RampartEvent::Rollback(event.clone()));
                event
            };
            self.persist(&state);
            event
        };

        self.events.publish_all(events);
        event
    }

    /// Leaves live trading immediately and returns to step 0.
    ///
    /// Returns whether the strategy was live.
    pub fn stop_live_trading(&self) -> bool {
        let now = self.clock.now();
        let (was_live, event) = {
            let mut state = self.state.lock();
            let was_live = state.is_live;
            let prior = state.describe(&self.config.ramp_steps);
            state.is_live = false;
            state.current_step = 0;
            state.clear_step();
            state.last_transition = Some(now);
            let event = self.rollback.record(
                RollbackSource::Operator,
                "live trading stopped by operator",
                prior,
                "shadow",
            );
            self.persist(&state);
            (was_live, event)
        };

        error!(strategy = %self.config.strategy, was_live, "LIVE TRADING STOPPED");
        self.events.publish_all([
            RampartEvent::Rollback(event),
            RampartEvent::LiveTradingStopped { timestamp: now },
        ]);
        was_live
    }

    /// Returns to shadow mode at step 0 without recording a rollback, e.g.
    /// when a newly deployed model must be re-validated before going live.
    pub fn enter_shadow_mode(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let now = self.clock.now();
        {
            let mut state = self.state.lock();
            state.is_live = false;
            state.current_step = 0;
            state.clear_step();
            state.last_transition = Some(now);
            self.persist(&state);
        }
        info!(strategy = %self.config.strategy, reason = %reason, "Shadow mode entered");
        self.events.publish(RampartEvent::ShadowModeEntered {
            timestamp: now,
            reason,
        });
    }

    /// Returns whether real capital is deployed.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state.lock().is_live
    }

    /// Returns the current step.
    #[must_use]
    pub fn current_step(&self) -> usize {
        self.state.lock().current_step
    }

    /// Returns a status snapshot.
    #[must_use]
    pub fn promotion_status(&self) -> PromotionStatus {
        let state = self.state.lock();
        let perf = state.step_performance();
        let max_step = self.config.max_step();
        let at_top = state.current_step >= max_step;

        let rollback_reason = if state.is_live {
            rollback_reason(&self.config, &state, &perf)
        } else {
            None
        };
        let unmet = unmet_criteria(&self.config, &perf);
        let criteria = &self.config.advancement;

        let next_step = (state.is_live && !at_top).then(|| NextStepRequirements {
            next_step: state.current_step + 1,
            next_notional: self.config.notional_for(state.current_step + 1),
            trades_remaining: criteria.min_trades_per_step.saturating_sub(perf.trades),
            min_trades: criteria.min_trades_per_step,
            min_sharpe: criteria.min_sharpe,
            min_win_rate: criteria.min_win_rate,
            max_drawdown: criteria.max_drawdown,
            unmet: unmet.clone(),
        });

        PromotionStatus {
            strategy: self.config.strategy.clone(),
            current_step: state.current_step,
            max_step,
            current_notional: if state.is_live {
                self.config.notional_for(state.current_step)
            } else {
                Decimal::ZERO
            },
            is_live: state.is_live,
            can_advance: state.is_live && !at_top && unmet.is_empty(),
            needs_rollback: rollback_reason.is_some(),
            rollback_reason,
            consecutive_losses: state.consecutive_losses,
            performance: perf,
            next_step,
        }
    }

    /// Returns per-step totals since the last initialization.
    #[must_use]
    pub fn promotion_history(&self) -> Vec<StepSummary> {
        let state = self.state.lock();
        state
            .tallies
            .iter()
            .enumerate()
            .map(|(step, tally)| {
                #[allow(clippy::cast_precision_loss)]
                let win_rate = if tally.trades == 0 {
                    0.0
                } else {
                    tally.wins as f64 / tally.trades as f64
                };
                StepSummary {
                    step,
                    notional: self.config.notional_for(step),
                    trades: tally.trades,
                    total_pnl: tally.total_pnl,
                    win_rate,
                    completed: tally.completed,
                    current: state.is_live && step == state.current_step,
                }
            })
            .collect()
    }

    /// Returns a copy of the full state.
    #[must_use]
    pub fn snapshot(&self) -> PromotionState {
        self.state.lock().clone()
    }
}

impl fmt::Debug for PromotionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PromotionGate")
            .field("strategy", &self.config.strategy)
            .field("is_live", &state.is_live)
            .field("current_step", &state.current_step)
            .field("step_trades", &state.step_stats.trades())
            .finish_non_exhaustive()
    }
}
