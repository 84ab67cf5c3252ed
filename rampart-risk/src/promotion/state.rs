//! Promotion state and trade ledger.

use rampart_core::types::{Side, Symbol, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::performance::{StepPerformance, StepStats};
use crate::rollback::RollbackTarget;

/// One fill attributed to the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionTrade {
    /// Fill time
    pub timestamp: Timestamp,
    /// Instrument
    pub symbol: Symbol,
    /// Direction
    pub side: Side,
    /// Notional fraction used
    pub notional: Decimal,
    /// Realized P&L
    pub pnl: Decimal,
    /// Ramp step active when the fill was recorded
    pub step: usize,
}

/// Running totals for one ramp step since the last initialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StepTally {
    pub trades: u64,
    pub wins: u64,
    pub total_pnl: Decimal,
    pub completed: bool,
}

/// Live/shadow status of one strategy.
///
/// `current_step` is meaningful only while `is_live`; the exposed notional is
/// zero otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionState {
    /// Current ramp step
    pub current_step: usize,
    /// Whether real capital is deployed
    pub is_live: bool,
    /// Consecutive losing trades in the current step
    pub consecutive_losses: u32,
    /// Running statistics of the current step
    #[serde(default)]
    pub step_stats: StepStats,
    /// Recent trades since initialization, oldest dropped past the ledger cap
    pub ledger: VecDeque<PromotionTrade>,
    /// When promotion was last initialized
    pub initialized_at: Option<Timestamp>,
    /// When the step or live flag last changed
    pub last_transition: Option<Timestamp>,
    #[serde(default)]
    pub(crate) tallies: Vec<StepTally>,
}

impl PromotionState {
    pub(crate) fn new(steps: usize) -> Self {
        Self {
            current_step: 0,
            is_live: false,
            consecutive_losses: 0,
            step_stats: StepStats::default(),
            ledger: VecDeque::new(),
            initialized_at: None,
            last_transition: None,
            tallies: vec![StepTally::default(); steps],
        }
    }

    /// Performance of the current step.
    #[must_use]
    pub fn step_performance(&self) -> StepPerformance {
        self.step_stats.performance()
    }

    /// Folds a trade into the step statistics, the ledger and the step tally.
    pub(crate) fn record(&mut self, trade: PromotionTrade, ledger_cap: usize) {
        if trade.pnl < Decimal::ZERO {
            self.consecutive_losses = self.consecutive_losses.saturating_add(1);
        } else {
            self.consecutive_losses = 0;
        }

        if let Some(tally) = self.tallies.get_mut(trade.step) {
            tally.trades += 1;
            if trade.pnl > Decimal::ZERO {
                tally.wins += 1;
            }
            tally.total_pnl += trade.pnl;
        }

        if self.ledger.len() >= ledger_cap {
            self.ledger.pop_front();
        }
        self.step_stats.push(trade.pnl);
        self.ledger.push_back(trade);
    }

    pub(crate) fn clear_step(&mut self) {
        self.step_stats = StepStats::default();
        self.consecutive_losses = 0;
    }

    /// Resizes tallies after a ramp change and clamps the step into range.
    pub(crate) fn conform_to(&mut self, steps: usize) -> bool {
        self.tallies.resize(steps, StepTally::default());
        let max_step = steps.saturating_sub(1);
        if self.current_step > max_step {
            self.current_step = max_step;
            self.clear_step();
            return true;
        }
        false
    }

    pub(crate) fn describe(&self, ramp: &[Decimal]) -> String {
        if self.is_live {
            let notional = ramp.get(self.current_step).copied().unwrap_or_default();
            format!("step:{}@{}", self.current_step, notional)
        } else {
            "shadow".to_string()
        }
    }
}

/// Rollback view of the promotion state: one step down, or shadow from step 0.
pub(crate) struct StepCursor<'a> {
    pub state: &'a mut PromotionState,
    pub ramp: &'a [Decimal],
}

impl RollbackTarget for StepCursor<'_> {
    fn current_reference(&self) -> String {
        self.state.describe(self.ramp)
    }

    fn restore_previous(&mut self) -> String {
        if self.state.current_step > 0 {
            self.state.current_step -= 1;
        } else {
            self.state.is_live = false;
        }
        self.state.describe(self.ramp)
    }

    fn reset_counters(&mut self) {
        self.state.clear_step();
    }
}
