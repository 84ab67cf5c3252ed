//! Status snapshots for operators and the trading loop.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::performance::StepPerformance;

/// What the current step still needs before advancing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextStepRequirements {
    /// Step that would be entered
    pub next_step: usize,
    /// Notional fraction of that step
    pub next_notional: Decimal,
    /// Trades still required
    pub trades_remaining: usize,
    /// Required minimum trades
    pub min_trades: usize,
    /// Required minimum Sharpe
    pub min_sharpe: f64,
    /// Required minimum win rate
    pub min_win_rate: f64,
    /// Allowed maximum drawdown
    pub max_drawdown: f64,
    /// Criteria not yet satisfied
    pub unmet: Vec<String>,
}

/// Point-in-time view of the promotion gate.
///
/// Contains no wall-clock fields, so two calls with no intervening mutation
/// compare equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionStatus {
    /// Strategy name
    pub strategy: String,
    /// Current ramp step
    pub current_step: usize,
    /// Last ramp step
    pub max_step: usize,
    /// Notional fraction to use for the next order
    pub current_notional: Decimal,
    /// Whether real capital is deployed
    pub is_live: bool,
    /// Whether advancement criteria are currently met
    pub can_advance: bool,
    /// Whether a rollback trigger currently holds
    pub needs_rollback: bool,
    /// The trigger that holds, if any
    pub rollback_reason: Option<String>,
    /// Consecutive losses in the current step
    pub consecutive_losses: u32,
    /// Current step performance
    pub performance: StepPerformance,
    /// Requirements for the next step; `None` when not live or at the top
    pub next_step: Option<NextStepRequirements>,
}

/// Per-step totals since the last initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    /// Step index
    pub step: usize,
    /// Notional fraction
    pub notional: Decimal,
    /// Trades recorded at this step
    pub trades: u64,
    /// Sum of P&L at this step
    pub total_pnl: Decimal,
    /// Fraction of winning trades at this step
    pub win_rate: f64,
    /// Whether the strategy has advanced out of this step
    pub completed: bool,
    /// Whether this is the current live step
    pub current: bool,
}
