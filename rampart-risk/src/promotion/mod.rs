//! Staged capital ramp with automatic rollback.
//!
//! A strategy is either not live (shadow mode, zero notional) or live at
//! step `k` of the configured ramp. Fills are evaluated for rollback triggers
//! first and advancement second; one fill changes the step by at most one.

mod config;
mod gate;
mod performance;
mod state;
mod status;

pub use config::{AdvancementCriteria, PromotionConfig, RollbackTriggers};
pub use gate::{PromotionGate, TradeDecision};
pub use performance::{StepPerformance, StepStats};
pub use state::{PromotionState, PromotionTrade};
pub use status::{NextStepRequirements, PromotionStatus, StepSummary};
