//! # Rampart Risk
//!
//! Capital exposure control for adaptively retrained strategies.
//!
//! - [`PromotionGate`] decides trade by trade how much notional a strategy may
//!   risk and walks it up and down a staged ramp.
//! - [`RollbackController`] executes and audits reversals for both the gate
//!   and the model registry.
//!
//! # Example
//!
//! ```
//! use rampart_core::clock::SystemClock;
//! use rampart_core::events::EventBus;
//! use rampart_core::types::{Side, Symbol, ValidationReport};
//! use rampart_risk::{PromotionConfig, PromotionGate, RollbackConfig, RollbackController};
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! let clock = SystemClock::new_shared();
//! let rollback = RollbackController::new_shared(RollbackConfig::default(), clock.clone());
//! let gate = PromotionGate::new(
//!     PromotionConfig::default(),
//!     rollback,
//!     EventBus::new_shared(),
//!     clock,
//! )
//! .unwrap();
//!
//! assert!(gate.current_notional().is_zero());
//! gate.initialize_promotion(&ValidationReport::approved(0.9, 1.4)).unwrap();
//! assert_eq!(gate.current_notional(), Decimal::new(5, 3));
//!
//! gate.process_live_trade(Symbol::new("BTC-USDT").unwrap(), Side::Buy, Decimal::new(5, 3), Decimal::from(12))
//!     .unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod promotion;
pub mod rollback;

pub use error::RiskError;
pub use promotion::{
    AdvancementCriteria, NextStepRequirements, PromotionConfig, PromotionGate, PromotionState,
    PromotionStatus, PromotionTrade, RollbackTriggers, StepPerformance, StepSummary,
    TradeDecision,
};
pub use rollback::{RollbackConfig, RollbackController, RollbackTarget};
