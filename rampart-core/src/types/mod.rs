//! `NewType` wrappers and shared value types.
//!
//! # Types
//!
//! - [`Symbol`] - Tracked instrument identifiers
//! - [`Timestamp`] - Unix millisecond timestamps
//! - [`ModelRef`] - Opaque references to trained models
//! - [`Side`] - Direction of a fill
//! - [`AlertLevel`] - Drift severity
//! - [`ValidationReport`] - Result of shadow validation

mod alert;
mod model;
mod side;
mod symbol;
mod timestamp;

pub use alert::AlertLevel;
pub use model::{ModelRef, ValidationReport};
pub use side::Side;
pub use symbol::Symbol;
pub use timestamp::Timestamp;

/// Validation error for `NewType` construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Symbol format is invalid
    #[error("invalid symbol format: {0}")]
    InvalidSymbol(String),

    /// Symbol is empty
    #[error("symbol cannot be empty")]
    EmptySymbol,

    /// Model reference is empty
    #[error("model reference cannot be empty")]
    EmptyModelRef,

    /// Timestamp is invalid (negative)
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(i64),

    /// Side string not recognized
    #[error("invalid side: {0}")]
    InvalidSide(String),
}
