//! # Rampart Telemetry
//!
//! Logging and tracing for the Rampart safety envelope.
//!
//! - Structured logging in JSON or human-readable form
//! - Optional rolling log files via `tracing-appender`
//! - Span helpers for retraining runs, promotion decisions and drift checks

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

/// Logging configuration and initialization
pub mod logging;

/// Span definitions
pub mod spans;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::logging::{LogConfig, LogFormat, LogOutput, LoggingError, init_logging};
    pub use crate::spans::*;
}
