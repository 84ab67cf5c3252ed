//! # Rampart Core
//!
//! Shared building blocks for the Rampart capital safety envelope.
//!
//! This crate provides:
//! - `NewType` wrappers for the envelope's identifiers (`Symbol`, `ModelRef`, `Timestamp`)
//! - The validation report shape shared by model deployment and promotion
//! - Error types for configuration and persisted state
//! - Configuration loading with YAML/TOML/JSON support and environment overrides
//! - An injectable [`clock::Clock`] so schedulers can run against virtual time
//! - The pluggable [`storage::StateStore`] used to survive restarts
//! - A typed [`events::EventBus`] for rollback, promotion and training notifications

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

/// Core type definitions and `NewType` wrappers
pub mod types;

/// Error types
pub mod error;

/// Configuration management
pub mod config;

/// Time sources
pub mod clock;

/// Persisted state storage
pub mod storage;

/// Typed event notifications
pub mod events;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::*;
    pub use crate::error::{ConfigError, StorageError};
    pub use crate::events::*;
    pub use crate::storage::{FileStateStore, MemoryStateStore, StateStore};
    pub use crate::types::*;
}
