//! # Rampart Server
//!
//! Runs the safety envelope next to a live strategy.
//!
//! The server loads a [`ServerConfig`], restores persisted state, and then:
//! - retrains on the configured interval through external commands
//! - feeds JSON-lines fills from stdin into the promotion gate
//! - logs envelope events and periodic status
//! - shuts down cleanly on SIGINT/SIGTERM

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod collaborators;
pub mod config;
pub mod fills;
pub mod server;
pub mod shutdown;

pub use config::{CollaboratorConfig, CommandConfig, FillConfig, ServerConfig, ShutdownConfig};
pub use fills::{FillRecord, FillStats, feed_fills};
pub use server::{ENV_PREFIX, Envelope, RampartServer, ServerError, ServerState};
pub use shutdown::ShutdownController;
