//! Error types shared across the workspace.
//!
//! - [`ConfigError`] - configuration loading and validation failures
//! - [`StorageError`] - persisted state failures
//!
//! Component crates define their own error enums on top of these.

mod config;
mod storage;

pub use config::ConfigError;
pub use storage::StorageError;
