//! Configuration management.
//!
//! - YAML, TOML and JSON configuration files
//! - Fail-fast validation with descriptive error messages
//! - `RAMPART_*` environment variable overrides
//!
//! # Example
//!
//! ```rust,ignore
//! use rampart_core::config::ConfigLoader;
//!
//! let config: ServerConfig = ConfigLoader::new()
//!     .with_env_prefix("RAMPART")
//!     .load_validated("rampart.yaml")?;
//! ```

mod loader;
mod traits;
pub mod validation;

pub use loader::{ConfigFormat, ConfigLoader};
pub use traits::{Configurable, Validatable};
pub use validation::{EnvOverride, ValidationContext, ValidationResult, Validator};
