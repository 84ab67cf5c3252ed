//! Drift alert levels.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a drift assessment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    /// Within normal bounds
    #[default]
    Green,
    /// Above the warning threshold
    Yellow,
    /// Above the rollback threshold
    Red,
}

impl AlertLevel {
    /// Returns true for the critical level.
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        matches!(self, Self::Red)
    }

    /// Returns the level as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Red => "red",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
