use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::ValidationError;

/// Wall-clock instant in Unix milliseconds.
///
/// Arithmetic saturates and never goes below the epoch, so window starts
/// computed near zero (as under a manual clock in tests) stay valid.
///
/// ```
/// use rampart_core::types::Timestamp;
/// use std::time::Duration;
///
/// let open = Timestamp::try_from(1_704_067_200_000_i64).unwrap();
/// let close = open.add(Duration::from_secs(90));
/// assert_eq!(close.duration_since(open), Duration::from_secs(90));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

impl Timestamp {
    /// The Unix epoch.
    pub const ZERO: Self = Self(0);

    /// Wraps `millis` as-is; for literals in tests and fixtures.
    #[must_use]
    pub const fn new_unchecked(millis: i64) -> Self {
        Self(millis)
    }

    /// Reads the system clock. Prefer [`Clock`](crate::clock::Clock) in components.
    #[must_use]
    pub fn now() -> Self {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(Self::ZERO, |since| Self(millis(since)))
    }

    /// Raw milliseconds.
    #[must_use]
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// True at the epoch.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// `duration` later.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn add(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(millis(duration)))
    }

    /// `duration` earlier, clamped to the epoch.
    #[must_use]
    pub fn saturating_sub(self, duration: Duration) -> Self {
        Self(self.0.saturating_sub(millis(duration)).max(0))
    }

    /// Zero when `earlier` is actually later.
    #[must_use]
    pub fn duration_since(self, earlier: Self) -> Duration {
        let gap = self.0.saturating_sub(earlier.0);
        Duration::from_millis(u64::try_from(gap).unwrap_or(0))
    }
}

impl TryFrom<i64> for Timestamp {
    type Error = ValidationError;

    fn try_from(millis: i64) -> Result<Self, Self::Error> {
        if millis < 0 {
            Err(ValidationError::InvalidTimestamp(millis))
        } else {
            Ok(Self(millis))
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match DateTime::<Utc>::from_timestamp_millis(self.0) {
            Some(at) => write!(f, "{}", at.to_rfc3339()),
            None => write!(f, "{}ms", self.0),
        }
    }
}
