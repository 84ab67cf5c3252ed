//! Time sources.
//!
//! Components read time through [`Clock`] so tests can drive schedulers with
//! [`ManualClock`] instead of wall-clock time.

use crate::types::Timestamp;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current timestamp.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Creates a shared system clock.
    #[must_use]
    pub fn new_shared() -> Arc<dyn Clock> {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Manually advanced clock for tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    /// Creates a clock starting at `start`.
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: AtomicI64::new(start.as_millis()),
        }
    }

    /// Creates a shared clock starting at `start`.
    #[must_use]
    pub fn new_shared(start: Timestamp) -> Arc<Self> {
        Arc::new(Self::new(start))
    }

    /// Moves the clock forward.
    #[allow(clippy::cast_possible_truncation)]
    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }

    /// Sets the clock to `to`.
    pub fn set(&self, to: Timestamp) {
        self.millis.store(to.as_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::new_unchecked(self.millis.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(Timestamp::new_unchecked(1_000));
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now().as_millis(), 3_000);
        clock.set(Timestamp::ZERO);
        assert!(clock.now().is_zero());
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        assert!(clock.now().as_millis() > 1_600_000_000_000);
    }
}
