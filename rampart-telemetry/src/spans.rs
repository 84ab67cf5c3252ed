//! Span definitions for the envelope's long-running operations.

use tracing::{Span, info_span};

/// Span covering one retraining cycle.
///
/// # Example
///
/// ```
/// use rampart_telemetry::spans::training_run_span;
///
/// let span = training_run_span("3f2c", "scheduled");
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn training_run_span(run_id: &str, trigger: &str) -> Span {
    info_span!("training_run", run_id = %run_id, trigger = %trigger)
}

/// Span covering a promotion gate decision.
#[must_use]
pub fn promotion_span(strategy: &str, step: usize) -> Span {
    info_span!("promotion", strategy = %strategy, step = step)
}

/// Span covering a drift assessment for one symbol.
#[must_use]
pub fn drift_span(symbol: &str) -> Span {
    info_span!("drift_assessment", symbol = %symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans_construct_without_subscriber() {
        let _ = training_run_span("run", "forced").enter();
        let _ = promotion_span("default", 2).enter();
        let _ = drift_span("BTC-USDT").enter();
    }
}
