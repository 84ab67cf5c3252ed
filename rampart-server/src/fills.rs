//! Live fill intake.
//!
//! Fills arrive as JSON lines:
//!
//! ```json
//! {"symbol": "BTC-USDT", "side": "buy", "notional": "0.005", "pnl": "12.5"}
//! ```
//!
//! Each one is handed to [`PromotionGate::process_live_trade`]. Malformed or
//! refused fills are logged and skipped; they never stop the reader.

use rampart_core::types::{Side, Symbol};
use rampart_risk::{PromotionGate, TradeDecision};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// One fill as read from the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillRecord {
    /// Instrument
    pub symbol: Symbol,
    /// Direction
    pub side: Side,
    /// Notional fraction the order used
    pub notional: Decimal,
    /// Realized P&L
    pub pnl: Decimal,
}

/// Counters for one reader run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FillStats {
    /// Non-empty lines read
    pub read: u64,
    /// Fills the gate recorded
    pub accepted: u64,
    /// Fills the gate refused
    pub rejected: u64,
    /// Lines that did not parse
    pub malformed: u64,
    /// Accepted fills that moved the step
    pub step_changes: u64,
}

/// Feeds fills from `reader` into `gate` until end of input or shutdown.
///
/// The gate persists its state on every fill, so each fill is applied on the
/// blocking pool rather than on the reader's worker thread.
pub async fn feed_fills<R>(
    reader: R,
    gate: Arc<PromotionGate>,
    mut shutdown: broadcast::Receiver<()>,
) -> FillStats
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = FillStats::default();
    let mut lines = reader.lines();

    loop {
        let line = tokio::select! {
            _ = shutdown.recv() => {
                debug!("Fill reader stopping for shutdown");
                break;
            }
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!(?stats, "Fill stream closed");
                break;
            }
            Err(e) => {
                error!(error = %e, "Fill stream read failed");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }
        stats.read += 1;

        let gate = Arc::clone(&gate);
        let outcome = tokio::task::spawn_blocking(move || apply_line(line.trim(), &gate))
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "Fill task failed");
                LineOutcome::Rejected
            });
        stats.count(outcome);
    }

    stats
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineOutcome {
    Malformed,
    Rejected,
    Accepted { step_changed: bool },
}

impl FillStats {
    fn count(&mut self, outcome: LineOutcome) {
        match outcome {
            LineOutcome::Malformed => self.malformed += 1,
            LineOutcome::Rejected => self.rejected += 1,
            LineOutcome::Accepted { step_changed } => {
                self.accepted += 1;
                if step_changed {
                    self.step_changes += 1;
                }
            }
        }
    }
}

fn apply_line(line: &str, gate: &PromotionGate) -> LineOutcome {
    let fill: FillRecord = match serde_json::from_str(line) {
        Ok(fill) => fill,
        Err(e) => {
            warn!(error = %e, "Skipping malformed fill");
            return LineOutcome::Malformed;
        }
    };

    match gate.process_live_trade(fill.symbol.clone(), fill.side, fill.notional, fill.pnl) {
        Ok(decision) => {
            if let TradeDecision::Held { step } = decision {
                debug!(symbol = %fill.symbol, step, "Fill recorded");
            }
            LineOutcome::Accepted {
                step_changed: decision.changed_step(),
            }
        }
        Err(e) if e.is_invalid_call() => {
            warn!(symbol = %fill.symbol, error = %e, "Fill refused");
            LineOutcome::Rejected
        }
        Err(e) => {
            error!(symbol = %fill.symbol, error = %e, "Fill could not be recorded");
            LineOutcome::Rejected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rampart_core::clock::SystemClock;
    use rampart_core::events::EventBus;
    use rampart_core::types::ValidationReport;
    use rampart_core::storage::{FileStateStore, load_typed};
    use rampart_risk::{PromotionConfig, PromotionState, RollbackConfig, RollbackController};
    use std::time::Duration;

    fn gate() -> Arc<PromotionGate> {
        let clock = SystemClock::new_shared();
        Arc::new(
            PromotionGate::new(
                PromotionConfig::default(),
                RollbackController::new_shared(RollbackConfig::default(), clock.clone()),
                EventBus::new_shared(),
                clock,
            )
            .unwrap(),
        )
    }

    fn fill(pnl: &str) -> String {
        format!(r#"{{"symbol":"BTC-USDT","side":"buy","notional":"0.005","pnl":"{pnl}"}}"#)
    }

    #[tokio::test]
    async fn test_feeds_fills_into_gate() {
        let gate = gate();
        gate.initialize_promotion(&ValidationReport::approved(0.9, 1.2))
            .unwrap();
        let input = format!("{}\n\nnot json\n{}\n", fill("10"), fill("-4"));
        let (_tx, rx) = broadcast::channel(1);

        let stats = feed_fills(input.as_bytes(), Arc::clone(&gate), rx).await;

        assert_eq!(stats.read, 3);
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.rejected, 0);
        assert_eq!(gate.promotion_status().performance.trades, 2);
    }

    #[tokio::test]
    async fn test_fills_persist_through_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStateStore::open(dir.path()).unwrap());
        let clock = SystemClock::new_shared();
        let gate = Arc::new(
            PromotionGate::new(
                PromotionConfig::default(),
                RollbackController::new_shared(RollbackConfig::default(), clock.clone()),
                EventBus::new_shared(),
                clock,
            )
            .unwrap()
            .with_store(store)
            .unwrap(),
        );
        gate.initialize_promotion(&ValidationReport::approved(0.9, 1.2))
            .unwrap();
        let input: String = (0..30).map(|i| fill(if i % 2 == 0 { "3" } else { "2" }) + "\n").collect();
        let (_tx, rx) = broadcast::channel(1);

        let stats = feed_fills(input.as_bytes(), Arc::clone(&gate), rx).await;

        assert_eq!(stats.accepted, 30);
        let key = format!("promotion.{}", gate.config().strategy);
        let reopened = FileStateStore::open(dir.path()).unwrap();
        let saved: PromotionState = load_typed(&reopened, &key).unwrap().unwrap();
        assert_eq!(saved.ledger.len(), 30);
        assert_eq!(saved, gate.snapshot());
    }

    #[tokio::test]
    async fn test_fills_refused_while_not_live() {
        let gate = gate();
        let input = format!("{}\n", fill("1"));
        let (_tx, rx) = broadcast::channel(1);

        let stats = feed_fills(input.as_bytes(), Arc::clone(&gate), rx).await;

        assert_eq!(stats.accepted, 0);
        assert_eq!(stats.rejected, 1);
    }

    #[tokio::test]
    async fn test_negative_notional_refused() {
        let gate = gate();
        gate.initialize_promotion(&ValidationReport::approved(0.9, 1.2))
            .unwrap();
        let input = r#"{"symbol":"BTC-USDT","side":"sell","notional":"-0.005","pnl":"1"}"#;
        let (_tx, rx) = broadcast::channel(1);

        let stats = feed_fills(input.as_bytes(), Arc::clone(&gate), rx).await;

        assert_eq!(stats.rejected, 1);
        assert_eq!(gate.promotion_status().performance.trades, 0);
    }

    #[tokio::test]
    async fn test_losing_streak_counts_step_change() {
        let gate = gate();
        gate.initialize_promotion(&ValidationReport::approved(0.9, 1.2))
            .unwrap();
        let input: String = (0..5).map(|_| fill("-1") + "\n").collect();
        let (_tx, rx) = broadcast::channel(1);

        let stats = feed_fills(input.as_bytes(), Arc::clone(&gate), rx).await;

        assert_eq!(stats.accepted, 5);
        assert_eq!(stats.step_changes, 1);
        assert!(!gate.is_live());
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let gate = gate();
        let (mut writer, reader) = tokio::io::duplex(64);
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(async move {
            let reader = tokio::io::BufReader::new(reader);
            feed_fills(reader, gate, rx).await
        });

        tokio::io::AsyncWriteExt::write_all(&mut writer, b"\n")
            .await
            .unwrap();
        tx.send(()).unwrap();

        let stats = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats, FillStats::default());
    }
}
