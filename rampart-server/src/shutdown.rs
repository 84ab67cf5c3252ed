//! Shutdown coordination.
//!
//! One [`ShutdownController`] is shared by the retraining loop, the fill
//! reader and the status loop. Each task subscribes before it starts so a
//! signal that arrives early is never missed.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Stopping,
    Stopped,
}

/// Fans the stop signal out to every task and reports when teardown is done.
#[derive(Debug, Clone)]
pub struct ShutdownController {
    stop_tx: broadcast::Sender<()>,
    phase: Arc<watch::Sender<Phase>>,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    /// A controller in the running phase.
    #[must_use]
    pub fn new() -> Self {
        let (stop_tx, _) = broadcast::channel(1);
        let (phase, _) = watch::channel(Phase::Running);
        Self {
            stop_tx,
            phase: Arc::new(phase),
        }
    }

    /// Asks every subscriber to stop. Later calls do nothing.
    pub fn trigger(&self) {
        let first = self.phase.send_if_modified(|phase| {
            if *phase == Phase::Running {
                *phase = Phase::Stopping;
                true
            } else {
                false
            }
        });
        if first {
            info!("Shutdown requested");
            let _ = self.stop_tx.send(());
        }
    }

    /// True once [`trigger`](Self::trigger) has run.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.phase.borrow() != Phase::Running
    }

    /// Receiver that yields once [`trigger`](Self::trigger) runs.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.stop_tx.subscribe()
    }

    /// Records that teardown has finished.
    pub fn finish(&self) {
        self.phase.send_replace(Phase::Stopped);
    }

    /// Waits up to `timeout` for [`finish`](Self::finish); false if it never came.
    pub async fn wait_finished(&self, timeout: Duration) -> bool {
        let mut rx = self.phase.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(|p| *p == Phase::Stopped)).await {
            Ok(result) => result.is_ok(),
            Err(_) => {
                warn!(?timeout, "Teardown did not finish in time");
                false
            }
        }
    }
}

/// Triggers `controller` on SIGINT or SIGTERM, or Ctrl+C off unix.
///
/// A handler that cannot be installed is logged; the controller can still be
/// triggered directly.
pub async fn listen_for_signals(controller: ShutdownController) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let handlers = signal(SignalKind::interrupt())
            .and_then(|int| signal(SignalKind::terminate()).map(|term| (int, term)));
        let (mut sigint, mut sigterm) = match handlers {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "Cannot install signal handlers");
                return;
            }
        };

        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        info!(signal = name, "Signal received");
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Cannot install Ctrl+C handler");
            return;
        }
        info!(signal = "ctrl-c", "Signal received");
    }

    controller.trigger();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_once() {
        let controller = ShutdownController::new();
        let mut rx = controller.subscribe();
        assert!(!controller.is_triggered());

        controller.trigger();
        controller.trigger();

        assert!(controller.is_triggered());
        assert!(rx.recv().await.is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_clone_triggers_shared_state() {
        let controller = ShutdownController::new();
        let mut rx = controller.subscribe();

        let remote = controller.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            remote.trigger();
        });

        let result = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert!(result.is_ok());
        assert!(controller.is_triggered());
    }

    #[tokio::test]
    async fn test_finish_before_wait() {
        let controller = ShutdownController::new();
        controller.trigger();
        controller.finish();

        assert!(controller.wait_finished(Duration::from_millis(100)).await);
        assert!(controller.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_finished_times_out() {
        let controller = ShutdownController::new();
        controller.trigger();

        assert!(!controller.wait_finished(Duration::from_millis(50)).await);
    }
}
