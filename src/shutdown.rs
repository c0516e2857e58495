//! The SIGTERM drain-and-exit coordinator.
//!
//! Runs once, driven from a single task so the "flip readiness, remove the
//! lock file, stop accepting, wait for drain" sequence can never run twice
//! concurrently — doing so from more than one place is what the connection
//! engine's `close()` would call a double-close: harmless there (the second
//! call is a no-op), but a second coordinator racing the first here could
//! drop the in-flight count to zero and exit while genuinely live requests
//! are still running.

use crate::{config::Config, state::{InFlight, ReadyState}};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Instant};

/// Handle used to tell the accept loops to stop taking new connections.
pub struct ShutdownSignal {
    sender: watch::Sender<bool>,
}

impl ShutdownSignal {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (sender, receiver) = watch::channel(false);
        (Self { sender }, receiver)
    }

    fn trigger(&self) {
        let _ = self.sender.send(true);
    }
}

/// Waits for SIGTERM, then drains in-flight requests before returning.
///
/// Sequence: mark not-ready, remove the lock file (so a probe mid-drain sees
/// the process as down), stop the accept loops, then poll the in-flight
/// gauge at the configured health-check cadence until it reaches zero or
/// `write_timeout` elapses, whichever comes first.
pub async fn wait_for_signal_and_drain(
    config: Arc<Config>,
    ready: Arc<ReadyState>,
    in_flight: Arc<InFlight>,
    signal: ShutdownSignal,
) {
    let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(term) => term,
        Err(err) => {
            tracing::error!(%err, "failed to install SIGTERM handler; shutdown will never be triggered");
            return;
        }
    };
    term.recv().await;

    tracing::info!("received SIGTERM, draining in-flight requests");
    ready.set_not_ready();
    crate::lock::remove();
    signal.trigger();

    let deadline = Instant::now() + config.write_timeout;
    let mut ticker = interval(config.healthcheck_interval.max(std::time::Duration::from_millis(50)));

    loop {
        let remaining = in_flight.count();
        if remaining == 0 {
            tracing::info!("drain complete, no in-flight requests remain");
            return;
        }
        if Instant::now() >= deadline {
            tracing::warn!(remaining, "shutdown deadline reached with requests still in flight");
            return;
        }

        tracing::debug!(remaining, "waiting for in-flight requests to drain");
        ticker.tick().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_marks_receiver_as_shut_down() {
        let (signal, mut receiver) = ShutdownSignal::new();
        assert!(!*receiver.borrow_and_update());

        signal.trigger();
        assert!(receiver.has_changed().unwrap());
        assert!(*receiver.borrow_and_update());
    }
}
