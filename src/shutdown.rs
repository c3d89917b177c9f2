//! Explicit stop signal for the long-running loops.
//!
//! On the payload both loops run until power loss. The trigger/signal pair gives the
//! host binary (Ctrl-C) and the tests a way to stop them at an iteration boundary.
//! Dropping the trigger counts as a stop request, so a loop can never outlive the
//! owner that spawned it.

use tokio::sync::watch;

/// Sending half: requests the paired loop to stop.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Receiving half, checked once per loop iteration and awaited while sleeping.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected trigger/signal pair.
pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

impl ShutdownTrigger {
    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl ShutdownSignal {
    /// Whether shutdown has been requested (or the trigger is gone).
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolve once shutdown is requested.
    pub async fn triggered(&mut self) {
        // `wait_for` errors only when the sender is dropped, which also means stop.
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_wakes_the_signal() {
        let (trigger, mut signal) = channel();
        assert!(!signal.is_triggered());

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), signal.triggered())
            .await
            .expect("signal did not resolve");
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn dropping_the_trigger_counts_as_shutdown() {
        let (trigger, mut signal) = channel();
        drop(trigger);
        assert!(signal.is_triggered());
        tokio::time::timeout(Duration::from_secs(1), signal.triggered())
            .await
            .expect("signal did not resolve");
    }
}
