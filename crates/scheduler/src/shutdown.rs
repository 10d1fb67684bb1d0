//! Cooperative shutdown signal shared by every scheduler loop
//!
//! Loops observe the signal between cycles only; an in-flight send always
//! finishes.

use std::time::Duration;

use tokio::sync::watch;

/// Sending half, held by the process owner
#[derive(Debug)]
pub struct ShutdownTrigger(watch::Sender<bool>);

/// Receiving half, cloned into every loop
#[derive(Debug, Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

/// Create a linked trigger / signal pair
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger(tx), ShutdownSignal(rx))
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // receivers may already be gone
        let _ = self.0.send(true);
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal(self.0.subscribe())
    }
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolve once shutdown is requested (or the trigger is dropped)
    pub async fn wait(&mut self) {
        while !*self.0.borrow_and_update() {
            if self.0.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sleep for `period`; returns true if shutdown arrived first
    pub async fn sleep(&mut self, period: Duration) -> bool {
        let elapsed = tokio::select! {
            _ = tokio::time::sleep(period) => true,
            _ = self.wait() => false,
        };
        !elapsed || self.is_triggered()
    }
}
