//! Shutdown coordination.
//!
//! A `watch` channel rather than `broadcast`: connections that subscribe
//! after the trigger still observe it.

use std::sync::Arc;

use tokio::sync::watch;

/// Process-wide shutdown switch. Cloning shares the same switch.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Trigger the shutdown signal. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end held by the accept loop and each connection.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been triggered.
    pub async fn recv(&mut self) {
        // An error means every sender is gone; nobody can trigger any more,
        // so treat it like a trigger.
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}
