//! Cooperative shutdown signal.
//!
//! Every place the pool suspends (between reconciliation cycles, between
//! session-start polls, between statement polls) waits through a
//! [`Shutdown`] so that raising the signal interrupts the wait immediately.
//! Dropping the [`ShutdownTrigger`] counts as raising it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::{PoolError, Result};

/// Create a linked trigger and signal.
#[must_use]
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (
        ShutdownTrigger { tx },
        Shutdown {
            rx,
            _keepalive: None,
        },
    )
}

/// Raises the shutdown signal.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Raise the signal for every linked [`Shutdown`].
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Get another signal linked to this trigger.
    #[must_use]
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
            _keepalive: None,
        }
    }
}

/// Observes the shutdown signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl Shutdown {
    /// A signal that is never raised.
    #[must_use]
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    /// Returns true once the signal has been raised or its trigger dropped.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Wait until the signal is raised.
    pub async fn triggered(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sleep for `duration` unless the signal is raised first.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Cancelled` if the signal is raised before or
    /// during the sleep.
    pub async fn sleep(&mut self, duration: Duration) -> Result<()> {
        tokio::select! {
            biased;
            () = self.triggered() => Err(PoolError::Cancelled),
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
