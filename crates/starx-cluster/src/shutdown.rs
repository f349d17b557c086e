//! Awaitable one-way signal for node shutdown and session close.
//!
//! A [`ShutdownSignal`] can be cloned and shared across tasks. Triggering any
//! clone is observed by all of them, both through polling with
//! [`ShutdownSignal::is_triggered`] and by awaiting
//! [`ShutdownSignal::triggered`] inside a `tokio::select!`.
//!
//! ```
//! use starx_cluster::shutdown::ShutdownSignal;
//!
//! let signal = ShutdownSignal::new();
//! let observer = signal.clone();
//!
//! signal.trigger();
//! assert!(observer.is_triggered());
//! ```

use std::sync::Arc;
use tokio::sync::watch;

/// Cloneable, awaitable signal. Once triggered it stays triggered.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// Create a new, untriggered signal.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Trigger the signal. Returns `false` if it was already triggered.
    pub fn trigger(&self) -> bool {
        !self.tx.send_replace(true)
    }

    /// Check if the signal has been triggered.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the signal is triggered; immediately if it already was.
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}
