//! Process-wide shutdown signal.
//!
//! A `tokio::sync::watch` channel carrying a single `bool`.  The relay
//! accept loop, the discovery beacon, the web UI server and every session
//! hold a [`ShutdownSignal`] and stop once it fires.

use tokio::sync::watch;

/// Owning side of the shutdown signal.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

/// Cloneable listening side of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Returns a new listener.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Fires the signal.  Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// Resolves once the signal fires, or once the [`Shutdown`] is dropped.
    ///
    /// Cancel-safe; usable as a `tokio::select!` branch in a loop.
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}
