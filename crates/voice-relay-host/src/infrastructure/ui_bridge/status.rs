//! Status observer: turns registry and sync notifications into a single
//! user-facing [`HostStatus`].

use std::fmt;
use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;
use tracing::info;

use crate::application::SessionObserver;

/// What the user should see at a glance.
///
/// Paused wins over connected, and connected wins over waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    /// Sync on, no client connected.
    Waiting,
    /// Sync on, this many clients connected.
    Connected(usize),
    /// Sync off, regardless of clients.
    Paused,
}

impl HostStatus {
    /// Derives the status from the raw flag and session count.
    pub fn derive(sync_enabled: bool, sessions: usize) -> Self {
        match (sync_enabled, sessions) {
            (false, _) => Self::Paused,
            (true, 0) => Self::Waiting,
            (true, n) => Self::Connected(n),
        }
    }
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => f.write_str("waiting for a client"),
            Self::Connected(1) => f.write_str("1 client connected"),
            Self::Connected(n) => write!(f, "{n} clients connected"),
            Self::Paused => f.write_str("sync paused"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Inputs {
    sync_enabled: bool,
    sessions: usize,
}

/// [`SessionObserver`] that logs every change and publishes the derived
/// [`HostStatus`] on a watch channel.
#[derive(Debug)]
pub struct StatusObserver {
    inputs: Mutex<Inputs>,
    tx: watch::Sender<HostStatus>,
}

impl StatusObserver {
    pub fn new(sync_enabled: bool) -> Self {
        let (tx, _rx) = watch::channel(HostStatus::derive(sync_enabled, 0));
        Self {
            inputs: Mutex::new(Inputs {
                sync_enabled,
                sessions: 0,
            }),
            tx,
        }
    }

    /// Current status.
    pub fn status(&self) -> HostStatus {
        *self.tx.borrow()
    }

    /// Receiver that is notified whenever the status changes.
    pub fn subscribe(&self) -> watch::Receiver<HostStatus> {
        self.tx.subscribe()
    }

    fn update(&self, apply: impl FnOnce(&mut Inputs)) {
        let next = {
            let mut inputs = self.inputs.lock().unwrap_or_else(PoisonError::into_inner);
            apply(&mut inputs);
            HostStatus::derive(inputs.sync_enabled, inputs.sessions)
        };
        self.tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            info!("status: {next}");
            *current = next;
            true
        });
    }
}

impl SessionObserver for StatusObserver {
    fn on_session_count_changed(&self, count: usize) {
        self.update(|inputs| inputs.sessions = count);
    }

    fn on_sync_changed(&self, enabled: bool) {
        self.update(|inputs| inputs.sync_enabled = enabled);
    }
}
