//! SyncController: owns the process-wide sync flag.
//!
//! Reads are lock-shared and cheap; every session consults the flag once per
//! `text` message.  Writes go through [`SessionRegistry::broadcast_sync`] so
//! that the flag change and the `sync_state` broadcast happen under the
//! registry's membership lock.  A `text` that races a toggle may observe
//! either value.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;
use voice_relay_core::SyncState;

use crate::application::collaborators::SessionObserver;
use crate::application::session_registry::SessionRegistry;

/// Holds the sync flag and fans out its changes.
pub struct SyncController {
    state: RwLock<SyncState>,
    registry: Arc<SessionRegistry>,
    observer: Arc<dyn SessionObserver>,
}

impl SyncController {
    /// Creates a controller whose flag starts at `enabled`.
    pub fn new(
        enabled: bool,
        registry: Arc<SessionRegistry>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            state: RwLock::new(SyncState::new(enabled)),
            registry,
            observer,
        }
    }

    /// Current value of the flag.
    pub fn enabled(&self) -> bool {
        self.snapshot().enabled
    }

    /// Current flag together with its version.
    pub fn snapshot(&self) -> SyncState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inverts the flag, broadcasts `sync_state` and returns the new value.
    pub fn toggle(&self) -> bool {
        match self.apply(|state| Some(state.toggled())) {
            Some(next) => next.enabled,
            None => self.enabled(),
        }
    }

    /// Sets the flag.  Returns `true` if the value changed; setting the
    /// current value broadcasts nothing and notifies nobody.
    pub fn set(&self, enabled: bool) -> bool {
        self.apply(|state| state.with_enabled(enabled)).is_some()
    }

    fn apply<F>(&self, change: F) -> Option<SyncState>
    where
        F: FnOnce(SyncState) -> Option<SyncState>,
    {
        let changed = self.registry.broadcast_sync(|| {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let next = change(*state)?;
            *state = next;
            Some(next)
        });

        if let Some(next) = changed {
            info!(
                "sync {} (version {})",
                if next.enabled { "enabled" } else { "disabled" },
                next.version
            );
            self.observer.on_sync_changed(next.enabled);
        }
        changed
    }
}

impl std::fmt::Debug for SyncController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncController")
            .field("state", &self.snapshot())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
