//! SessionRegistry: the set of live client sessions.
//!
//! Each registered session is represented by the sending half of its
//! outbound channel.  The session task owns the receiving half and writes
//! whatever arrives to its WebSocket, so a broadcast never waits on a slow
//! client.
//!
//! # Locking
//!
//! Membership sits behind one `std::sync::Mutex`.  No `.await` ever happens
//! while it is held.  When a sync-flag change is broadcast, the flag's own
//! lock is taken *inside* the membership lock (see [`SessionRegistry::broadcast_sync`]);
//! admitting a session reads the flag the same way.  That single lock order
//! (membership, then flag) is what guarantees that a session either receives
//! the new flag in its welcome or receives it as a `sync_state` broadcast,
//! never neither and never a stale one.
//!
//! Observer callbacks run after the membership lock is released, one at a
//! time behind a separate notify lock.  Each callback reads the count while
//! holding that lock, so the last value an observer sees is always the
//! registry's current count, whatever order concurrent mutations finish in.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};
use voice_relay_core::{OutboundMessage, SessionId, SessionInfo, SyncState};

use crate::application::collaborators::SessionObserver;
use crate::application::sync_controller::SyncController;

/// Sending half of a session's outbound queue.
pub type OutboundSender = UnboundedSender<OutboundMessage>;

/// Error type for registry mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A session with this id is already registered.
    #[error("session {0} is already registered")]
    Duplicate(SessionId),

    /// The session's outbound queue was closed before it could be registered.
    #[error("outbound queue of session {0} is closed")]
    Closed(SessionId),
}

struct Member {
    info: SessionInfo,
    outbound: OutboundSender,
}

/// Thread-safe registry of connected sessions.
pub struct SessionRegistry {
    members: Mutex<HashMap<SessionId, Member>>,
    notify: Mutex<()>,
    observer: Arc<dyn SessionObserver>,
}

impl SessionRegistry {
    /// Creates an empty registry that reports count changes to `observer`.
    pub fn new(observer: Arc<dyn SessionObserver>) -> Self {
        Self {
            members: Mutex::new(HashMap::new()),
            notify: Mutex::new(()),
            observer,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Member>> {
        // A panic in another holder leaves the map itself consistent.
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reports the current count to the observer.  Must be called without
    /// the membership lock held.
    fn notify_count(&self) {
        let _serial = self.notify.lock().unwrap_or_else(PoisonError::into_inner);
        self.observer.on_session_count_changed(self.count());
    }

    fn insert(
        members: &mut HashMap<SessionId, Member>,
        info: SessionInfo,
        outbound: OutboundSender,
    ) -> Result<usize, RegistryError> {
        if members.contains_key(&info.id) {
            return Err(RegistryError::Duplicate(info.id));
        }
        if outbound.is_closed() {
            return Err(RegistryError::Closed(info.id));
        }
        members.insert(info.id, Member { info, outbound });
        Ok(members.len())
    }

    // ── Membership ────────────────────────────────────────────────────────────

    /// Registers a session and returns the new count.
    ///
    /// Atomic with respect to concurrent broadcasts: the session receives
    /// either all of a broadcast or none of it.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Duplicate`] if the id is already present, or
    /// [`RegistryError::Closed`] if `outbound` has no receiver.
    pub fn add(&self, info: SessionInfo, outbound: OutboundSender) -> Result<usize, RegistryError> {
        let count = Self::insert(&mut self.lock(), info, outbound)?;
        self.notify_count();
        Ok(count)
    }

    /// Registers a session and queues its welcome in one step.
    ///
    /// The `connected` message carrying the current sync flag is pushed onto
    /// `outbound` before the session becomes visible to broadcasts, so it is
    /// always the first thing the client receives.  Returns the sync state
    /// the welcome reported.
    ///
    /// # Errors
    ///
    /// Same as [`SessionRegistry::add`].
    pub fn admit(
        &self,
        mut info: SessionInfo,
        outbound: OutboundSender,
        sync: &SyncController,
        host_name: &str,
    ) -> Result<SyncState, RegistryError> {
        let state = {
            let mut members = self.lock();
            if members.contains_key(&info.id) {
                return Err(RegistryError::Duplicate(info.id));
            }

            let state = sync.snapshot();
            outbound
                .send(OutboundMessage::connected(state.enabled, host_name))
                .map_err(|_| RegistryError::Closed(info.id))?;
            info.observed_sync_version = state.version;

            Self::insert(&mut members, info, outbound)?;
            state
        };

        self.notify_count();
        Ok(state)
    }

    /// Removes a session.  Returns `false` (and notifies nobody) when the id
    /// was not registered.
    pub fn remove(&self, id: SessionId) -> bool {
        let removed = {
            let mut members = self.lock();
            members.remove(&id).map(|_| members.len())
        };

        match removed {
            Some(count) => {
                debug!("session {id} removed; {count} remaining");
                self.notify_count();
                true
            }
            None => false,
        }
    }

    /// Number of registered sessions.
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Records inbound activity for `id`.
    pub fn touch(&self, id: SessionId) {
        if let Some(member) = self.lock().get_mut(&id) {
            member.info.touch();
        }
    }

    /// Snapshot of all registered sessions, oldest first.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self.lock().values().map(|m| m.info.clone()).collect();
        infos.sort_by_key(|info| info.connected_at);
        infos
    }

    // ── Broadcast ─────────────────────────────────────────────────────────────

    /// Queues `msg` on every registered session and returns how many
    /// accepted it.
    ///
    /// A session whose queue is closed is removed; delivery to the others
    /// continues.
    pub fn broadcast(&self, msg: &OutboundMessage) -> usize {
        let (delivered, evicted) = {
            let mut members = self.lock();
            let evicted = Self::send_all(&mut members, msg, |_| {});
            (members.len(), evicted)
        };

        if evicted > 0 {
            self.notify_count();
        }
        delivered
    }

    /// Applies a sync-flag change and broadcasts the result while holding
    /// the membership lock.
    ///
    /// `change` runs under the lock and returns the new state, or `None` when
    /// nothing changed (in which case nothing is sent).  Sessions that
    /// accept the `sync_state` message are marked as having observed the
    /// new version.
    pub fn broadcast_sync<F>(&self, change: F) -> Option<SyncState>
    where
        F: FnOnce() -> Option<SyncState>,
    {
        let (next, remaining, evicted) = {
            let mut members = self.lock();
            let next = change()?;
            let msg = OutboundMessage::sync_state(next.enabled);
            let evicted = Self::send_all(&mut members, &msg, |info| {
                info.observed_sync_version = next.version;
            });
            (next, members.len(), evicted)
        };

        info!(
            "sync {} broadcast to {remaining} session(s)",
            if next.enabled { "on" } else { "off" }
        );
        if evicted > 0 {
            self.notify_count();
        }
        Some(next)
    }

    /// Sends `msg` to every member, dropping those whose queue is closed.
    /// Returns the number dropped.
    fn send_all(
        members: &mut HashMap<SessionId, Member>,
        msg: &OutboundMessage,
        mut on_sent: impl FnMut(&mut SessionInfo),
    ) -> usize {
        let before = members.len();
        members.retain(|id, member| match member.outbound.send(msg.clone()) {
            Ok(()) => {
                on_sent(&mut member.info);
                true
            }
            Err(_) => {
                debug!("session {id}: outbound queue closed; dropping from registry");
                false
            }
        });
        before - members.len()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("count", &self.count())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
