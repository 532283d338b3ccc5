//! Session identity.

use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant, SystemTime};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identity of one client connection.
///
/// A reconnecting phone gets a fresh id; ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a new random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    /// Prints the first UUID group only; enough to tell sessions apart in logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}

/// Bookkeeping attributes of a connected client.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: SessionId,
    /// Peer address of the client's TCP connection.
    pub remote_addr: SocketAddr,
    /// Wall-clock admission time, for display.
    pub connected_at: SystemTime,
    /// Monotonic time of the last inbound frame of any kind.
    pub last_activity: Instant,
    /// Version of the sync state this session was last told about.
    pub observed_sync_version: u64,
}

impl SessionInfo {
    /// Creates the record for a session connecting now.
    pub fn new(id: SessionId, remote_addr: SocketAddr) -> Self {
        Self {
            id,
            remote_addr,
            connected_at: SystemTime::now(),
            last_activity: Instant::now(),
            observed_sync_version: 0,
        }
    }

    /// Records inbound activity.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Time since the last inbound frame.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}
