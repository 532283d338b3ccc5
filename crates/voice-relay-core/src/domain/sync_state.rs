//! The process-wide sync flag.
//!
//! When sync is off the host keeps its sessions open but refuses to type
//! anything.  Every change bumps `version`, which lets the registry tell which
//! sessions have already been told about the latest value.

use serde::{Deserialize, Serialize};

/// Snapshot of the sync flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// Whether relayed text is delivered to the sink.
    pub enabled: bool,
    /// Incremented on every change; never decreases.
    pub version: u64,
}

impl SyncState {
    /// Creates the initial state at version 0.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            version: 0,
        }
    }

    /// Returns the state with the flag inverted and the version bumped.
    pub fn toggled(self) -> Self {
        Self {
            enabled: !self.enabled,
            version: self.version.wrapping_add(1),
        }
    }

    /// Returns the state with the flag set to `enabled`, or `None` when it
    /// already has that value.
    pub fn with_enabled(self, enabled: bool) -> Option<Self> {
        (self.enabled != enabled).then(|| self.toggled())
    }
}

impl Default for SyncState {
    /// Sync starts enabled, matching a freshly launched desktop host.
    fn default() -> Self {
        Self::new(true)
    }
}
