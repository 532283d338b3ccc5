//! Outbound ports of the application layer.
//!
//! The relay does not know how text reaches the focused window, nor how
//! status is shown to the user.  Both are injected as trait objects at
//! startup; infrastructure provides the real implementations and tests
//! provide recording doubles.
//!
//! Every method is fire-and-forget: it returns nothing, must not block for
//! long, and is called from inside session tasks.

/// Delivers relayed text to the local input focus.
#[cfg_attr(test, mockall::automock)]
pub trait TextSink: Send + Sync {
    /// Called once per accepted, non-empty text while sync is enabled.
    ///
    /// Failures are the sink's own concern; the client is acknowledged
    /// regardless.
    fn deliver(&self, text: &str);
}

/// Receives session-count and sync-flag changes.
#[cfg_attr(test, mockall::automock)]
pub trait SessionObserver: Send + Sync {
    /// The number of registered sessions changed to `count`.
    fn on_session_count_changed(&self, count: usize);

    /// The sync flag changed to `enabled`.
    fn on_sync_changed(&self, enabled: bool);
}

/// Observer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {
    fn on_session_count_changed(&self, _count: usize) {}
    fn on_sync_changed(&self, _enabled: bool) {}
}
