//! Domain entities for Voice Relay.
//!
//! Pure value types with no I/O.  The host's concurrency wrappers
//! (`SyncController`, `SessionRegistry`) own instances of these types behind
//! locks; the types themselves know nothing about threads.

/// The global sync flag and its version counter.
pub mod sync_state;

/// Identity and bookkeeping attributes of one connected client.
pub mod session;
