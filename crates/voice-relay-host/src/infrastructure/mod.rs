//! Infrastructure layer for the host.
//!
//! Contains OS-facing adapters: the relay, discovery and web sockets,
//! config-file storage, text sinks, the console/status bridge and the
//! shutdown signal.
//!
//! **Dependency rule**: this layer may depend on `application`, `domain` and
//! `voice_relay_core`, but MUST NOT be imported by the `application` or
//! `domain` layers.

pub mod network;
pub mod shutdown;
pub mod sink;
pub mod storage;
pub mod ui_bridge;

pub use shutdown::{Shutdown, ShutdownSignal};
