//! Application layer of the host.
//!
//! Orchestrates the shared core types into the relay's behaviour without any
//! socket or OS calls:
//!
//! - **`collaborators`**    – `TextSink` and `SessionObserver`, the ports the
//!   infrastructure implements.
//! - **`session_registry`** – the set of live sessions and broadcast.
//! - **`sync_controller`**  – the global sync flag.
//! - **`relay_session`**    – per-frame protocol handling for one session.

pub mod collaborators;
pub mod relay_session;
pub mod session_registry;
pub mod sync_controller;

pub use collaborators::{NoopObserver, SessionObserver, TextSink};
pub use relay_session::{SessionPhase, SessionProtocol};
pub use session_registry::{RegistryError, SessionRegistry};
pub use sync_controller::SyncController;
