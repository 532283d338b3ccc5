//! User-facing bridge: the status observer and the stdin control console.
//!
//! This is the only place the host talks to a human.  The application layer
//! sees it through the `SessionObserver` trait and through the same
//! `SyncController` calls a tray menu would make; nothing here is imported
//! by the application layer.

pub mod console;
pub mod status;

pub use console::{run_console, Console, ConsoleCommand, ConsoleExit};
pub use status::{HostStatus, StatusObserver};
