//! Host-side domain types.
//!
//! Only configuration lives here; the protocol and sync/session value types
//! are shared with clients and live in `voice_relay_core`.

pub mod config;

pub use config::{
    DiscoveryConfig, HostConfig, KeepaliveConfig, RelayConfig, SinkKind, WebUiConfig,
};
