//! # voice-relay-core
//!
//! Shared library for Voice Relay containing the JSON wire protocol spoken
//! between the desktop host and its mobile clients, the UDP discovery
//! datagram, and the small domain types (sync state, session identity) that
//! the host builds on.
//!
//! This crate has zero dependencies on sockets, async runtimes, or OS APIs.
//!
//! # Architecture overview
//!
//! Voice Relay lets a phone send dictated text to a desktop on the same
//! network, where it is typed at the current input focus.  The desktop runs
//! one host; any number of phones connect to it.
//!
//! - **`protocol`** – What travels over the wire.  Every WebSocket frame is a
//!   UTF-8 JSON object with a `"type"` discriminant.  Inbound frames that are
//!   not JSON objects fall back to plain text.
//!
//! - **`domain`** – Pure value types: the global [`SyncState`] flag with its
//!   version counter, and the [`SessionId`] / [`SessionInfo`] identity of a
//!   connected client.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `voice_relay_core::OutboundMessage` instead of the full module path.
pub use domain::session::{SessionId, SessionInfo};
pub use domain::sync_state::SyncState;
pub use protocol::codec::{
    decode_announcement, decode_inbound, decode_outbound, encode_announcement, encode_outbound,
    InboundFrame, ProtocolError,
};
pub use protocol::messages::{DiscoveryAnnouncement, InboundMessage, OutboundMessage};
