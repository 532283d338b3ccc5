//! All Voice Relay wire message types.
//!
//! Every relay frame is a UTF-8 JSON object whose `"type"` field selects the
//! variant; the remaining fields sit flat beside it:
//!
//! ```json
//! {"type":"text","content":"hello world"}
//! {"type":"pong","sync_enabled":true}
//! ```
//!
//! Client and host speak different vocabularies, so each direction has its own
//! enum.  Sending a host-only message from the client side (or vice versa) is a
//! compile-time error.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Default TCP port of the relay WebSocket endpoint.
pub const DEFAULT_RELAY_PORT: u16 = 9527;

/// Default TCP port of the static web client.
pub const DEFAULT_WEB_PORT: u16 = 9528;

/// Default UDP port the discovery beacon broadcasts to.
pub const DEFAULT_DISCOVERY_PORT: u16 = 9530;

/// Value of the `"type"` field in every discovery datagram.
pub const DISCOVERY_TYPE: &str = "voice_coding_server";

/// Human-readable text carried by the `connected` welcome.
pub const WELCOME_TEXT: &str = "Connected to Voice Coding server";

/// Human-readable text carried by `ack`.
pub const ACK_TEXT: &str = "Text received and typed";

/// Human-readable text carried by `sync_disabled`.
pub const SYNC_DISABLED_TEXT: &str = "Sync is disabled on PC";

// ── Client → Host ─────────────────────────────────────────────────────────────

/// Messages a mobile client sends to the host.
///
/// # Serde representation
///
/// ```json
/// {"type":"text","content":"..."}
/// {"type":"ping"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Text to type at the desktop's input focus.
    Text {
        /// The text to relay.  A missing field decodes as the empty string,
        /// which the host treats as a no-op.
        #[serde(default)]
        content: String,
    },

    /// Liveness probe; also used by clients to poll the sync flag.
    Ping,
}

// ── Host → Client ─────────────────────────────────────────────────────────────

/// Messages the host sends to a mobile client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Welcome, sent exactly once as the first frame of every session.
    Connected {
        message: String,
        /// Value of the sync flag at the moment the session was admitted.
        sync_enabled: bool,
        /// Network name of the desktop.  Older hosts called this field
        /// `computer_name` or omitted it entirely.
        #[serde(default, alias = "computer_name")]
        host_name: String,
    },

    /// The preceding `text` was handed to the sink.
    Ack { message: String },

    /// Reply to `ping`, carrying the current sync flag.
    Pong { sync_enabled: bool },

    /// The preceding `text` was dropped because sync is off.
    SyncDisabled { message: String },

    /// Unsolicited broadcast after the sync flag changes.
    SyncState { sync_enabled: bool },
}

impl OutboundMessage {
    /// Builds the welcome frame.
    pub fn connected(sync_enabled: bool, host_name: impl Into<String>) -> Self {
        Self::Connected {
            message: WELCOME_TEXT.to_string(),
            sync_enabled,
            host_name: host_name.into(),
        }
    }

    /// Builds the acknowledgement sent after a successful delivery.
    pub fn ack() -> Self {
        Self::Ack {
            message: ACK_TEXT.to_string(),
        }
    }

    /// Builds the rejection sent when sync is off.
    pub fn sync_disabled() -> Self {
        Self::SyncDisabled {
            message: SYNC_DISABLED_TEXT.to_string(),
        }
    }

    /// Builds a ping reply.
    pub fn pong(sync_enabled: bool) -> Self {
        Self::Pong { sync_enabled }
    }

    /// Builds a sync-state broadcast.
    pub fn sync_state(sync_enabled: bool) -> Self {
        Self::SyncState { sync_enabled }
    }

    /// Returns the wire discriminant, for log lines that must not echo
    /// field values.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Ack { .. } => "ack",
            Self::Pong { .. } => "pong",
            Self::SyncDisabled { .. } => "sync_disabled",
            Self::SyncState { .. } => "sync_state",
        }
    }
}

// ── Discovery ─────────────────────────────────────────────────────────────────

/// Payload of one discovery datagram.
///
/// On the wire the struct is wrapped with `"type": "voice_coding_server"`:
///
/// ```json
/// {"type":"voice_coding_server","ip":"192.168.137.1","port":9527,"name":"DESKTOP-01"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryAnnouncement {
    /// Address clients should connect to.
    pub ip: IpAddr,
    /// Port of the relay WebSocket endpoint.
    pub port: u16,
    /// Network name of the desktop.
    pub name: String,
}

impl DiscoveryAnnouncement {
    /// Returns the `ws://` URL a client would open for this announcement.
    pub fn relay_url(&self) -> String {
        match self.ip {
            IpAddr::V4(ip) => format!("ws://{ip}:{}", self.port),
            IpAddr::V6(ip) => format!("ws://[{ip}]:{}", self.port),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
