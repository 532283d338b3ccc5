//! JSON codec for relay frames and discovery datagrams.
//!
//! Outbound frames always encode cleanly.  Inbound frames are decoded
//! leniently: a client that cannot speak JSON may still send raw text, so
//! anything that is not a JSON object becomes [`InboundFrame::PlainText`]
//! instead of an error.
//!
//! ```text
//! raw frame ──► valid InboundMessage?  ──yes──► Message
//!                    │ no
//!                    ▼
//!               JSON object?           ──yes──► Unrecognized  (ignored)
//!                    │ no
//!                    ▼
//!               blank after trim?      ──yes──► Blank         (ignored)
//!                    │ no
//!                    ▼
//!                PlainText(raw)
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::protocol::messages::{DiscoveryAnnouncement, InboundMessage, OutboundMessage};

/// Errors that can occur while encoding or strictly decoding a payload.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The value could not be serialized.
    #[error("failed to encode {what}: {reason}")]
    Encode { what: &'static str, reason: String },

    /// The payload is not a valid instance of the expected message.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// Result of decoding one inbound relay frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// A well-formed protocol message.
    Message(InboundMessage),

    /// The frame was not a JSON object; the raw payload is relayed as text.
    PlainText(String),

    /// The frame was not JSON and contained only whitespace.
    Blank,

    /// A JSON object that is not a known message (missing or unknown `type`,
    /// or fields of the wrong shape).
    Unrecognized {
        /// The `type` field as sent, or `None` when absent or not a string.
        kind: Option<String>,
    },
}

/// Wire wrapper that adds the `"type"` discriminant to a discovery payload.
#[derive(Serialize, Deserialize)]
#[serde(tag = "type")]
enum DiscoveryDatagram {
    #[serde(rename = "voice_coding_server")]
    VoiceCodingServer(DiscoveryAnnouncement),
}

// ── Relay frames ──────────────────────────────────────────────────────────────

/// Classifies one inbound relay frame.
///
/// Never fails: malformed input is mapped onto the plain-text fallback or
/// reported as [`InboundFrame::Unrecognized`].
///
/// # Examples
///
/// ```rust
/// use voice_relay_core::{decode_inbound, InboundFrame, InboundMessage};
///
/// assert_eq!(
///     decode_inbound(r#"{"type":"ping"}"#),
///     InboundFrame::Message(InboundMessage::Ping)
/// );
/// assert_eq!(
///     decode_inbound("not json"),
///     InboundFrame::PlainText("not json".to_string())
/// );
/// ```
pub fn decode_inbound(raw: &str) -> InboundFrame {
    if let Ok(msg) = serde_json::from_str::<InboundMessage>(raw) {
        return InboundFrame::Message(msg);
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => {
            let kind = map
                .get("type")
                .and_then(Value::as_str)
                .map(str::to_string);
            debug!("unrecognized relay object (type={kind:?})");
            InboundFrame::Unrecognized { kind }
        }
        // Scalars and arrays are valid JSON but not protocol objects; a
        // spoken "42" should still reach the sink.
        _ if raw.trim().is_empty() => InboundFrame::Blank,
        _ => InboundFrame::PlainText(raw.to_string()),
    }
}

/// Encodes an outbound frame as a JSON text payload.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
pub fn encode_outbound(msg: &OutboundMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(msg).map_err(|e| ProtocolError::Encode {
        what: msg.type_name(),
        reason: e.to_string(),
    })
}

/// Strictly decodes an outbound frame.  Used by clients and tests.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedPayload`] for anything that is not a
/// valid host message.
pub fn decode_outbound(raw: &str) -> Result<OutboundMessage, ProtocolError> {
    serde_json::from_str(raw).map_err(|e| ProtocolError::MalformedPayload(e.to_string()))
}

// ── Discovery datagrams ───────────────────────────────────────────────────────

/// Encodes a discovery announcement as the bytes of one UDP datagram.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
pub fn encode_announcement(ann: &DiscoveryAnnouncement) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(&DiscoveryDatagram::VoiceCodingServer(ann.clone())).map_err(|e| {
        ProtocolError::Encode {
            what: "discovery announcement",
            reason: e.to_string(),
        }
    })
}

/// Decodes a discovery datagram.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedPayload`] if the bytes are not a
/// `voice_coding_server` announcement.
pub fn decode_announcement(bytes: &[u8]) -> Result<DiscoveryAnnouncement, ProtocolError> {
    let DiscoveryDatagram::VoiceCodingServer(ann) = serde_json::from_slice(bytes)
        .map_err(|e| ProtocolError::MalformedPayload(e.to_string()))?;
    Ok(ann)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
