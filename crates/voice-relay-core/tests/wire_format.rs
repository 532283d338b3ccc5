//! Integration tests for the voice-relay-core wire format.
//!
//! These pin the exact JSON that crosses the network, because the mobile
//! clients are written against these shapes and are not built from this
//! workspace.  Each test compares against a literal JSON value rather than
//! re-decoding our own output.

use serde_json::{json, Value};
use voice_relay_core::{
    decode_announcement, decode_inbound, encode_announcement, encode_outbound,
    DiscoveryAnnouncement, InboundFrame, InboundMessage, OutboundMessage,
};

fn encoded(msg: &OutboundMessage) -> Value {
    let text = encode_outbound(msg).expect("encode must succeed");
    serde_json::from_str(&text).expect("encoder must emit JSON")
}

#[test]
fn test_connected_wire_shape() {
    assert_eq!(
        encoded(&OutboundMessage::connected(true, "DESKTOP-01")),
        json!({
            "type": "connected",
            "message": "Connected to Voice Coding server",
            "sync_enabled": true,
            "host_name": "DESKTOP-01",
        })
    );
}

#[test]
fn test_ack_wire_shape() {
    assert_eq!(
        encoded(&OutboundMessage::ack()),
        json!({"type": "ack", "message": "Text received and typed"})
    );
}

#[test]
fn test_sync_disabled_wire_shape() {
    assert_eq!(
        encoded(&OutboundMessage::sync_disabled()),
        json!({"type": "sync_disabled", "message": "Sync is disabled on PC"})
    );
}

#[test]
fn test_pong_and_sync_state_wire_shapes() {
    assert_eq!(
        encoded(&OutboundMessage::pong(true)),
        json!({"type": "pong", "sync_enabled": true})
    );
    assert_eq!(
        encoded(&OutboundMessage::sync_state(false)),
        json!({"type": "sync_state", "sync_enabled": false})
    );
}

#[test]
fn test_client_frames_as_sent_by_the_phone_app() {
    // Frames captured from the web client, including its extra timestamp field.
    let text = r#"{"type":"text","content":"print(\"你好\")","timestamp":1718000000}"#;
    let ping = r#"{"type":"ping"}"#;

    assert_eq!(
        decode_inbound(text),
        InboundFrame::Message(InboundMessage::Text {
            content: "print(\"你好\")".to_string()
        })
    );
    assert_eq!(decode_inbound(ping), InboundFrame::Message(InboundMessage::Ping));
}

#[test]
fn test_discovery_datagram_wire_shape() {
    // Arrange
    let ann = DiscoveryAnnouncement {
        ip: "192.168.137.1".parse().unwrap(),
        port: 9527,
        name: "DESKTOP-01".to_string(),
    };

    // Act
    let bytes = encode_announcement(&ann).unwrap();

    // Assert
    let value: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(
        value,
        json!({
            "type": "voice_coding_server",
            "ip": "192.168.137.1",
            "port": 9527,
            "name": "DESKTOP-01",
        })
    );
}

#[test]
fn test_discovery_datagram_from_other_implementation_decodes() {
    // Field order differs from ours; decoding must not care.
    let bytes = br#"{"name":"laptop","port":9527,"ip":"192.168.137.1","type":"voice_coding_server"}"#;

    let ann = decode_announcement(bytes).expect("decode must succeed");

    assert_eq!(ann.name, "laptop");
    assert_eq!(ann.relay_url(), "ws://192.168.137.1:9527");
}
