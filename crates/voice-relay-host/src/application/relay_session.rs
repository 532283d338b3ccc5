//! Per-session protocol logic, independent of the transport.
//!
//! [`SessionProtocol`] turns one inbound payload into at most one reply and
//! at most one sink delivery.  The WebSocket plumbing in
//! `infrastructure::network::relay_server` feeds it frames in arrival order
//! and writes back whatever it returns.
//!
//! # Session lifecycle
//!
//! ```text
//!  Connecting ──► AwaitingMessage ◄──► Processing
//!      │                │                  │
//!      └────────────────┴──────────────────┴──► Closed
//! ```
//!
//! `Closed` is terminal; a closed session is never resumed.

use std::sync::Arc;

use tracing::{debug, trace};
use voice_relay_core::{decode_inbound, InboundFrame, InboundMessage, OutboundMessage};

use crate::application::collaborators::TextSink;
use crate::application::sync_controller::SyncController;

/// Lifecycle phase of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Handshake in progress; welcome not yet sent.
    Connecting,
    /// Idle, waiting for the next inbound frame.
    AwaitingMessage,
    /// Handling one inbound frame.
    Processing,
    /// Transport closed.  Terminal.
    Closed,
}

impl SessionPhase {
    /// Returns `true` if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Connecting, AwaitingMessage)
                | (AwaitingMessage, Processing)
                | (Processing, AwaitingMessage)
                | (Connecting | AwaitingMessage | Processing, Closed)
        )
    }
}

/// Protocol state and collaborators of one session.
pub struct SessionProtocol {
    phase: SessionPhase,
    sync: Arc<SyncController>,
    sink: Arc<dyn TextSink>,
}

impl SessionProtocol {
    pub fn new(sync: Arc<SyncController>, sink: Arc<dyn TextSink>) -> Self {
        Self {
            phase: SessionPhase::Connecting,
            sync,
            sink,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    fn advance(&mut self, next: SessionPhase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "illegal session transition {:?} -> {:?}",
            self.phase,
            next
        );
        if self.phase.can_transition_to(next) {
            self.phase = next;
        }
    }

    /// Marks the welcome as sent.
    pub fn opened(&mut self) {
        self.advance(SessionPhase::AwaitingMessage);
    }

    /// Marks the transport as closed.  Idempotent.
    pub fn close(&mut self) {
        if self.phase != SessionPhase::Closed {
            self.advance(SessionPhase::Closed);
        }
    }

    /// Handles one inbound text payload and returns the reply, if any.
    ///
    /// | payload                         | sync on           | sync off        |
    /// |---------------------------------|-------------------|-----------------|
    /// | `text`, non-empty               | deliver + `ack`   | `sync_disabled` |
    /// | `text`, empty                   | nothing           | `sync_disabled` |
    /// | `ping`                          | `pong`            | `pong`          |
    /// | not a JSON object, non-blank    | deliver, no reply | nothing         |
    /// | blank, or unknown JSON object   | nothing           | nothing         |
    pub fn handle_frame(&mut self, raw: &str) -> Option<OutboundMessage> {
        if self.phase == SessionPhase::Closed {
            return None;
        }
        self.advance(SessionPhase::Processing);
        let reply = self.dispatch(decode_inbound(raw));
        self.advance(SessionPhase::AwaitingMessage);
        reply
    }

    fn dispatch(&self, frame: InboundFrame) -> Option<OutboundMessage> {
        match frame {
            InboundFrame::Message(InboundMessage::Text { content }) => {
                if !self.sync.enabled() {
                    debug!("text ({} bytes) refused: sync disabled", content.len());
                    return Some(OutboundMessage::sync_disabled());
                }
                if content.is_empty() {
                    trace!("empty text ignored");
                    return None;
                }
                debug!("delivering text ({} bytes)", content.len());
                self.sink.deliver(&content);
                Some(OutboundMessage::ack())
            }
            InboundFrame::Message(InboundMessage::Ping) => {
                Some(OutboundMessage::pong(self.sync.enabled()))
            }
            InboundFrame::PlainText(raw) => {
                if self.sync.enabled() {
                    debug!("delivering plain-text payload ({} bytes)", raw.len());
                    self.sink.deliver(&raw);
                } else {
                    debug!("plain-text payload dropped: sync disabled");
                }
                None
            }
            InboundFrame::Blank | InboundFrame::Unrecognized { .. } => None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::collaborators::{MockTextSink, NoopObserver};
    use crate::application::session_registry::SessionRegistry;
    use mockall::predicate::eq;

    fn sync(enabled: bool) -> Arc<SyncController> {
        let registry = Arc::new(SessionRegistry::new(Arc::new(NoopObserver)));
        Arc::new(SyncController::new(enabled, registry, Arc::new(NoopObserver)))
    }

    fn protocol(enabled: bool, sink: MockTextSink) -> SessionProtocol {
        let mut p = SessionProtocol::new(sync(enabled), Arc::new(sink));
        p.opened();
        p
    }

    fn silent_sink() -> MockTextSink {
        let mut sink = MockTextSink::new();
        sink.expect_deliver().never();
        sink
    }

    // ── State machine ─────────────────────────────────────────────────────────

    #[test]
    fn test_phase_transitions() {
        use SessionPhase::*;
        assert!(Connecting.can_transition_to(AwaitingMessage));
        assert!(AwaitingMessage.can_transition_to(Processing));
        assert!(Processing.can_transition_to(AwaitingMessage));
        assert!(Processing.can_transition_to(Closed));
        assert!(!Closed.can_transition_to(AwaitingMessage));
        assert!(!Connecting.can_transition_to(Processing));
        assert!(!AwaitingMessage.can_transition_to(Connecting));
    }

    #[test]
    fn test_handle_frame_returns_to_awaiting() {
        let mut p = protocol(true, silent_sink());
        p.handle_frame(r#"{"type":"ping"}"#);
        assert_eq!(p.phase(), SessionPhase::AwaitingMessage);
    }

    #[test]
    fn test_closed_session_ignores_frames() {
        let mut p = protocol(true, silent_sink());
        p.close();
        p.close();
        assert_eq!(p.handle_frame(r#"{"type":"ping"}"#), None);
        assert_eq!(p.phase(), SessionPhase::Closed);
    }

    // ── Text ──────────────────────────────────────────────────────────────────

    #[test]
    fn test_text_enabled_delivers_once_and_acks() {
        // Arrange
        let mut sink = MockTextSink::new();
        sink.expect_deliver()
            .with(eq("hello world"))
            .times(1)
            .return_const(());
        let mut p = protocol(true, sink);

        // Act
        let reply = p.handle_frame(r#"{"type":"text","content":"hello world"}"#);

        // Assert
        assert_eq!(reply, Some(OutboundMessage::ack()));
    }

    #[test]
    fn test_text_disabled_replies_sync_disabled_without_delivery() {
        let mut p = protocol(false, silent_sink());

        let reply = p.handle_frame(r#"{"type":"text","content":"hello"}"#);

        assert_eq!(reply, Some(OutboundMessage::sync_disabled()));
    }

    #[test]
    fn test_empty_text_enabled_is_noop() {
        let mut p = protocol(true, silent_sink());
        assert_eq!(p.handle_frame(r#"{"type":"text","content":""}"#), None);
        assert_eq!(p.handle_frame(r#"{"type":"text"}"#), None);
    }

    #[test]
    fn test_empty_text_disabled_still_replies_sync_disabled() {
        let mut p = protocol(false, silent_sink());
        assert_eq!(
            p.handle_frame(r#"{"type":"text","content":""}"#),
            Some(OutboundMessage::sync_disabled())
        );
    }

    // ── Ping ──────────────────────────────────────────────────────────────────

    #[test]
    fn test_ping_replies_pong_with_current_flag() {
        let mut on = protocol(true, silent_sink());
        let mut off = protocol(false, silent_sink());

        assert_eq!(
            on.handle_frame(r#"{"type":"ping"}"#),
            Some(OutboundMessage::pong(true))
        );
        assert_eq!(
            off.handle_frame(r#"{"type":"ping"}"#),
            Some(OutboundMessage::pong(false))
        );
    }

    // ── Fallback ──────────────────────────────────────────────────────────────

    #[test]
    fn test_plain_text_enabled_delivers_without_reply() {
        let mut sink = MockTextSink::new();
        sink.expect_deliver()
            .with(eq("not json"))
            .times(1)
            .return_const(());
        let mut p = protocol(true, sink);

        assert_eq!(p.handle_frame("not json"), None);
    }

    #[test]
    fn test_plain_text_disabled_is_silent() {
        let mut p = protocol(false, silent_sink());
        assert_eq!(p.handle_frame("not json"), None);
    }

    #[test]
    fn test_blank_payload_is_ignored() {
        let mut p = protocol(true, silent_sink());
        assert_eq!(p.handle_frame("   \n"), None);
    }

    #[test]
    fn test_unknown_object_is_ignored() {
        let mut p = protocol(true, silent_sink());
        assert_eq!(p.handle_frame(r#"{"type":"mystery","content":"x"}"#), None);
        assert_eq!(p.handle_frame(r#"{"content":"no type"}"#), None);
    }

    #[test]
    fn test_sync_change_is_seen_by_next_frame() {
        // Arrange
        let sync = sync(true);
        let mut p = SessionProtocol::new(Arc::clone(&sync), Arc::new(silent_sink()));
        p.opened();

        // Act
        sync.set(false);

        // Assert
        assert_eq!(
            p.handle_frame(r#"{"type":"text","content":"late"}"#),
            Some(OutboundMessage::sync_disabled())
        );
    }
}
