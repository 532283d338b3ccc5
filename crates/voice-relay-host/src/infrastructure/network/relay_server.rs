//! WebSocket relay server: accept loop and per-session tasks.
//!
//! This module is responsible for:
//!
//! 1. Binding the relay TCP listener.
//! 2. Accepting phone connections and upgrading each to a WebSocket.
//! 3. Admitting each session into the [`SessionRegistry`], which queues the
//!    `connected` welcome before any broadcast can reach it.
//! 4. Running one task per session that multiplexes, in a single
//!    `tokio::select!` loop:
//!    - inbound frames, handed to [`SessionProtocol`] strictly in order,
//!    - queued outbound messages (the welcome and `sync_state` broadcasts),
//!    - the keepalive ticker,
//!    - the shutdown signal.
//! 5. Stopping the accept loop on shutdown and then draining the sessions.
//!    A connection still in its handshake is dropped at once; sessions that
//!    have not finished within [`DRAIN_TIMEOUT`] are aborted.
//!
//! A failing session never affects the accept loop or its siblings.  Each
//! session removes itself from the registry when its task ends, however it
//! ends.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{interval_at, timeout, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    WebSocketStream,
};
use tracing::{debug, error, info, warn};
use voice_relay_core::{encode_outbound, OutboundMessage, SessionId, SessionInfo};

use crate::application::{SessionProtocol, SessionRegistry, SyncController, TextSink};
use crate::domain::config::{KeepaliveConfig, RelayConfig};
use crate::infrastructure::shutdown::ShutdownSignal;

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;

/// Longest a peer may take to complete the WebSocket upgrade.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest the relay waits for sessions to finish after shutdown.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(3);

/// Longest a session waits to hand its close frame to a peer.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Error type for the relay listener.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The listener could not be bound.
    #[error("failed to bind relay listener on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The bound listener's address could not be read.
    #[error("failed to read relay listener address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

/// Everything a session needs besides its socket.
pub struct RelayContext {
    pub registry: Arc<SessionRegistry>,
    pub sync: Arc<SyncController>,
    pub sink: Arc<dyn TextSink>,
    /// Name reported in every welcome.
    pub host_name: String,
    pub keepalive: KeepaliveConfig,
}

/// A bound, not yet running relay listener.
pub struct RelayServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    ctx: Arc<RelayContext>,
}

// ── Public API ────────────────────────────────────────────────────────────────

impl RelayServer {
    /// Binds the relay listener on `config.bind_addr`.
    ///
    /// Binding is separate from [`RelayServer::run`] so that callers (and
    /// tests using port 0) learn the real address before serving.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::BindFailed`] if the port is in use or not
    /// permitted.
    pub async fn bind(config: &RelayConfig, ctx: Arc<RelayContext>) -> Result<Self, RelayError> {
        let addr = config.bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| RelayError::BindFailed { addr, source })?;
        let local_addr = listener.local_addr().map_err(RelayError::LocalAddr)?;

        info!("relay listening on ws://{local_addr}");
        Ok(Self {
            listener,
            local_addr,
            ctx,
        })
    }

    /// Address the listener is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until `shutdown` fires, then waits up to
    /// [`DRAIN_TIMEOUT`] for every session to finish and aborts the rest.
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        let Self { listener, ctx, .. } = self;
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    info!("shutdown requested; relay stops accepting");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        debug!("incoming connection from {peer_addr}");
                        sessions.spawn(handle_session(
                            stream,
                            peer_addr,
                            Arc::clone(&ctx),
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        // Transient (e.g. out of file descriptors); keep serving.
                        error!("accept error: {e}");
                    }
                },
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    log_join(joined);
                }
            }
        }

        drop(listener);
        let draining = sessions.len();
        if draining > 0 {
            info!("draining {draining} session(s)");
        }
        if timeout(DRAIN_TIMEOUT, drain(&mut sessions)).await.is_err() {
            warn!(
                "{} session(s) still busy after {DRAIN_TIMEOUT:?}; aborting",
                sessions.len()
            );
            sessions.abort_all();
            drain(&mut sessions).await;
        }
        info!("relay stopped");
    }
}

async fn drain(sessions: &mut JoinSet<()>) {
    while let Some(joined) = sessions.join_next().await {
        log_join(joined);
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!("session task panicked: {e}");
        }
    }
}

// ── Per-session handler ───────────────────────────────────────────────────────

/// Removes the session from the registry when dropped, so every exit path
/// (including a panic inside the session) deregisters it.
struct Registration {
    registry: Arc<SessionRegistry>,
    id: SessionId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

/// Why a session's loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    ClientClosed,
    Shutdown,
    Evicted,
    IdleTimeout,
    TransportError,
}

async fn handle_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    ctx: Arc<RelayContext>,
    mut shutdown: ShutdownSignal,
) {
    let ws_stream = match handshake(stream, peer_addr, &mut shutdown).await {
        Ok(Some(ws_stream)) => ws_stream,
        Ok(None) => {
            debug!("{peer_addr}: shutdown before the handshake completed");
            return;
        }
        Err(e) => {
            warn!("{e:#}");
            return;
        }
    };
    match run_session(ws_stream, peer_addr, ctx, shutdown).await {
        Ok((id, reason)) => info!("session {id} ({peer_addr}) closed: {reason:?}"),
        Err(e) => warn!("session {peer_addr} ended with error: {e:#}"),
    }
}

/// Upgrades `stream` to a WebSocket.
///
/// Returns `Ok(None)` if shutdown fires first.
///
/// # Errors
///
/// The upgrade failed or took longer than [`HANDSHAKE_TIMEOUT`].
async fn handshake<S>(
    stream: S,
    peer_addr: SocketAddr,
    shutdown: &mut ShutdownSignal,
) -> anyhow::Result<Option<WebSocketStream<S>>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio::select! {
        _ = shutdown.wait() => Ok(None),
        upgraded = timeout(HANDSHAKE_TIMEOUT, accept_async(stream)) => {
            let ws_stream = upgraded
                .map_err(|_| {
                    anyhow::anyhow!(
                        "WebSocket handshake with {peer_addr} timed out after {HANDSHAKE_TIMEOUT:?}"
                    )
                })?
                .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;
            Ok(Some(ws_stream))
        }
    }
}

async fn run_session(
    ws_stream: WebSocketStream<TcpStream>,
    peer_addr: SocketAddr,
    ctx: Arc<RelayContext>,
    mut shutdown: ShutdownSignal,
) -> anyhow::Result<(SessionId, CloseReason)> {
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // ── Admission ─────────────────────────────────────────────────────────────
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let info = SessionInfo::new(SessionId::new(), peer_addr);
    let id = info.id;
    let state = ctx
        .registry
        .admit(info, out_tx, &ctx.sync, &ctx.host_name)
        .with_context(|| format!("session {peer_addr}: admission failed"))?;
    let _registration = Registration {
        registry: Arc::clone(&ctx.registry),
        id,
    };
    info!(
        "session {id} connected from {peer_addr} (sync {})",
        if state.enabled { "on" } else { "off" }
    );

    let mut protocol = SessionProtocol::new(Arc::clone(&ctx.sync), Arc::clone(&ctx.sink));

    // The welcome was queued by `admit` ahead of any broadcast.
    if let Some(welcome) = out_rx.recv().await {
        send_message(&mut ws_tx, &welcome)
            .await
            .with_context(|| format!("session {id}: failed to send welcome"))?;
    }
    protocol.opened();

    // ── Main loop ─────────────────────────────────────────────────────────────
    let mut keepalive = keepalive_ticker(ctx.keepalive);
    let mut last_inbound = Instant::now();

    let reason = loop {
        tokio::select! {
            _ = shutdown.wait() => {
                send_close(&mut ws_tx).await;
                break CloseReason::Shutdown;
            }

            queued = out_rx.recv() => match queued {
                Some(msg) => {
                    if let Err(e) = send_message(&mut ws_tx, &msg).await {
                        debug!("session {id}: send failed: {e:#}");
                        break CloseReason::TransportError;
                    }
                }
                None => break CloseReason::Evicted,
            },

            inbound = ws_rx.next() => {
                let payload = match inbound {
                    Some(Ok(WsMessage::Text(text))) => Some(text),
                    Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => Some(text),
                        Err(_) => {
                            debug!("session {id}: non-UTF-8 binary frame ignored");
                            None
                        }
                    },
                    Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => None,
                    Some(Ok(WsMessage::Close(_))) | None => break CloseReason::ClientClosed,
                    Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                        break CloseReason::ClientClosed;
                    }
                    Some(Err(e)) => {
                        debug!("session {id}: WebSocket error: {e}");
                        break CloseReason::TransportError;
                    }
                };

                last_inbound = Instant::now();
                ctx.registry.touch(id);

                if let Some(text) = payload {
                    if let Some(reply) = protocol.handle_frame(&text) {
                        if let Err(e) = send_message(&mut ws_tx, &reply).await {
                            debug!("session {id}: reply failed: {e:#}");
                            break CloseReason::TransportError;
                        }
                    }
                }
            }

            _ = next_tick(&mut keepalive) => {
                if last_inbound.elapsed() > ctx.keepalive.idle_limit() {
                    warn!("session {id}: no traffic for {:?}; closing", last_inbound.elapsed());
                    send_close(&mut ws_tx).await;
                    break CloseReason::IdleTimeout;
                }
                if ws_tx.send(WsMessage::Ping(Vec::new())).await.is_err() {
                    break CloseReason::TransportError;
                }
            }
        }
    };

    protocol.close();
    Ok((id, reason))
}

// ── Helpers ───────────────────────────────────────────────────────────────────

async fn send_message(ws_tx: &mut WsSink, msg: &OutboundMessage) -> anyhow::Result<()> {
    let json = encode_outbound(msg)?;
    ws_tx
        .send(WsMessage::Text(json))
        .await
        .with_context(|| format!("failed to send '{}'", msg.type_name()))
}

/// Best-effort close frame; the peer may already be gone or not reading.
async fn send_close(ws_tx: &mut WsSink) {
    let _ = timeout(CLOSE_TIMEOUT, ws_tx.send(WsMessage::Close(None))).await;
}

fn keepalive_ticker(keepalive: KeepaliveConfig) -> Option<Interval> {
    if !keepalive.is_enabled() {
        return None;
    }
    let mut ticker = interval_at(Instant::now() + keepalive.interval, keepalive.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(ticker)
}

/// Next keepalive tick, or never when keepalive is disabled.
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
