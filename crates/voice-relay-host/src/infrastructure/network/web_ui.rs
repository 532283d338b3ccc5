//! HTTP server for the browser client and host status.
//!
//! Phones without the native app open `http://<host>:9528/` and get the web
//! client from the configured static directory.  The page then opens the
//! relay WebSocket on the relay port.
//!
//! Routes:
//!
//! | route             | response                                          |
//! |-------------------|---------------------------------------------------|
//! | `GET /api/status` | [`StatusDto`] as JSON                             |
//! | anything else     | file from `web.root` (404 when no root is set)    |
//!
//! Every response carries `Access-Control-Allow-Origin: *`.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, Method},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{info, warn};
use voice_relay_core::DiscoveryAnnouncement;

use crate::application::{SessionRegistry, SyncController};
use crate::domain::config::WebUiConfig;
use crate::infrastructure::network::discovery::HostAddress;
use crate::infrastructure::shutdown::ShutdownSignal;

/// Error type for the web UI server.
#[derive(Debug, Error)]
pub enum WebUiError {
    /// The HTTP listener could not be bound.
    #[error("failed to bind web UI listener on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with an I/O error.
    #[error("web UI server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Body of `GET /api/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDto {
    pub sync_enabled: bool,
    pub connected_clients: usize,
    pub host_name: String,
    pub host_ip: String,
    /// `ws://` URL a client should connect to.
    pub relay_url: String,
}

/// Shared state of the HTTP handlers.
pub struct WebUiState {
    pub registry: Arc<SessionRegistry>,
    pub sync: Arc<SyncController>,
    pub host_name: String,
    pub address: HostAddress,
    pub relay_port: u16,
}

impl WebUiState {
    /// Builds the current status snapshot.
    pub async fn status(&self) -> StatusDto {
        let ip = self.address.resolve().await;
        let relay_url = DiscoveryAnnouncement {
            ip,
            port: self.relay_port,
            name: self.host_name.clone(),
        }
        .relay_url();

        StatusDto {
            sync_enabled: self.sync.enabled(),
            connected_clients: self.registry.count(),
            host_name: self.host_name.clone(),
            host_ip: ip.to_string(),
            relay_url,
        }
    }
}

async fn status_handler(State(state): State<Arc<WebUiState>>) -> Json<StatusDto> {
    Json(state.status().await)
}

/// Builds the router; static files are served only when `root` is set.
pub fn router(state: Arc<WebUiState>, root: Option<&Path>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .allow_origin(Any);

    let mut app = Router::new().route("/api/status", get(status_handler));
    if let Some(root) = root {
        app = app.fallback_service(ServeDir::new(root));
    }

    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    )
    .with_state(state)
}

/// A bound, not yet running web UI server.
pub struct WebUiServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    app: Router,
}

impl WebUiServer {
    /// Binds the HTTP listener.
    ///
    /// # Errors
    ///
    /// [`WebUiError::BindFailed`] if the port is unavailable.
    pub async fn bind(config: &WebUiConfig, state: Arc<WebUiState>) -> Result<Self, WebUiError> {
        let addr = config.bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| WebUiError::BindFailed { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| WebUiError::BindFailed { addr, source })?;

        match &config.root {
            Some(root) if !root.is_dir() => {
                warn!("web root {} is not a directory; static files will 404", root.display());
            }
            Some(root) => info!("serving web client from {}", root.display()),
            None => info!("no web root configured; serving /api/status only"),
        }

        Ok(Self {
            listener,
            local_addr,
            app: router(state, config.root.as_deref()),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// [`WebUiError::Serve`] if the server fails.
    pub async fn run(self, mut shutdown: ShutdownSignal) -> Result<(), WebUiError> {
        info!("web UI listening on http://{}", self.local_addr);
        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await
            .map_err(WebUiError::Serve)?;
        info!("web UI stopped");
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
