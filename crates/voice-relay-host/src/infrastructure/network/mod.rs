//! Network adapters: the WebSocket relay, the UDP discovery beacon and the
//! HTTP server for the web client.

pub mod discovery;
pub mod relay_server;
pub mod web_ui;

pub use discovery::{DatagramSender, DiscoveryBeacon, DiscoveryError, HostAddress, UdpBroadcaster};
pub use relay_server::{RelayContext, RelayError, RelayServer};
pub use web_ui::{StatusDto, WebUiError, WebUiServer, WebUiState};
