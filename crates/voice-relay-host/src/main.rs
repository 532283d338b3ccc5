//! Voice Relay desktop host: entry point.
//!
//! Phones on the same network dictate text into a browser page or the
//! mobile app; the host receives it over a WebSocket and hands it to a text
//! sink for typing at the current input focus.
//!
//! # Usage
//!
//! ```text
//! voice-relay-host [OPTIONS]
//!
//! Options:
//!   --config <PATH>                 Config file [default: platform config dir]
//!   --bind <IP>                     Bind address for relay and web UI
//!   --port <PORT>                   Relay WebSocket port [default: 9527]
//!   --web-port <PORT>               Web UI HTTP port [default: 9528]
//!   --web-root <DIR>                Directory served as the web client
//!   --discovery-port <PORT>         Discovery broadcast port [default: 9530]
//!   --discovery-interval-ms <MS>    Announcement period [default: 2000]
//!   --announce-address <IP>         Fixed address to announce
//!   --keepalive-interval <SECS>     WebSocket ping period, 0 = off [default: 20]
//!   --name <NAME>                   Host name shown to clients
//!   --sink <stdout|log>             Where delivered text goes [default: stdout]
//!   --start-paused                  Start with sync disabled
//!   --no-discovery / --no-web / --no-console
//!   --log-level <LEVEL>             Used when RUST_LOG is unset [default: info]
//!   --write-config                  Save the effective settings to the config file
//! ```
//!
//! # Configuration precedence
//!
//! Command-line flag, then environment variable (`VOICE_RELAY_*`), then the
//! config file, then the built-in default.
//!
//! # Architecture overview
//!
//! ```text
//! Phone (JSON over WebSocket)          Phone (UDP listener)
//!       ↕                                    ↑
//! voice-relay-host  ← this process
//!   domain/          HostConfig
//!   application/     SessionRegistry, SyncController, SessionProtocol
//!   infrastructure/
//!     network/       relay_server, discovery beacon, web_ui
//!     storage/       config.toml
//!     sink/          stdout / log
//!     ui_bridge/     status observer, stdin console
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use voice_relay_host::application::{SessionObserver, SessionRegistry, SyncController};
use voice_relay_host::domain::HostConfig;
use voice_relay_host::infrastructure::network::{
    DiscoveryBeacon, HostAddress, RelayContext, RelayServer, UdpBroadcaster, WebUiServer,
    WebUiState,
};
use voice_relay_host::infrastructure::sink::build_sink;
use voice_relay_host::infrastructure::storage::config::{
    config_file_path, load_config_from, save_config_to, FileConfig,
};
use voice_relay_host::infrastructure::ui_bridge::{
    console::spawn_stdin_reader, run_console, Console, ConsoleExit, StatusObserver,
};
use voice_relay_host::infrastructure::Shutdown;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Voice Relay desktop host.
///
/// Every option left unset falls back to the config file, then to the
/// built-in default.
#[derive(Debug, Default, Parser)]
#[command(
    name = "voice-relay-host",
    about = "Relays dictated text from phones on the local network to this desktop",
    version
)]
struct Cli {
    /// Path of the TOML config file.
    #[arg(long, env = "VOICE_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// IP address the relay and web UI bind to (`0.0.0.0` for all interfaces).
    #[arg(long, env = "VOICE_RELAY_BIND")]
    bind: Option<String>,

    /// Relay WebSocket port.
    #[arg(long, env = "VOICE_RELAY_PORT")]
    port: Option<u16>,

    /// Web UI HTTP port.
    #[arg(long, env = "VOICE_RELAY_WEB_PORT")]
    web_port: Option<u16>,

    /// Directory served as the browser client.
    #[arg(long, env = "VOICE_RELAY_WEB_ROOT")]
    web_root: Option<PathBuf>,

    /// UDP port announcements are broadcast to.
    #[arg(long, env = "VOICE_RELAY_DISCOVERY_PORT")]
    discovery_port: Option<u16>,

    /// Milliseconds between announcements.
    #[arg(long, env = "VOICE_RELAY_DISCOVERY_INTERVAL_MS")]
    discovery_interval_ms: Option<u64>,

    /// Announce this address instead of detecting one.
    #[arg(long, env = "VOICE_RELAY_ANNOUNCE_ADDRESS")]
    announce_address: Option<String>,

    /// WebSocket ping period in seconds; 0 disables keepalive.
    #[arg(long, env = "VOICE_RELAY_KEEPALIVE_SECS")]
    keepalive_interval: Option<u64>,

    /// Host name shown to clients.
    #[arg(long, env = "VOICE_RELAY_NAME")]
    name: Option<String>,

    /// Text sink: `stdout` or `log`.
    #[arg(long, env = "VOICE_RELAY_SINK")]
    sink: Option<String>,

    /// Start with sync disabled.
    #[arg(long)]
    start_paused: bool,

    /// Do not broadcast discovery announcements.
    #[arg(long)]
    no_discovery: bool,

    /// Do not serve the web UI.
    #[arg(long)]
    no_web: bool,

    /// Do not read commands from stdin.
    #[arg(long)]
    no_console: bool,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, env = "VOICE_RELAY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Write the effective settings back to the config file.
    #[arg(long)]
    write_config: bool,
}

impl Cli {
    /// Overlays the options that were given onto `file`.
    fn apply_to(&self, file: &mut FileConfig) {
        if let Some(bind) = &self.bind {
            file.relay.bind_address = bind.clone();
        }
        if let Some(port) = self.port {
            file.relay.port = port;
        }
        if let Some(secs) = self.keepalive_interval {
            file.relay.keepalive_interval_secs = secs;
        }
        if let Some(port) = self.web_port {
            file.web.port = port;
        }
        if let Some(root) = &self.web_root {
            file.web.root = Some(root.clone());
        }
        if self.no_web {
            file.web.enabled = false;
        }
        if let Some(port) = self.discovery_port {
            file.discovery.port = port;
        }
        if let Some(ms) = self.discovery_interval_ms {
            file.discovery.interval_ms = ms;
        }
        if let Some(addr) = &self.announce_address {
            file.discovery.announce_address = Some(addr.clone());
        }
        if self.no_discovery {
            file.discovery.enabled = false;
        }
        if let Some(name) = &self.name {
            file.host.name = Some(name.clone());
        }
        if let Some(sink) = &self.sink {
            file.host.sink = sink.clone();
        }
        if self.start_paused {
            file.host.sync_enabled_on_start = false;
        }
        if let Some(level) = &self.log_level {
            file.host.log_level = level.clone();
        }
    }

    /// Resolves the config file path: `--config`, else the platform default.
    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config_file_path().context("no --config given and no platform config dir"),
        }
    }
}

fn os_host_name() -> String {
    let name = gethostname::gethostname().to_string_lossy().into_owned();
    if name.trim().is_empty() {
        HostConfig::default().host_name
    } else {
        name
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed and overlaid on the config file.
/// 2. `tracing_subscriber` is initialised; `RUST_LOG` wins over the
///    configured level.
/// 3. The shared [`SessionRegistry`] and [`SyncController`] are built.
/// 4. The relay, the discovery beacon and the web UI start independently;
///    one failing to bind does not stop the others.
/// 5. The process runs until Ctrl+C or a console `quit`, then every
///    component is asked to stop and drained.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Configuration ─────────────────────────────────────────────────────────
    let cli = Cli::parse();
    let config_path = cli.config_path()?;
    let mut file = load_config_from(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    cli.apply_to(&mut file);
    let config = file
        .to_host_config(&os_host_name())
        .context("invalid configuration")?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    if cli.write_config {
        save_config_to(&file, &config_path)
            .with_context(|| format!("failed to write {}", config_path.display()))?;
        info!("configuration written to {}", config_path.display());
    }

    info!(
        "Voice Relay host '{}' starting: relay={}, web={}, discovery={}",
        config.host_name,
        config.relay.bind_addr,
        if config.web.enabled { config.web.bind_addr.to_string() } else { "off".into() },
        if config.discovery.enabled { config.discovery.target.to_string() } else { "off".into() },
    );

    // ── Shared state ──────────────────────────────────────────────────────────
    let status = Arc::new(StatusObserver::new(config.sync_enabled_on_start));
    let observer: Arc<dyn SessionObserver> = status.clone();
    let registry = Arc::new(SessionRegistry::new(Arc::clone(&observer)));
    let sync = Arc::new(SyncController::new(
        config.sync_enabled_on_start,
        Arc::clone(&registry),
        Arc::clone(&observer),
    ));
    let address = HostAddress::from_config(&config.discovery);
    let shutdown = Arc::new(Shutdown::new());
    let mut components: JoinSet<&'static str> = JoinSet::new();

    // ── Relay ─────────────────────────────────────────────────────────────────
    let ctx = Arc::new(RelayContext {
        registry: Arc::clone(&registry),
        sync: Arc::clone(&sync),
        sink: build_sink(config.sink),
        host_name: config.host_name.clone(),
        keepalive: config.relay.keepalive,
    });
    let relay_port = match RelayServer::bind(&config.relay, ctx).await {
        Ok(server) => {
            let port = server.local_addr().port();
            let signal = shutdown.subscribe();
            components.spawn(async move {
                server.run(signal).await;
                "relay"
            });
            port
        }
        Err(e) => {
            error!("relay unavailable: {e}");
            config.relay.bind_addr.port()
        }
    };

    // ── Discovery beacon ──────────────────────────────────────────────────────
    if config.discovery.enabled {
        match UdpBroadcaster::bind().await {
            Ok(sender) => {
                let beacon =
                    DiscoveryBeacon::new(sender, &config.discovery, relay_port, &config.host_name);
                let signal = shutdown.subscribe();
                components.spawn(async move {
                    beacon.run(signal).await;
                    "discovery"
                });
            }
            Err(e) => error!("discovery unavailable: {e}"),
        }
    }

    // ── Web UI ────────────────────────────────────────────────────────────────
    if config.web.enabled {
        let state = Arc::new(WebUiState {
            registry: Arc::clone(&registry),
            sync: Arc::clone(&sync),
            host_name: config.host_name.clone(),
            address: address.clone(),
            relay_port,
        });
        match WebUiServer::bind(&config.web, state).await {
            Ok(server) => {
                let signal = shutdown.subscribe();
                components.spawn(async move {
                    if let Err(e) = server.run(signal).await {
                        error!("{e}");
                    }
                    "web UI"
                });
            }
            Err(e) => error!("web UI unavailable: {e}"),
        }
    }

    if components.is_empty() {
        anyhow::bail!("no component could start");
    }

    // ── Console ───────────────────────────────────────────────────────────────
    if !cli.no_console {
        match spawn_stdin_reader() {
            Ok(input) => {
                let console = Console {
                    registry: Arc::clone(&registry),
                    sync: Arc::clone(&sync),
                    status: Arc::clone(&status),
                    address: address.clone(),
                    relay_port,
                    host_name: config.host_name.clone(),
                };
                let shutdown = Arc::clone(&shutdown);
                tokio::spawn(async move {
                    match run_console(&console, input, tokio::io::stderr(), shutdown.subscribe())
                        .await
                    {
                        Ok(ConsoleExit::Quit) => shutdown.trigger(),
                        Ok(ConsoleExit::EndOfInput) => info!("console closed; use Ctrl+C to stop"),
                        Ok(ConsoleExit::Shutdown) => {}
                        Err(e) => warn!("console stopped: {e}"),
                    }
                });
            }
            Err(e) => warn!("console unavailable: {e}"),
        }
    }

    // ── Wait for stop ─────────────────────────────────────────────────────────
    let mut stopped = shutdown.subscribe();
    tokio::select! {
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!("received Ctrl+C; shutting down"),
            Err(e) => error!("failed to listen for Ctrl+C: {e}; shutting down"),
        },
        _ = stopped.wait() => info!("quit requested; shutting down"),
    }
    shutdown.trigger();

    while let Some(joined) = components.join_next().await {
        match joined {
            Ok(name) => info!("{name} stopped"),
            Err(e) => error!("component task failed: {e}"),
        }
    }

    info!("Voice Relay host stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
