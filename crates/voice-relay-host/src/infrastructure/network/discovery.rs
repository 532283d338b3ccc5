//! UDP broadcast discovery beacon.
//!
//! Phones on the same network listen on the discovery port (default 9530)
//! and learn where the relay is from a small JSON datagram:
//!
//! ```json
//! {"type":"voice_coding_server","ip":"192.168.137.1","port":9527,"name":"DESKTOP-01"}
//! ```
//!
//! The beacon sends one such datagram every interval (default 2 s) to the
//! limited broadcast address, whether or not any client is connected.  It
//! never listens; there is no request/response exchange.
//!
//! # Host address
//!
//! The announced IP is re-resolved on every tick, because the hotspot
//! interface often comes up after the host has started.  Resolution prefers
//! a local address inside the hotspot subnet (`192.168.137.` by default) and
//! otherwise falls back to a fixed address.  A configured
//! `announce_address` bypasses detection entirely.
//!
//! # Failure handling
//!
//! Only socket creation is fatal, and only to the beacon.  A tick that fails
//! to encode or send is logged and the next tick tries again.  A tick still
//! in progress when shutdown fires is abandoned.

use std::net::{IpAddr, SocketAddr};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use voice_relay_core::{encode_announcement, DiscoveryAnnouncement, ProtocolError};

use crate::domain::config::DiscoveryConfig;
use crate::infrastructure::shutdown::ShutdownSignal;

/// Shortest accepted announcement period.
const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Address used only to pick the outbound interface; nothing is sent to it.
const ROUTE_PROBE_ADDR: &str = "8.8.8.8:80";

/// Upper bound on the host-name lookup done each tick.
const LOOKUP_TIMEOUT: Duration = Duration::from_millis(500);

/// Error type for discovery operations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The UDP socket could not be bound.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Broadcast permission could not be enabled on the socket.
    #[error("failed to enable broadcast on discovery socket: {0}")]
    Broadcast(#[source] std::io::Error),

    /// The announcement could not be encoded.
    #[error(transparent)]
    Encode(#[from] ProtocolError),

    /// The datagram could not be sent.
    #[error("failed to send announcement to {target}: {source}")]
    Send {
        target: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

// ── Transport seam ────────────────────────────────────────────────────────────

/// Sends one datagram.
///
/// The production implementation is [`UdpBroadcaster`]; tests inject
/// recording or failing senders.
#[async_trait]
pub trait DatagramSender: Send + Sync {
    /// Sends `payload` to `target` and returns the number of bytes sent.
    async fn send_to(&self, payload: &[u8], target: SocketAddr) -> std::io::Result<usize>;
}

#[async_trait]
impl<T: DatagramSender + ?Sized> DatagramSender for std::sync::Arc<T> {
    async fn send_to(&self, payload: &[u8], target: SocketAddr) -> std::io::Result<usize> {
        (**self).send_to(payload, target).await
    }
}

/// Broadcast-enabled UDP socket bound to an ephemeral port.
#[derive(Debug)]
pub struct UdpBroadcaster {
    socket: UdpSocket,
}

impl UdpBroadcaster {
    /// Binds `0.0.0.0:0` and enables `SO_BROADCAST`.
    ///
    /// # Errors
    ///
    /// [`DiscoveryError::BindFailed`] or [`DiscoveryError::Broadcast`].
    pub async fn bind() -> Result<Self, DiscoveryError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], 0));
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| DiscoveryError::BindFailed { addr, source })?;
        socket
            .set_broadcast(true)
            .map_err(DiscoveryError::Broadcast)?;
        Ok(Self { socket })
    }
}

#[async_trait]
impl DatagramSender for UdpBroadcaster {
    async fn send_to(&self, payload: &[u8], target: SocketAddr) -> std::io::Result<usize> {
        self.socket.send_to(payload, target).await
    }
}

// ── Host address resolution ───────────────────────────────────────────────────

/// How the announced IP is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAddress {
    /// Always announce this address.
    Fixed(IpAddr),
    /// Inspect local addresses on every tick.
    Detect {
        subnet_prefix: String,
        fallback: IpAddr,
    },
}

impl HostAddress {
    pub fn from_config(config: &DiscoveryConfig) -> Self {
        match config.announce_address {
            Some(ip) => Self::Fixed(ip),
            None => Self::Detect {
                subnet_prefix: config.subnet_prefix.clone(),
                fallback: config.fallback_address,
            },
        }
    }

    /// Resolves the address to announce now.
    pub async fn resolve(&self) -> IpAddr {
        match self {
            Self::Fixed(ip) => *ip,
            Self::Detect {
                subnet_prefix,
                fallback,
            } => select_host_ip(&local_candidate_addresses().await, subnet_prefix, *fallback),
        }
    }
}

/// Picks the first candidate whose textual form starts with `subnet_prefix`,
/// or `fallback` when none does.
pub fn select_host_ip(candidates: &[IpAddr], subnet_prefix: &str, fallback: IpAddr) -> IpAddr {
    candidates
        .iter()
        .copied()
        .find(|ip| ip.to_string().starts_with(subnet_prefix))
        .unwrap_or(fallback)
}

/// Best-effort list of this machine's non-loopback addresses.
///
/// Combines the address of the default-route interface (found by
/// connecting an unsent UDP socket) with every address the OS host name
/// resolves to.  Never fails; an empty list just means the fallback wins.
pub async fn local_candidate_addresses() -> Vec<IpAddr> {
    let mut found = Vec::new();

    if let Ok(probe) = UdpSocket::bind("0.0.0.0:0").await {
        if probe.connect(ROUTE_PROBE_ADDR).await.is_ok() {
            if let Ok(addr) = probe.local_addr() {
                found.push(addr.ip());
            }
        }
    }

    let host = gethostname::gethostname().to_string_lossy().into_owned();
    match timeout(LOOKUP_TIMEOUT, tokio::net::lookup_host((host.as_str(), 0))).await {
        Ok(Ok(addrs)) => found.extend(addrs.map(|a| a.ip())),
        Ok(Err(e)) => trace!("host name lookup for '{host}' failed: {e}"),
        Err(_) => debug!("host name lookup for '{host}' timed out"),
    }

    found.retain(|ip| !ip.is_loopback() && !ip.is_unspecified());
    let mut unique = Vec::with_capacity(found.len());
    for ip in found {
        if !unique.contains(&ip) {
            unique.push(ip);
        }
    }
    unique
}

// ── Beacon ────────────────────────────────────────────────────────────────────

/// Periodically broadcasts a [`DiscoveryAnnouncement`].
pub struct DiscoveryBeacon<S> {
    sender: S,
    address: HostAddress,
    relay_port: u16,
    host_name: String,
    target: SocketAddr,
    interval: Duration,
    last_ip: Mutex<Option<IpAddr>>,
}

impl<S: DatagramSender> DiscoveryBeacon<S> {
    /// Creates a beacon announcing `relay_port` under `host_name`.
    pub fn new(
        sender: S,
        config: &DiscoveryConfig,
        relay_port: u16,
        host_name: impl Into<String>,
    ) -> Self {
        Self {
            sender,
            address: HostAddress::from_config(config),
            relay_port,
            host_name: host_name.into(),
            target: config.target,
            interval: config.interval.max(MIN_INTERVAL),
            last_ip: Mutex::new(None),
        }
    }

    /// Builds the announcement for the current host address.
    pub async fn announcement(&self) -> DiscoveryAnnouncement {
        DiscoveryAnnouncement {
            ip: self.address.resolve().await,
            port: self.relay_port,
            name: self.host_name.clone(),
        }
    }

    /// Sends one announcement.
    ///
    /// # Errors
    ///
    /// [`DiscoveryError::Encode`] or [`DiscoveryError::Send`]; the beacon
    /// itself stays usable.
    pub async fn tick(&self) -> Result<DiscoveryAnnouncement, DiscoveryError> {
        let ann = self.announcement().await;
        self.note_address(ann.ip);

        let bytes = encode_announcement(&ann)?;
        self.sender
            .send_to(&bytes, self.target)
            .await
            .map_err(|source| DiscoveryError::Send {
                target: self.target,
                source,
            })?;
        trace!("announced {} to {}", ann.relay_url(), self.target);
        Ok(ann)
    }

    fn note_address(&self, ip: IpAddr) {
        let mut last = self.last_ip.lock().unwrap_or_else(PoisonError::into_inner);
        if *last != Some(ip) {
            info!("announcing relay at ws://{ip}:{}", self.relay_port);
            *last = Some(ip);
        }
    }

    /// Ticks every interval until `shutdown` fires.  The first tick is
    /// immediate.
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        info!(
            "discovery beacon started: every {:?} to {}",
            self.interval, self.target
        );
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = shutdown.wait() => break,
                        result = self.tick() => {
                            if let Err(e) = result {
                                warn!("discovery tick failed: {e}");
                            }
                        }
                    }
                }
            }
        }
        debug!("discovery beacon stopped");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use voice_relay_core::decode_announcement;

    use crate::infrastructure::shutdown::Shutdown;

    // ── Test doubles ──────────────────────────────────────────────────────────

    /// Records every datagram; fails the first `fail_first` sends.
    #[derive(Default)]
    struct RecordingSender {
        sent: std::sync::Mutex<Vec<(Vec<u8>, SocketAddr)>>,
        attempts: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl DatagramSender for RecordingSender {
        async fn send_to(&self, payload: &[u8], target: SocketAddr) -> std::io::Result<usize> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_first {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "injected failure",
                ));
            }
            self.sent.lock().unwrap().push((payload.to_vec(), target));
            Ok(payload.len())
        }
    }

    fn fixed_config(ip: [u8; 4]) -> DiscoveryConfig {
        DiscoveryConfig {
            announce_address: Some(IpAddr::from(ip)),
            ..DiscoveryConfig::default()
        }
    }

    // ── Address selection ─────────────────────────────────────────────────────

    #[test]
    fn test_select_prefers_hotspot_subnet() {
        let candidates: Vec<IpAddr> = vec![
            "10.0.0.5".parse().unwrap(),
            "192.168.137.1".parse().unwrap(),
            "192.168.1.20".parse().unwrap(),
        ];
        let fallback = IpAddr::V4(Ipv4Addr::new(192, 168, 137, 1));

        assert_eq!(
            select_host_ip(&candidates, "192.168.137.", fallback).to_string(),
            "192.168.137.1"
        );
    }

    #[test]
    fn test_select_falls_back_when_no_match() {
        let candidates: Vec<IpAddr> = vec!["10.0.0.5".parse().unwrap()];
        let fallback = IpAddr::V4(Ipv4Addr::new(192, 168, 137, 1));

        assert_eq!(select_host_ip(&candidates, "192.168.137.", fallback), fallback);
        assert_eq!(select_host_ip(&[], "192.168.137.", fallback), fallback);
    }

    #[test]
    fn test_prefix_match_is_textual() {
        // The prefix ends with a dot, so 192.168.13.x is not in the subnet.
        let candidates: Vec<IpAddr> = vec!["192.168.13.7".parse().unwrap()];
        let fallback = IpAddr::V4(Ipv4Addr::LOCALHOST);
        assert_eq!(select_host_ip(&candidates, "192.168.137.", fallback), fallback);
    }

    #[tokio::test]
    async fn test_fixed_address_bypasses_detection() {
        let addr = HostAddress::from_config(&fixed_config([10, 1, 2, 3]));
        assert_eq!(addr, HostAddress::Fixed(IpAddr::from([10, 1, 2, 3])));
        assert_eq!(addr.resolve().await, IpAddr::from([10, 1, 2, 3]));
    }

    #[tokio::test]
    async fn test_candidates_exclude_loopback() {
        let found = local_candidate_addresses().await;
        assert!(found.iter().all(|ip| !ip.is_loopback()));
    }

    // ── Beacon ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_tick_sends_decodable_announcement_to_target() {
        // Arrange
        let sender = Arc::new(RecordingSender::default());
        let beacon = DiscoveryBeacon::new(
            Arc::clone(&sender),
            &fixed_config([192, 168, 137, 1]),
            9527,
            "DESKTOP-01",
        );

        // Act
        beacon.tick().await.unwrap();

        // Assert
        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (bytes, target) = &sent[0];
        assert_eq!(target.to_string(), "255.255.255.255:9530");
        let ann = decode_announcement(bytes).unwrap();
        assert_eq!(ann.relay_url(), "ws://192.168.137.1:9527");
        assert_eq!(ann.name, "DESKTOP-01");
    }

    #[tokio::test]
    async fn test_failed_tick_heals_on_next_tick() {
        // Arrange
        let sender = Arc::new(RecordingSender {
            fail_first: 1,
            ..RecordingSender::default()
        });
        let beacon = DiscoveryBeacon::new(
            Arc::clone(&sender),
            &fixed_config([192, 168, 137, 1]),
            9527,
            "DESKTOP-01",
        );

        // Act
        let first = beacon.tick().await;
        let second = beacon.tick().await;

        // Assert
        assert!(matches!(first, Err(DiscoveryError::Send { .. })));
        assert!(second.is_ok());
        assert_eq!(sender.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_keeps_ticking_after_failure_and_stops_on_shutdown() {
        // Arrange
        let sender = Arc::new(RecordingSender {
            fail_first: 2,
            ..RecordingSender::default()
        });
        let config = DiscoveryConfig {
            interval: Duration::from_secs(2),
            ..fixed_config([192, 168, 137, 1])
        };
        let beacon = DiscoveryBeacon::new(Arc::clone(&sender), &config, 9527, "DESKTOP-01");
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(beacon.run(shutdown.subscribe()));

        // Act: ticks at t=0, 2, 4, 6
        tokio::time::sleep(Duration::from_millis(6_500)).await;
        shutdown.trigger();
        handle.await.unwrap();

        // Assert
        assert_eq!(sender.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(sender.sent.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = DiscoveryConfig {
            interval: Duration::ZERO,
            ..fixed_config([10, 0, 0, 1])
        };
        let beacon = DiscoveryBeacon::new(Arc::new(RecordingSender::default()), &config, 1, "x");
        assert_eq!(beacon.interval, MIN_INTERVAL);
    }

    /// Never completes a send.
    struct StalledSender;

    #[async_trait]
    impl DatagramSender for StalledSender {
        async fn send_to(&self, _payload: &[u8], _target: SocketAddr) -> std::io::Result<usize> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_stalled_tick() {
        // Arrange: the first tick hangs inside the send
        let beacon = DiscoveryBeacon::new(
            StalledSender,
            &fixed_config([192, 168, 137, 1]),
            9527,
            "DESKTOP-01",
        );
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(beacon.run(shutdown.subscribe()));
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Act
        shutdown.trigger();

        // Assert
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("beacon must stop while a tick is stalled")
            .unwrap();
    }
}
