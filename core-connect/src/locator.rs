//! # LAN Server Discovery
//!
//! Finds media servers on the local subnet with a single UDP broadcast
//! probe. Servers answer from the probed port with a pipe-delimited payload
//! (`<marker>|<name>|<host:port>`); everything else is ignored.
//!
//! Discovery is best effort by contract: a silent network yields an empty
//! list, never an error.

use crate::error::Result;
use core_runtime::config::DiscoveryConfig;
use core_runtime::events::{ConnectionEvent, CoreEvent, EventBus};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Probe payload broadcast to the subnet.
const PROBE_MESSAGE: &str = "who is MediaServer?";

/// Replies must start with this marker, compared case-insensitively.
const REPLY_MARKER: &str = "MediaServer";

/// One server that answered the discovery probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredServer {
    pub name: String,
    /// `host:port` exactly as announced by the server.
    pub address: String,
}

impl DiscoveredServer {
    /// The announced endpoint as a probe-able base URL.
    pub fn http_address(&self) -> String {
        if self.address.starts_with("http://") || self.address.starts_with("https://") {
            self.address.clone()
        } else {
            format!("http://{}", self.address)
        }
    }
}

/// Parse one reply payload. Returns `None` for anything malformed; bad
/// payloads are dropped, not retried.
fn parse_reply(payload: &str) -> Option<DiscoveredServer> {
    let mut parts = payload.trim_end_matches('\0').trim().splitn(3, '|');

    let marker = parts.next()?;
    if !marker.eq_ignore_ascii_case(REPLY_MARKER) {
        return None;
    }

    let name = parts.next()?.trim();
    let address = parts.next()?.trim();
    if name.is_empty() || address.is_empty() {
        return None;
    }

    // The endpoint must at least look like host:port.
    let (host, port) = address.rsplit_once(':')?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return None;
    }

    Some(DiscoveredServer {
        name: name.to_string(),
        address: address.to_string(),
    })
}

/// Broadcast-based server discovery.
pub struct ServerLocator {
    config: DiscoveryConfig,
    event_bus: EventBus,
}

impl ServerLocator {
    pub fn new(config: DiscoveryConfig, event_bus: EventBus) -> Self {
        Self { config, event_bus }
    }

    /// Probe the subnet and collect replies until `window` elapses or
    /// cancellation fires.
    ///
    /// More than one server may answer; replies are deduplicated by address.
    /// "Nobody answered" is an empty list, not an error.
    #[instrument(skip(self, token), fields(port = self.config.port))]
    pub async fn find_servers(
        &self,
        window: Duration,
        token: &CancellationToken,
    ) -> Result<Vec<DiscoveredServer>> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_broadcast(true)?;

        let target = SocketAddrV4::new(self.config.broadcast_address, self.config.port);
        socket.send_to(PROBE_MESSAGE.as_bytes(), target).await?;
        debug!(%target, "Sent discovery probe");

        let deadline = Instant::now() + window;
        let mut buf = [0u8; 1024];
        let mut servers: Vec<DiscoveredServer> = Vec::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Discovery cancelled");
                    break;
                }
                received = tokio::time::timeout(remaining, socket.recv_from(&mut buf)) => {
                    let (len, from) = match received {
                        // Window elapsed with no further replies.
                        Err(_) => break,
                        Ok(Err(e)) => {
                            warn!(error = %e, "Discovery receive failed");
                            break;
                        }
                        Ok(Ok(reply)) => reply,
                    };

                    // Only the probed port may answer.
                    if from.port() != self.config.port {
                        debug!(%from, "Ignoring reply from unexpected port");
                        continue;
                    }

                    let payload = String::from_utf8_lossy(&buf[..len]);
                    let Some(server) = parse_reply(&payload) else {
                        debug!(%from, "Ignoring malformed discovery reply");
                        continue;
                    };

                    if servers.iter().any(|s| s.address == server.address) {
                        continue;
                    }

                    debug!(name = %server.name, address = %server.address, "Server discovered");
                    self.event_bus
                        .emit(CoreEvent::Connection(ConnectionEvent::ServerDiscovered {
                            name: server.name.clone(),
                            address: server.address.clone(),
                        }))
                        .ok();
                    servers.push(server);
                }
            }
        }

        Ok(servers)
    }
}
