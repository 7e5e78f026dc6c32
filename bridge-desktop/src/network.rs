//! Desktop Network Bridge Implementation
//!
//! Local-network detection via the primary interface address, and
//! wake-on-LAN as a standard magic packet broadcast on UDP port 9.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::network::NetworkBridge;
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4};
use tokio::net::UdpSocket;
use tracing::debug;

/// Discard port; wake packets only need to reach the NIC, not a listener.
const WAKE_ON_LAN_PORT: u16 = 9;

/// Parse a MAC address in `AA:BB:CC:DD:EE:FF` or `AA-BB-CC-DD-EE-FF` form.
fn parse_mac(mac: &str) -> Result<[u8; 6]> {
    let parts: Vec<&str> = mac.split([':', '-']).collect();
    if parts.len() != 6 {
        return Err(BridgeError::OperationFailed(format!(
            "invalid MAC address '{}'",
            mac
        )));
    }

    let mut bytes = [0u8; 6];
    for (slot, part) in bytes.iter_mut().zip(parts) {
        *slot = u8::from_str_radix(part, 16).map_err(|_| {
            BridgeError::OperationFailed(format!("invalid MAC address '{}'", mac))
        })?;
    }
    Ok(bytes)
}

/// Magic packet layout: six 0xFF bytes followed by the MAC sixteen times.
fn build_magic_packet(mac: [u8; 6]) -> [u8; 102] {
    let mut packet = [0u8; 102];
    packet[..6].fill(0xFF);
    for repeat in 0..16 {
        let start = 6 + repeat * 6;
        packet[start..start + 6].copy_from_slice(&mac);
    }
    packet
}

/// Desktop implementation of [`NetworkBridge`].
///
/// "On a local network" is approximated by the primary interface carrying a
/// private-range IPv4 address, read off a connected (but never written-to)
/// UDP socket. Platform-specific interface enumeration would be more exact
/// but needs per-OS dependencies.
pub struct DesktopNetworkBridge;

impl DesktopNetworkBridge {
    pub fn new() -> Self {
        Self
    }

    async fn primary_local_ip(&self) -> Option<IpAddr> {
        // Connecting a UDP socket selects a route without sending a packet.
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await.ok()?;
        socket.connect("8.8.8.8:80").await.ok()?;
        socket.local_addr().ok().map(|addr| addr.ip())
    }
}

impl Default for DesktopNetworkBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkBridge for DesktopNetworkBridge {
    async fn is_on_local_network(&self) -> bool {
        match self.primary_local_ip().await {
            Some(IpAddr::V4(ip)) => {
                let local = ip.is_private();
                debug!(%ip, local, "Resolved primary interface address");
                local
            }
            Some(IpAddr::V6(_)) | None => false,
        }
    }

    async fn send_wake_on_lan(&self, mac_address: &str) -> Result<()> {
        let packet = build_magic_packet(parse_mac(mac_address)?);

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_broadcast(true)?;
        socket
            .send_to(
                &packet,
                SocketAddrV4::new(Ipv4Addr::BROADCAST, WAKE_ON_LAN_PORT),
            )
            .await?;

        debug!(mac = %mac_address, "Sent wake-on-LAN packet");
        Ok(())
    }
}
