//! Network Status Abstraction
//!
//! Answers the two questions the connection layer needs from the host
//! platform: "are we on a local network right now" and "wake that host".

use async_trait::async_trait;

use crate::error::Result;

/// Host-provided network capabilities.
///
/// # Platform Support
///
/// - **Desktop**: interface enumeration + a raw UDP socket
/// - **Mobile**: connectivity manager / reachability APIs
#[async_trait]
pub trait NetworkBridge: Send + Sync {
    /// Whether the device currently sits on a local (private-range) network.
    ///
    /// Gates whether a server's local address is worth probing at all; a
    /// device on cellular goes straight to the remote address.
    async fn is_on_local_network(&self) -> bool;

    /// Broadcast a wake-on-LAN packet for the given MAC address.
    ///
    /// Best effort: the caller treats failures as non-fatal and proceeds with
    /// its fallback chain either way.
    async fn send_wake_on_lan(&self, mac_address: &str) -> Result<()>;
}
