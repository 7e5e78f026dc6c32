//! # Core Configuration Module
//!
//! Settings shared by the connection and sync crates: device identity,
//! discovery parameters, and probe timeouts.
//!
//! ## Overview
//!
//! `CoreConfig` is plain data with fail-fast validation; host bridges are
//! injected directly into the components that use them rather than funneled
//! through configuration.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::config::CoreConfig;
//! use std::time::Duration;
//!
//! let config = CoreConfig::new("device-1234", "Living Room Tablet")
//!     .with_probe_timeout(Duration::from_secs(5));
//! config.validate().expect("valid config");
//! ```

use crate::error::{Error, Result};
use std::net::Ipv4Addr;
use std::time::Duration;

/// LAN discovery parameters.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// UDP port servers listen on for discovery probes.
    pub port: u16,
    /// Where the probe datagram is sent. The subnet-wide broadcast address
    /// by default; tests point this at loopback.
    pub broadcast_address: Ipv4Addr,
    /// How long one discovery window stays open collecting replies.
    pub timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: 7359,
            broadcast_address: Ipv4Addr::BROADCAST,
            timeout: Duration::from_secs(2),
        }
    }
}

/// Configuration for the sync core.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Stable identity of this device, as registered with servers.
    pub device_id: String,

    /// Human-readable device name.
    pub device_name: String,

    /// LAN discovery parameters.
    pub discovery: DiscoveryConfig,

    /// Timeout for one reachability probe against one candidate address.
    /// Deliberately short; an unreachable address should fail fast so the
    /// fallback chain can move on.
    pub probe_timeout: Duration,

    /// Grace period between sending wake-on-LAN packets and retrying the
    /// local address.
    pub wake_delay: Duration,
}

impl CoreConfig {
    pub fn new(device_id: impl Into<String>, device_name: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            device_name: device_name.into(),
            discovery: DiscoveryConfig::default(),
            probe_timeout: Duration::from_secs(5),
            wake_delay: Duration::from_secs(3),
        }
    }

    pub fn with_discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_wake_delay(mut self, delay: Duration) -> Self {
        self.wake_delay = delay;
        self
    }

    /// Fail-fast validation, called before any I/O is attempted.
    pub fn validate(&self) -> Result<()> {
        if self.device_id.trim().is_empty() {
            return Err(Error::Config("device_id must not be empty".to_string()));
        }
        if self.probe_timeout.is_zero() {
            return Err(Error::Config("probe_timeout must be non-zero".to_string()));
        }
        if self.discovery.timeout.is_zero() {
            return Err(Error::Config(
                "discovery timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
