//! # Desktop Bridge Implementations
//!
//! Native adapters for the bridge traits a desktop host provides to the
//! core: network capabilities and credential persistence.

pub mod credentials;
pub mod network;

pub use credentials::JsonCredentialStore;
pub use network::DesktopNetworkBridge;
