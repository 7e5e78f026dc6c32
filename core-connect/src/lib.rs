//! # Connection Management
//!
//! Finds and binds media servers:
//!
//! - **Server Locator** (`locator`): one-shot UDP broadcast discovery of
//!   servers on the local subnet
//! - **Connection Manager** (`manager`): candidate ordering, the
//!   local -> wake-on-LAN -> remote fallback chain, token validation, and
//!   record persistence
//! - **Client Registry** (`registry`): at most one bound client handle per
//!   server id per process
//! - **Reachability** (`reachability`): local access probing and the shared
//!   TTL'd verdict cache

pub mod error;
pub mod locator;
pub mod manager;
pub mod reachability;
pub mod registry;

pub use error::{ConnectError, Result};
pub use locator::{DiscoveredServer, ServerLocator};
pub use manager::{ConnectionManager, ConnectionResult, ConnectionState};
pub use reachability::{AccessProbe, CachedAccessProbe, FsAccessProbe, ReachabilityCache};
pub use registry::ClientRegistry;
