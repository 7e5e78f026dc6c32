//! # Connection Manager
//!
//! Decides how to reach a server, per attempt:
//!
//! 1. Build the candidate list: known servers, last-active first; when none
//!    answers, fall back to LAN discovery and retry the finds.
//! 2. Per server, walk the address chain: local address (only when the
//!    device is on a local network), then wake-on-LAN + one local retry,
//!    then the remote address. The first address that answers a public
//!    system-info probe wins; later addresses are not tried.
//! 3. Validate a stored access token if present. Validation failure of any
//!    kind signs the server out but leaves it reachable.
//! 4. Persist the refreshed record and mark the server active.
//! 5. Bind (or reuse) the one long-lived client handle for the server id.
//!
//! Every per-address and per-candidate failure is caught and logged here;
//! only exhaustion of all candidates surfaces, and then as an
//! `Unavailable` result rather than an error.

use crate::error::{ConnectError, Result};
use crate::locator::ServerLocator;
use crate::reachability::ReachabilityCache;
use crate::registry::ClientRegistry;
use bridge_traits::api::{ApiClientFactory, PublicSystemInfo, RemoteApiClient};
use bridge_traits::credentials::{ConnectionMode, CredentialStore, ServerRecord};
use bridge_traits::network::NetworkBridge;
use chrono::Utc;
use core_runtime::config::CoreConfig;
use core_runtime::events::{ConnectionEvent, CoreEvent, EventBus};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// How long one reachability verdict stays trusted.
const REACHABILITY_TTL: Duration = Duration::from_secs(30);

/// How many probe targets the reachability cache remembers.
const REACHABILITY_CAPACITY: usize = 64;

/// Terminal state of one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No candidate address of any candidate server answered.
    Unavailable,
    /// A server is reachable but holds no valid session; the caller must
    /// sign in before authenticated calls.
    ServerSignIn,
    /// Reachable with a validated session.
    SignedIn,
}

/// Outcome of one connection attempt. Produced fresh per attempt, never
/// persisted.
#[derive(Clone)]
pub struct ConnectionResult {
    pub state: ConnectionState,
    pub server: Option<ServerRecord>,
    pub client: Option<Arc<dyn RemoteApiClient>>,
}

impl ConnectionResult {
    pub fn unavailable() -> Self {
        Self {
            state: ConnectionState::Unavailable,
            server: None,
            client: None,
        }
    }
}

impl std::fmt::Debug for ConnectionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionResult")
            .field("state", &self.state)
            .field("server", &self.server.as_ref().map(|s| &s.id))
            .finish_non_exhaustive()
    }
}

/// Connection management for all known servers.
pub struct ConnectionManager {
    config: CoreConfig,
    credential_store: Arc<dyn CredentialStore>,
    client_factory: Arc<dyn ApiClientFactory>,
    network: Arc<dyn NetworkBridge>,
    locator: ServerLocator,
    registry: ClientRegistry,
    reachability: ReachabilityCache,
    event_bus: EventBus,
}

impl ConnectionManager {
    /// Create a new connection manager.
    ///
    /// # Errors
    ///
    /// Fails fast on invalid configuration, before any I/O.
    pub fn new(
        config: CoreConfig,
        credential_store: Arc<dyn CredentialStore>,
        client_factory: Arc<dyn ApiClientFactory>,
        network: Arc<dyn NetworkBridge>,
        event_bus: EventBus,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ConnectError::Config(e.to_string()))?;

        let locator = ServerLocator::new(config.discovery.clone(), event_bus.clone());

        Ok(Self {
            config,
            credential_store,
            client_factory,
            network,
            locator,
            registry: ClientRegistry::new(),
            reachability: ReachabilityCache::new(REACHABILITY_CAPACITY, REACHABILITY_TTL),
            event_bus,
        })
    }

    /// The per-server bound client handles.
    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Connect to whichever known server answers first, falling back to LAN
    /// discovery when none does.
    #[instrument(skip(self, token))]
    pub async fn connect(&self, token: &CancellationToken) -> Result<ConnectionResult> {
        let credentials = self.credential_store.load().await?;
        let candidates = credentials.servers_by_recency();
        let mut attempted = candidates.len();

        for server in &candidates {
            if token.is_cancelled() {
                return Err(ConnectError::Cancelled);
            }
            let result = self.connect_to_server(server, token).await?;
            if result.state != ConnectionState::Unavailable {
                return Ok(result);
            }
        }

        // Nothing known answered; ask the LAN.
        let discovered = self
            .locator
            .find_servers(self.config.discovery.timeout, token)
            .await?;

        for found in discovered {
            if token.is_cancelled() {
                return Err(ConnectError::Cancelled);
            }

            let address = found.http_address();
            let server = credentials
                .servers
                .iter()
                .find(|s| s.local_address.as_deref() == Some(address.as_str()))
                .cloned()
                .unwrap_or_else(|| {
                    // The stable id is learned from the probe.
                    let mut record = ServerRecord::new("", found.name.clone());
                    record.local_address = Some(address.clone());
                    record
                });

            attempted += 1;
            let result = self.connect_to_server(&server, token).await?;
            if result.state != ConnectionState::Unavailable {
                return Ok(result);
            }
        }

        self.event_bus
            .emit(CoreEvent::Connection(ConnectionEvent::Unavailable {
                attempted,
            }))
            .ok();
        Ok(ConnectionResult::unavailable())
    }

    /// Run the address chain for one server and bind a client on success.
    #[instrument(skip(self, server, token), fields(server = %server.name))]
    pub async fn connect_to_server(
        &self,
        server: &ServerRecord,
        token: &CancellationToken,
    ) -> Result<ConnectionResult> {
        if token.is_cancelled() {
            return Err(ConnectError::Cancelled);
        }

        let mut record = server.clone();
        let Some((mode, address, client, info)) = self.select_address(&record, token).await
        else {
            debug!(server = %record.name, "No candidate address reachable");
            return Ok(ConnectionResult::unavailable());
        };

        record.import_system_info(&info);
        record.last_connection_mode = Some(mode);
        record.date_last_accessed = Some(Utc::now());

        // At most one handle per server id; the probe client is promoted on
        // first bind, and an existing handle is re-pointed instead.
        let client = self.registry.get_or_insert(&record.id, client).await;
        client.set_server_address(&address);

        let state = self
            .validate_authentication(&mut record, client.as_ref())
            .await;

        self.persist(&record).await?;

        self.event_bus
            .emit(CoreEvent::Connection(ConnectionEvent::Connected {
                server_id: record.id.clone(),
                server_name: record.name.clone(),
                signed_in: state == ConnectionState::SignedIn,
            }))
            .ok();

        Ok(ConnectionResult {
            state,
            server: Some(record),
            client: Some(client),
        })
    }

    /// Walk local -> wake + local retry -> remote, stopping at the first
    /// address that answers.
    async fn select_address(
        &self,
        server: &ServerRecord,
        token: &CancellationToken,
    ) -> Option<(
        ConnectionMode,
        String,
        Arc<dyn RemoteApiClient>,
        PublicSystemInfo,
    )> {
        if let Some(local) = server.address_for(ConnectionMode::Local) {
            if self.network.is_on_local_network().await {
                if let Some((client, info)) = self.probe_address(local).await {
                    return Some((ConnectionMode::Local, local.to_string(), client, info));
                }

                if !server.mac_addresses.is_empty() && !token.is_cancelled() {
                    self.wake_server(server).await;
                    tokio::time::sleep(self.config.wake_delay).await;
                    self.reachability.invalidate(local).await;
                    if let Some((client, info)) = self.probe_address(local).await {
                        return Some((ConnectionMode::Local, local.to_string(), client, info));
                    }
                }
            } else {
                debug!(server = %server.name, "Not on a local network, skipping local address");
            }
        }

        if let Some(remote) = server.address_for(ConnectionMode::Remote) {
            if let Some((client, info)) = self.probe_address(remote).await {
                return Some((ConnectionMode::Remote, remote.to_string(), client, info));
            }
        }

        None
    }

    /// Probe one address with a short timeout. Returns the probing client so
    /// a successful probe doubles as the bound handle candidate.
    async fn probe_address(
        &self,
        address: &str,
    ) -> Option<(Arc<dyn RemoteApiClient>, PublicSystemInfo)> {
        // A fresh negative verdict means the address is known dead; skip the
        // probe so the fallback chain moves on immediately.
        if self.reachability.get(address).await == Some(false) {
            debug!(address, "Skipping probe of cached-unreachable address");
            return None;
        }

        let client = self.client_factory.create(address);
        match tokio::time::timeout(self.config.probe_timeout, client.get_public_system_info())
            .await
        {
            Ok(Ok(info)) => {
                self.reachability.put(address, true).await;
                Some((client, info))
            }
            Ok(Err(e)) => {
                warn!(address, error = %e, "Address probe failed");
                self.reachability.put(address, false).await;
                None
            }
            Err(_) => {
                warn!(address, timeout = ?self.config.probe_timeout, "Address probe timed out");
                self.reachability.put(address, false).await;
                None
            }
        }
    }

    /// Validate the stored token, if any. Validation failure of any kind
    /// clears the stored session but never fails the connect.
    async fn validate_authentication(
        &self,
        record: &mut ServerRecord,
        client: &dyn RemoteApiClient,
    ) -> ConnectionState {
        let Some(access_token) = record.access_token.clone() else {
            return ConnectionState::ServerSignIn;
        };

        client.set_auth(Some(access_token), record.user_id.clone());
        match client.get_system_info().await {
            Ok(_) => ConnectionState::SignedIn,
            Err(e) => {
                warn!(server = %record.name, error = %e, "Stored token failed validation");
                record.clear_auth();
                client.set_auth(None, None);
                self.event_bus
                    .emit(CoreEvent::Connection(ConnectionEvent::SignedOut {
                        server_id: record.id.clone(),
                    }))
                    .ok();
                ConnectionState::ServerSignIn
            }
        }
    }

    /// Best-effort wake. Failures are logged and swallowed; the retry probe
    /// is the arbiter of whether the wake worked.
    async fn wake_server(&self, server: &ServerRecord) {
        for mac in &server.mac_addresses {
            debug!(server = %server.name, mac = %mac, "Sending wake-on-LAN");
            if let Err(e) = self.network.send_wake_on_lan(mac).await {
                warn!(server = %server.name, mac = %mac, error = %e, "Wake-on-LAN send failed");
            }
        }
    }

    async fn persist(&self, record: &ServerRecord) -> Result<()> {
        let mut credentials = self.credential_store.load().await?;
        credentials.add_or_update_server(record.clone());
        credentials.active_server_id = Some(record.id.clone());
        self.credential_store.save(&credentials).await?;
        Ok(())
    }
}
