//! Credential Storage Abstraction
//!
//! Persists the set of known servers and their session state between runs.
//! Encryption at rest is the host's concern; the core only defines the shape
//! of what is stored.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::PublicSystemInfo;
use crate::error::Result;

/// Which address class a successful connection used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionMode {
    Local,
    Remote,
}

/// One user known to be authorized on a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerUserInfo {
    pub id: String,
    /// Whether the user has signed in on this device and may use it offline.
    pub is_signed_in_offline: bool,
}

/// Everything the client remembers about one server.
///
/// `id` is assigned by the server and stable across address changes; every
/// other field may be rewritten whenever a connection attempt succeeds with
/// fresh system info.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    pub id: String,
    pub name: String,
    pub local_address: Option<String>,
    pub remote_address: Option<String>,
    /// MAC addresses usable to wake the server host before a local retry.
    #[serde(default)]
    pub mac_addresses: Vec<String>,
    pub access_token: Option<String>,
    pub exchange_token: Option<String>,
    /// The user the stored access token belongs to.
    pub user_id: Option<String>,
    #[serde(default)]
    pub users: Vec<ServerUserInfo>,
    /// Address class that worked last time. A hint for candidate ordering,
    /// never a substitute for a live probe.
    pub last_connection_mode: Option<ConnectionMode>,
    pub date_last_accessed: Option<DateTime<Utc>>,
}

impl ServerRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            local_address: None,
            remote_address: None,
            mac_addresses: Vec::new(),
            access_token: None,
            exchange_token: None,
            user_id: None,
            users: Vec::new(),
            last_connection_mode: None,
            date_last_accessed: None,
        }
    }

    /// Merge fresh system info into this record.
    ///
    /// The server assigns the stable `id` exactly once: a record created from
    /// a bare discovered address picks it up here, and an assigned id is
    /// never overwritten afterwards.
    pub fn import_system_info(&mut self, info: &PublicSystemInfo) {
        if self.id.is_empty() {
            self.id = info.id.clone();
        }
        self.name = info.server_name.clone();
        if let Some(local_address) = &info.local_address {
            self.local_address = Some(local_address.clone());
        }
    }

    /// The address to try for the given connection mode, if one is known.
    pub fn address_for(&self, mode: ConnectionMode) -> Option<&str> {
        match mode {
            ConnectionMode::Local => self.local_address.as_deref(),
            ConnectionMode::Remote => self.remote_address.as_deref(),
        }
    }

    /// Ids of users allowed to use this server from this device offline.
    pub fn offline_user_ids(&self) -> Vec<String> {
        self.users
            .iter()
            .filter(|u| u.is_signed_in_offline)
            .map(|u| u.id.clone())
            .collect()
    }

    /// Forget the session. The server itself stays known.
    pub fn clear_auth(&mut self) {
        self.access_token = None;
        self.user_id = None;
    }
}

/// The full persisted credential state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCredentials {
    #[serde(default)]
    pub servers: Vec<ServerRecord>,
    /// The server a fresh connect should try first.
    pub active_server_id: Option<String>,
}

impl ServerCredentials {
    pub fn server(&self, id: &str) -> Option<&ServerRecord> {
        self.servers.iter().find(|s| s.id == id)
    }

    /// Insert or merge a server record, matching on the stable id.
    pub fn add_or_update_server(&mut self, server: ServerRecord) {
        match self.servers.iter_mut().find(|s| s.id == server.id) {
            Some(existing) => *existing = server,
            None => self.servers.push(server),
        }
    }

    /// Known servers, most recently used first, the active server leading.
    pub fn servers_by_recency(&self) -> Vec<ServerRecord> {
        let mut servers = self.servers.clone();
        servers.sort_by(|a, b| b.date_last_accessed.cmp(&a.date_last_accessed));
        if let Some(active_id) = &self.active_server_id {
            if let Some(pos) = servers.iter().position(|s| &s.id == active_id) {
                let active = servers.remove(pos);
                servers.insert(0, active);
            }
        }
        servers
    }
}

/// Load/save boundary for [`ServerCredentials`].
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the persisted credentials. A store with no prior state returns
    /// the default (empty) credentials rather than an error.
    async fn load(&self) -> Result<ServerCredentials>;

    async fn save(&self, credentials: &ServerCredentials) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_system_info_keeps_id() {
        let mut server = ServerRecord::new("id-1", "Old Name");
        server.local_address = Some("http://10.0.0.5:8096".to_string());

        server.import_system_info(&PublicSystemInfo {
            id: "id-1".to_string(),
            server_name: "New Name".to_string(),
            version: None,
            local_address: None,
        });

        assert_eq!(server.id, "id-1");
        assert_eq!(server.name, "New Name");
        // Absent info fields leave the stored value alone.
        assert_eq!(server.local_address.as_deref(), Some("http://10.0.0.5:8096"));
    }

    #[test]
    fn test_servers_by_recency_puts_active_first() {
        let mut credentials = ServerCredentials::default();

        let mut a = ServerRecord::new("a", "A");
        a.date_last_accessed = Some(Utc::now());
        let mut b = ServerRecord::new("b", "B");
        b.date_last_accessed = Some(Utc::now() - chrono::Duration::hours(1));

        credentials.add_or_update_server(a);
        credentials.add_or_update_server(b);
        credentials.active_server_id = Some("b".to_string());

        let ordered = credentials.servers_by_recency();
        assert_eq!(ordered[0].id, "b");
        assert_eq!(ordered[1].id, "a");
    }

    #[test]
    fn test_add_or_update_merges_on_id() {
        let mut credentials = ServerCredentials::default();
        credentials.add_or_update_server(ServerRecord::new("a", "A"));

        let mut updated = ServerRecord::new("a", "A renamed");
        updated.access_token = Some("token".to_string());
        credentials.add_or_update_server(updated);

        assert_eq!(credentials.servers.len(), 1);
        assert_eq!(credentials.servers[0].name, "A renamed");
        assert_eq!(credentials.servers[0].access_token.as_deref(), Some("token"));
    }

    #[test]
    fn test_offline_user_ids_filters_signed_in() {
        let mut server = ServerRecord::new("a", "A");
        server.users = vec![
            ServerUserInfo {
                id: "u1".to_string(),
                is_signed_in_offline: true,
            },
            ServerUserInfo {
                id: "u2".to_string(),
                is_signed_in_offline: false,
            },
        ];

        assert_eq!(server.offline_user_ids(), vec!["u1".to_string()]);
    }
}
