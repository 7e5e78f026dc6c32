//! # Bound Client Registry
//!
//! One long-lived [`RemoteApiClient`] handle per server id, shared across
//! subsystems. The registry is an explicit value owned by the connection
//! manager rather than ambient process state; anything that needs a handle
//! reaches it through shared ownership of the manager.

use bridge_traits::api::RemoteApiClient;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Registry of bound client handles keyed by server id.
#[derive(Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<String, Arc<dyn RemoteApiClient>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The existing handle for a server, if one was ever bound.
    pub async fn get(&self, server_id: &str) -> Option<Arc<dyn RemoteApiClient>> {
        self.clients.lock().await.get(server_id).cloned()
    }

    /// Return the handle bound to `server_id`, inserting `candidate` only if
    /// none exists yet.
    ///
    /// Guarantees at most one authenticated session object per server per
    /// process: once a handle is bound, later candidates are dropped and the
    /// original is returned.
    pub async fn get_or_insert(
        &self,
        server_id: &str,
        candidate: Arc<dyn RemoteApiClient>,
    ) -> Arc<dyn RemoteApiClient> {
        let mut clients = self.clients.lock().await;
        match clients.get(server_id) {
            Some(existing) => existing.clone(),
            None => {
                debug!(server_id, "Binding client handle");
                clients.insert(server_id.to_string(), candidate.clone());
                candidate
            }
        }
    }

    /// Drop the handle for a server (e.g. when the server is forgotten).
    pub async fn remove(&self, server_id: &str) -> Option<Arc<dyn RemoteApiClient>> {
        self.clients.lock().await.remove(server_id)
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }
}
