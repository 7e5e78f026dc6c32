//! # Offline User Reconciliation
//!
//! Keeps locally cached user records and avatars aligned with a server's
//! authorized-user list. Users dropped from the list are evicted first (no
//! network needed), then each authorized user is refreshed independently —
//! one user's failure never blocks the rest.

use crate::error::{Result, SyncError};
use bridge_traits::api::RemoteApiClient;
use bridge_traits::credentials::ServerRecord;
use bridge_traits::storage::LocalAssetStore;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Per-server offline user cache maintenance.
pub struct OfflineUserReconciler {
    store: Arc<dyn LocalAssetStore>,
}

impl OfflineUserReconciler {
    pub fn new(store: Arc<dyn LocalAssetStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, client, token), fields(server = %server.name))]
    pub async fn reconcile(
        &self,
        server: &ServerRecord,
        client: &dyn RemoteApiClient,
        token: &CancellationToken,
    ) -> Result<()> {
        let authorized: HashSet<&str> = server.users.iter().map(|u| u.id.as_str()).collect();

        // Eviction is driven purely by the stored record, so it works even
        // when the refresh calls below are going to fail.
        for user_id in self.store.get_offline_user_ids(&server.id).await? {
            if authorized.contains(user_id.as_str()) {
                continue;
            }
            info!(user_id = %user_id, "Evicting no-longer-authorized offline user");
            if let Err(e) = self.store.delete_offline_user(&user_id).await {
                error!(user_id = %user_id, error = %e, "Failed to delete offline user");
                continue;
            }
            if let Err(e) = self.store.delete_user_image(&user_id).await {
                warn!(user_id = %user_id, error = %e, "Failed to delete avatar");
            }
        }

        for user in &server.users {
            if token.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            if let Err(e) = self.refresh_user(&server.id, &user.id, client).await {
                error!(user_id = %user.id, error = %e, "Failed to refresh offline user");
            }
        }

        Ok(())
    }

    /// Refresh one user: upsert on success, evict on an authoritative
    /// not-found, leave local state untouched on anything else.
    async fn refresh_user(
        &self,
        server_id: &str,
        user_id: &str,
        client: &dyn RemoteApiClient,
    ) -> Result<()> {
        match client.get_offline_user(user_id).await {
            Ok(mut user) => {
                user.server_id = server_id.to_string();
                self.store.save_offline_user(&user).await?;

                if !self.store.has_user_image(user_id).await? {
                    match client.get_user_image(user_id).await {
                        Ok(contents) => self.store.save_user_image(user_id, contents).await?,
                        Err(e) if e.is_not_found() => {
                            debug!(user_id = %user_id, "User has no avatar upstream");
                        }
                        Err(e) => {
                            warn!(user_id = %user_id, error = %e, "Avatar download failed");
                        }
                    }
                }
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                info!(user_id = %user_id, "Server no longer knows user, deleting locally");
                self.store.delete_offline_user(user_id).await?;
                self.store.delete_user_image(user_id).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
