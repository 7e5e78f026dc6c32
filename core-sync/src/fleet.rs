//! # Fleet Sync Coordinator
//!
//! Runs the full per-server sequence — connect, offline-user reconciliation,
//! content upload, media sync — for every known server, sequentially, and
//! folds per-server progress into one aggregate with equal weight per
//! server. One server failing completely (unreachable, or its sync throwing)
//! contributes its full weight and the fleet moves on; the aggregate always
//! terminates at exactly 100.
//!
//! Sequential on purpose: local storage mutations are not guarded by locks,
//! and per-server progress must stay attributable for the aggregate
//! contract.

use crate::engine::MediaSyncEngine;
use crate::error::{Result, SyncError};
use crate::progress::{self, ProgressReporter, ScaledProgress};
use crate::upload::ContentUploader;
use crate::users::OfflineUserReconciler;
use bridge_traits::credentials::{CredentialStore, ServerRecord};
use core_connect::error::ConnectError;
use core_connect::manager::{ConnectionManager, ConnectionState};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Fleet-wide synchronization entry point.
pub struct FleetSyncCoordinator {
    credential_store: Arc<dyn CredentialStore>,
    connection: Arc<ConnectionManager>,
    engine: Arc<MediaSyncEngine>,
    users: OfflineUserReconciler,
    uploader: ContentUploader,
}

impl FleetSyncCoordinator {
    pub fn new(
        credential_store: Arc<dyn CredentialStore>,
        connection: Arc<ConnectionManager>,
        engine: Arc<MediaSyncEngine>,
        users: OfflineUserReconciler,
        uploader: ContentUploader,
    ) -> Self {
        Self {
            credential_store,
            connection,
            engine,
            users,
            uploader,
        }
    }

    /// Sync every known server. Reports 0-100 and finishes at exactly 100
    /// regardless of individual server outcomes; only cancellation aborts
    /// the fleet.
    #[instrument(skip(self, progress, token))]
    pub async fn sync(
        &self,
        progress: &dyn ProgressReporter,
        token: &CancellationToken,
    ) -> Result<()> {
        let credentials = self.credential_store.load().await?;
        let servers = credentials.servers_by_recency();
        let count = servers.len();
        info!(count, "Starting fleet sync");

        if count == 0 {
            progress.report(100.0);
            return Ok(());
        }

        let span = 100.0 / count as f64;
        for (index, server) in servers.iter().enumerate() {
            if token.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let base = span * index as f64;
            match self.sync_server(server, base, span, progress, token).await {
                Ok(()) => {}
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(e) => {
                    error!(server = %server.name, error = %e, "Server sync failed");
                }
            }

            // Succeeded, skipped, or failed: the server's full slice is spent.
            progress.report(progress::fleet(count, index + 1, 0.0));
        }

        progress.report(100.0);
        Ok(())
    }

    async fn sync_server(
        &self,
        server: &ServerRecord,
        base: f64,
        span: f64,
        progress: &dyn ProgressReporter,
        token: &CancellationToken,
    ) -> Result<()> {
        let result = self
            .connection
            .connect_to_server(server, token)
            .await
            .map_err(|e| match e {
                ConnectError::Cancelled => SyncError::Cancelled,
                other => SyncError::Connect(other.to_string()),
            })?;

        if result.state != ConnectionState::SignedIn {
            info!(server = %server.name, state = ?result.state, "Server not signed in, skipping sync");
            return Ok(());
        }

        let client = result
            .client
            .ok_or_else(|| SyncError::Connect("connected result carries no client".to_string()))?;
        let record = result
            .server
            .ok_or_else(|| SyncError::Connect("connected result carries no record".to_string()))?;

        self.users
            .reconcile(&record, client.as_ref(), token)
            .await?;

        let upload_progress =
            ScaledProgress::new(progress, base, span * progress::SERVER_UPLOAD_SHARE);
        match self
            .uploader
            .upload(&record, client.as_ref(), &upload_progress, token)
            .await
        {
            Ok(stats) => debug!(uploaded = stats.uploaded, failed = stats.failed, "Upload pass done"),
            Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
            // Upload trouble never blocks the media sync that follows.
            Err(e) => warn!(server = %record.name, error = %e, "Content upload failed"),
        }

        let sync_progress = ScaledProgress::new(
            progress,
            base + span * progress::SERVER_UPLOAD_SHARE,
            span * progress::SERVER_SYNC_SHARE,
        );
        self.engine
            .sync(&record, client, &sync_progress, token)
            .await?;

        Ok(())
    }
}
