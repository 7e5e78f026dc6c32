//! # Content Uploader
//!
//! Pushes locally captured camera-roll files to a server, skipping anything
//! already present in the server's upload history for this device. Uploads
//! run sequentially with cumulative fractional progress; a single file's
//! failure is logged and skipped, never fatal to the batch.

use crate::error::{Result, SyncError};
use crate::progress::ProgressReporter;
use bridge_traits::api::{LocalFileInfo, RemoteApiClient};
use bridge_traits::credentials::ServerRecord;
use bridge_traits::storage::LocalAssetStore;
use core_connect::reachability::AccessProbe;
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, UploadEvent};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Counters for one upload pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub uploaded: u64,
    pub failed: u64,
}

/// Camera-roll upload for one device.
pub struct ContentUploader {
    config: CoreConfig,
    store: Arc<dyn LocalAssetStore>,
    access: Arc<dyn AccessProbe>,
    event_bus: EventBus,
}

impl ContentUploader {
    pub fn new(
        config: CoreConfig,
        store: Arc<dyn LocalAssetStore>,
        access: Arc<dyn AccessProbe>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            config,
            store,
            access,
            event_bus,
        }
    }

    #[instrument(skip(self, client, progress, token), fields(server = %server.name))]
    pub async fn upload(
        &self,
        server: &ServerRecord,
        client: &dyn RemoteApiClient,
        progress: &dyn ProgressReporter,
        token: &CancellationToken,
    ) -> Result<UploadStats> {
        let mut stats = UploadStats::default();

        let options = client.get_devices_options().await?;
        if !options
            .enabled_upload_devices
            .iter()
            .any(|d| d == &self.config.device_id)
        {
            debug!("Content upload not enabled for this device");
            progress.report(100.0);
            return Ok(stats);
        }

        let history = client
            .get_content_upload_history(&self.config.device_id)
            .await?;
        let already_uploaded: HashSet<&str> = history
            .files_uploaded
            .iter()
            .map(|f| f.full_path.as_str())
            .collect();

        let pending: Vec<LocalFileInfo> = self
            .store
            .list_camera_roll()
            .await?
            .into_iter()
            .filter(|f| !already_uploaded.contains(f.full_path.as_str()))
            .collect();

        let total = pending.len();
        info!(total, "Camera roll files pending upload");
        self.event_bus
            .emit(CoreEvent::Upload(UploadEvent::Started {
                server_id: server.id.clone(),
                pending: total,
            }))
            .ok();

        if total == 0 {
            progress.report(100.0);
            return Ok(stats);
        }

        for (index, file) in pending.iter().enumerate() {
            if token.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            if !self.access.can_access_file(&file.full_path).await {
                warn!(path = %file.full_path, "Skipping unreadable camera roll file");
                stats.failed += 1;
            } else {
                match self.upload_one(client, file).await {
                    Ok(()) => {
                        stats.uploaded += 1;
                        self.event_bus
                            .emit(CoreEvent::Upload(UploadEvent::FileUploaded {
                                server_id: server.id.clone(),
                                name: file.name.clone(),
                            }))
                            .ok();
                    }
                    Err(e) => {
                        error!(path = %file.full_path, error = %e, "Upload failed");
                        stats.failed += 1;
                    }
                }
            }

            progress.report(100.0 * (index + 1) as f64 / total as f64);
        }

        self.event_bus
            .emit(CoreEvent::Upload(UploadEvent::Completed {
                server_id: server.id.clone(),
                uploaded: stats.uploaded,
                failed: stats.failed,
            }))
            .ok();

        Ok(stats)
    }

    async fn upload_one(&self, client: &dyn RemoteApiClient, file: &LocalFileInfo) -> Result<()> {
        let contents = self.store.read_local_file(&file.full_path).await?;
        client
            .upload_file(&self.config.device_id, file, contents)
            .await?;
        Ok(())
    }
}
