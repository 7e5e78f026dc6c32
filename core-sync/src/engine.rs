//! # Media Sync Engine
//!
//! The per-server synchronization sequence, strictly in phase order:
//!
//! 1. **Capability check** — a server that does not advertise sync support
//!    turns the whole sequence into a logged no-op at 100%.
//! 2. **Offline action replay** — pending user actions are submitted as one
//!    batch, oldest first, and deleted locally only after the server accepts
//!    the batch (at-least-once; the server tolerates duplicates).
//! 3. **Reconciliation pass 1** — the local item inventory and authorized
//!    user ids go up; the server's removal list is applied.
//! 4. **Reconciliation pass 2** — the same exchange again, giving the server
//!    a chance to react to deletions that happened during pass 1's round
//!    trip; user-access updates are applied on this pass only.
//! 5. **Retrieval** — each ready job item is pulled: item record first, then
//!    media, images, subtitles, and the transfer acknowledgement.
//!
//! Each phase gates the next; partial failure inside a phase never corrupts
//! state a completed phase left behind. Per-item failures are logged and
//! skipped so one bad item cannot stall the batch — except a failed primary
//! media transfer, which suppresses the acknowledgement so the server
//! re-offers that job item on the next run.

use crate::error::{Result, SyncError};
use crate::progress::{self, ProgressReporter};
use bridge_traits::api::{ItemDto, RemoteApiClient, SyncedItem};
use bridge_traits::credentials::ServerRecord;
use bridge_traits::storage::{LocalAssetStore, LocalItem};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Which reconciliation pass is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReconcilePass {
    /// First exchange: removals only.
    Initial,
    /// Second exchange: removals plus user-access updates.
    Final,
}

/// Counters for one completed sync sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub actions_reported: u64,
    pub items_removed: u64,
    pub items_synced: u64,
}

/// Per-server synchronization orchestrator.
pub struct MediaSyncEngine {
    config: CoreConfig,
    store: Arc<dyn LocalAssetStore>,
    event_bus: EventBus,
}

/// Projects per-item sub-step fractions into the overall retrieval range.
struct ItemProgress<'a> {
    progress: &'a dyn ProgressReporter,
    item_count: usize,
    items_done: usize,
}

impl ItemProgress<'_> {
    fn report(&self, fraction: f64) {
        self.progress
            .report(progress::retrieval(self.item_count, self.items_done, fraction));
    }
}

impl MediaSyncEngine {
    pub fn new(config: CoreConfig, store: Arc<dyn LocalAssetStore>, event_bus: EventBus) -> Self {
        Self {
            config,
            store,
            event_bus,
        }
    }

    /// Run the full sequence against one connected, signed-in server.
    ///
    /// `progress` receives a monotonic 0-100 composite; cancellation unwinds
    /// between phases and items without further network or delete activity.
    #[instrument(skip(self, client, progress, token), fields(server = %server.name))]
    pub async fn sync(
        &self,
        server: &ServerRecord,
        client: Arc<dyn RemoteApiClient>,
        progress: &dyn ProgressReporter,
        token: &CancellationToken,
    ) -> Result<SyncStats> {
        match self.execute(server, client.as_ref(), progress, token).await {
            Ok(stats) => {
                info!(
                    server = %server.name,
                    actions = stats.actions_reported,
                    removed = stats.items_removed,
                    synced = stats.items_synced,
                    "Sync completed"
                );
                self.event_bus
                    .emit(CoreEvent::Sync(SyncEvent::Completed {
                        server_id: server.id.clone(),
                        items_synced: stats.items_synced,
                        items_removed: stats.items_removed,
                    }))
                    .ok();
                Ok(stats)
            }
            Err(SyncError::Cancelled) => {
                debug!(server = %server.name, "Sync cancelled");
                self.event_bus
                    .emit(CoreEvent::Sync(SyncEvent::Cancelled {
                        server_id: server.id.clone(),
                    }))
                    .ok();
                Err(SyncError::Cancelled)
            }
            Err(e) => {
                error!(server = %server.name, error = %e, "Sync failed");
                self.event_bus
                    .emit(CoreEvent::Sync(SyncEvent::Failed {
                        server_id: server.id.clone(),
                        message: e.to_string(),
                    }))
                    .ok();
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        server: &ServerRecord,
        client: &dyn RemoteApiClient,
        progress: &dyn ProgressReporter,
        token: &CancellationToken,
    ) -> Result<SyncStats> {
        let mut stats = SyncStats::default();

        cancelled(token)?;

        let info = client.get_system_info().await?;
        if !info.supports_sync {
            info!(server = %server.name, "Server does not advertise sync support, skipping");
            progress.report(100.0);
            return Ok(stats);
        }

        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Started {
                server_id: server.id.clone(),
            }))
            .ok();

        cancelled(token)?;
        info!("Phase 1: Replaying offline actions");
        stats.actions_reported = self.replay_offline_actions(server, client).await?;
        self.report(server, progress, progress::action_replay_complete(), "actions");

        cancelled(token)?;
        info!("Phase 2: Reconciliation pass 1");
        stats.items_removed += self
            .reconcile(server, client, ReconcilePass::Initial)
            .await?;
        self.report(server, progress, progress::reconcile_pass_complete(1), "reconcile");

        cancelled(token)?;
        info!("Phase 3: Reconciliation pass 2");
        stats.items_removed += self.reconcile(server, client, ReconcilePass::Final).await?;
        self.report(server, progress, progress::reconcile_pass_complete(2), "reconcile");

        cancelled(token)?;
        info!("Phase 4: Retrieving new media");
        let job_items = client.get_ready_sync_items(&self.config.device_id).await?;
        let item_count = job_items.len();
        debug!(item_count, "Job items ready for transfer");

        for (index, job_item) in job_items.iter().enumerate() {
            cancelled(token)?;

            let item_progress = ItemProgress {
                progress,
                item_count,
                items_done: index,
            };

            match self
                .sync_job_item(server, client, job_item, &item_progress)
                .await
            {
                Ok(()) => {
                    stats.items_synced += 1;
                    self.event_bus
                        .emit(CoreEvent::Sync(SyncEvent::ItemSynced {
                            server_id: server.id.clone(),
                            item_id: job_item.item.id.clone(),
                        }))
                        .ok();
                }
                Err(e) => {
                    error!(
                        job_item_id = %job_item.sync_job_item_id,
                        item_id = %job_item.item.id,
                        error = %e,
                        "Job item transfer failed"
                    );
                }
            }

            self.report(
                server,
                progress,
                progress::retrieval(item_count, index + 1, 0.0),
                "retrieval",
            );
        }

        progress.report(100.0);
        Ok(stats)
    }

    /// Submit the pending action batch, oldest first; delete local records
    /// only once the server has accepted the batch.
    async fn replay_offline_actions(
        &self,
        server: &ServerRecord,
        client: &dyn RemoteApiClient,
    ) -> Result<u64> {
        let mut actions = self.store.get_user_actions(&server.id).await?;
        if actions.is_empty() {
            debug!("No offline actions to replay");
            return Ok(0);
        }

        actions.sort_by_key(|a| a.date);
        client.report_offline_actions(&actions).await?;

        let count = actions.len() as u64;
        for action in &actions {
            // The server accepted the batch; a record that refuses to die
            // here only means a duplicate submission later.
            if let Err(e) = self.store.delete_user_action(action).await {
                warn!(action_id = %action.id, error = %e, "Failed to delete replayed action");
            }
        }

        debug!(count, "Replayed offline actions");
        Ok(count)
    }

    /// One reconciliation round trip. Removals are processed on both passes;
    /// the user-access map only on the final pass, after the deletion
    /// exchange has settled.
    async fn reconcile(
        &self,
        server: &ServerRecord,
        client: &dyn RemoteApiClient,
        pass: ReconcilePass,
    ) -> Result<u64> {
        let item_ids = self.store.get_server_item_ids(&server.id).await?;
        let user_ids = server.offline_user_ids();

        let response = client
            .sync_data(&self.config.device_id, item_ids, user_ids)
            .await?;

        let mut removed = 0u64;
        for item_id in &response.item_ids_to_remove {
            match self.remove_item(item_id).await {
                Ok(()) => {
                    removed += 1;
                    self.event_bus
                        .emit(CoreEvent::Sync(SyncEvent::ItemRemoved {
                            server_id: server.id.clone(),
                            item_id: item_id.clone(),
                        }))
                        .ok();
                }
                Err(e) => {
                    // This item's eviction retries next sync; the rest of the
                    // removal list still applies.
                    error!(item_id = %item_id, error = %e, "Failed to evict item");
                }
            }
        }

        if pass == ReconcilePass::Final {
            for (item_id, user_ids) in &response.item_user_access {
                if response.item_ids_to_remove.contains(item_id) {
                    continue;
                }
                if let Err(e) = self.update_item_access(item_id, user_ids.clone()).await {
                    warn!(item_id = %item_id, error = %e, "Failed to update item access");
                }
            }
        }

        Ok(removed)
    }

    /// Files first, then the item record, so a partial failure leaves a
    /// record the next run will try to evict again.
    async fn remove_item(&self, item_id: &str) -> bridge_traits::error::Result<()> {
        let files = self.store.get_files(item_id).await?;
        for file in &files {
            self.store.delete_file(file).await?;
        }
        self.store.delete_local_item(item_id).await?;
        Ok(())
    }

    async fn update_item_access(
        &self,
        item_id: &str,
        user_ids: Vec<String>,
    ) -> bridge_traits::error::Result<()> {
        let Some(mut item) = self.store.get_local_item(item_id).await? else {
            return Ok(());
        };
        if item.set_user_access(user_ids) {
            self.store.save_local_item(&item).await?;
        }
        Ok(())
    }

    /// Pull one job item. The item record is persisted before any transfer;
    /// image and subtitle failures are logged without blocking the
    /// acknowledgement, while a media failure propagates so the item is
    /// re-offered.
    async fn sync_job_item(
        &self,
        server: &ServerRecord,
        client: &dyn RemoteApiClient,
        job_item: &SyncedItem,
        item_progress: &ItemProgress<'_>,
    ) -> Result<()> {
        let item_id = &job_item.item.id;

        let mut local_item = match self.store.get_local_item(item_id).await? {
            Some(mut existing) => {
                existing.item = job_item.item.clone();
                existing
            }
            None => LocalItem::new(server.id.clone(), job_item.item.clone()),
        };
        self.store.save_local_item(&local_item).await?;

        let media = client
            .get_sync_job_item_file(&job_item.sync_job_item_id)
            .await?;
        self.store
            .save_media(&local_item, &job_item.original_file_name, media)
            .await?;
        item_progress.report(progress::item_fraction(true, false, false, false));

        if let Err(e) = self.sync_item_images(client, &job_item.item).await {
            warn!(item_id = %item_id, error = %e, "Image retrieval failed");
        }
        item_progress.report(progress::item_fraction(true, true, false, false));

        if let Err(e) = self
            .sync_subtitles(client, job_item, &mut local_item)
            .await
        {
            warn!(item_id = %item_id, error = %e, "Subtitle retrieval failed");
        }
        item_progress.report(progress::item_fraction(true, true, true, false));

        client
            .report_sync_job_item_transferred(&job_item.sync_job_item_id)
            .await?;
        item_progress.report(progress::item_fraction(true, true, true, true));

        Ok(())
    }

    /// Pull container-level images the local cache is missing.
    async fn sync_item_images(
        &self,
        client: &dyn RemoteApiClient,
        item: &ItemDto,
    ) -> bridge_traits::error::Result<()> {
        for (owner_id, image_type) in item.required_images() {
            if self.store.has_item_image(&owner_id, image_type).await? {
                continue;
            }
            let contents = client.get_item_image(&owner_id, image_type).await?;
            self.store
                .save_item_image(&owner_id, image_type, contents)
                .await?;
        }
        Ok(())
    }

    /// Pull each additional subtitle file, then write the saved paths onto
    /// the item's external subtitle streams and re-persist it.
    async fn sync_subtitles(
        &self,
        client: &dyn RemoteApiClient,
        job_item: &SyncedItem,
        local_item: &mut LocalItem,
    ) -> bridge_traits::error::Result<()> {
        if job_item.additional_files.is_empty() {
            return Ok(());
        }

        let mut saved_paths = Vec::new();
        for file in &job_item.additional_files {
            let contents = client
                .get_sync_job_item_additional_file(&job_item.sync_job_item_id, &file.name)
                .await?;
            let saved = self
                .store
                .save_subtitles(local_item, &file.name, contents)
                .await?;
            saved_paths.push(saved.path);
        }

        let mut paths = saved_paths.into_iter();
        for source in &mut local_item.item.media_sources {
            for stream in &mut source.media_streams {
                if stream.needs_subtitle_file() {
                    if let Some(path) = paths.next() {
                        stream.path = Some(path);
                    }
                }
            }
        }

        self.store.save_local_item(local_item).await?;
        Ok(())
    }

    fn report(
        &self,
        server: &ServerRecord,
        progress: &dyn ProgressReporter,
        percent: f64,
        phase: &str,
    ) {
        progress.report(percent);
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Progress {
                server_id: server.id.clone(),
                percent,
                phase: phase.to_string(),
            }))
            .ok();
    }
}

fn cancelled(token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        return Err(SyncError::Cancelled);
    }
    Ok(())
}
