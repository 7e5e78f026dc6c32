//! Remote Media Server API Abstraction
//!
//! Defines the contract the core holds against a media server's HTTP API.
//! The concrete REST mapping (URL construction, DTO wire encoding, transport)
//! lives in a host-provided implementation; the core only ever talks to
//! [`RemoteApiClient`].
//!
//! A `RemoteApiClient` is a *bound* handle: it targets one server address and
//! carries that server's session credentials. Handles are long-lived and may
//! be shared by unrelated subsystems issuing concurrent requests, so address
//! and credential setters take `&self` and race last-write-wins.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::storage::{ImageType, OfflineUser, UserAction};

/// Unauthenticated system information, served without credentials.
///
/// Used as the reachability probe when selecting among candidate addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSystemInfo {
    /// Server-assigned stable identity. Never changes for a given server,
    /// even across address changes.
    pub id: String,
    pub server_name: String,
    pub version: Option<String>,
    /// The address the server believes it is reachable at on its own LAN.
    pub local_address: Option<String>,
}

/// Authenticated system information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub id: String,
    pub server_name: String,
    pub version: Option<String>,
    /// Whether the server advertises the offline sync feature at all.
    pub supports_sync: bool,
}

/// Server response to one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDataResponse {
    /// Item ids the client must evict from its local cache.
    pub item_ids_to_remove: Vec<String>,
    /// Item id -> user ids currently permitted to see that item locally.
    pub item_user_access: HashMap<String, Vec<String>>,
}

/// One additional file (e.g. an external subtitle) attached to a job item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFileResponse {
    pub name: String,
}

/// Kind of a stream within a media source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaStreamType {
    Audio,
    Video,
    Subtitle,
}

/// One stream (audio/video/subtitle track) of a media source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaStream {
    pub index: i32,
    #[serde(rename = "type")]
    pub stream_type: MediaStreamType,
    pub codec: Option<String>,
    pub language: Option<String>,
    /// External streams live in their own file next to the media file.
    pub is_external: bool,
    /// Local path once the stream has been materialized on this device.
    pub path: Option<String>,
}

impl MediaStream {
    /// Whether this stream is an external subtitle that still needs a local file.
    pub fn needs_subtitle_file(&self) -> bool {
        self.stream_type == MediaStreamType::Subtitle && self.is_external && self.path.is_none()
    }
}

/// One playable source of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSourceInfo {
    pub id: String,
    pub path: Option<String>,
    pub media_streams: Vec<MediaStream>,
}

/// Catalog entry as served by the remote API.
///
/// Only the fields the sync engine consumes are modeled; the wire DTO is
/// considerably larger and owned by the REST layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDto {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub media_sources: Vec<MediaSourceInfo>,
    /// Whether the item itself carries a primary image.
    #[serde(default)]
    pub has_primary_image: bool,
    pub series_id: Option<String>,
    pub series_primary_image_tag: Option<String>,
    pub series_thumb_image_tag: Option<String>,
    pub album_id: Option<String>,
    pub album_primary_image_tag: Option<String>,
}

impl ItemDto {
    /// Container-level images this item depends on, as (owner id, kind) pairs.
    ///
    /// The owner is the item itself for its primary image, or the containing
    /// series/album for inherited artwork.
    pub fn required_images(&self) -> Vec<(String, ImageType)> {
        let mut images = Vec::new();
        if self.has_primary_image {
            images.push((self.id.clone(), ImageType::Primary));
        }
        if let Some(series_id) = &self.series_id {
            if self.series_primary_image_tag.is_some() {
                images.push((series_id.clone(), ImageType::Primary));
            }
            if self.series_thumb_image_tag.is_some() {
                images.push((series_id.clone(), ImageType::Thumb));
            }
        }
        if let Some(album_id) = &self.album_id {
            if self.album_primary_image_tag.is_some() {
                images.push((album_id.clone(), ImageType::Primary));
            }
        }
        images
    }
}

/// A server-issued work order: one item ready to be pulled to this device.
///
/// Ephemeral; exists only for the duration of one download pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedItem {
    pub sync_job_item_id: String,
    pub original_file_name: String,
    pub item: ItemDto,
    #[serde(default)]
    pub additional_files: Vec<ItemFileResponse>,
}

/// Per-device options governing content upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicesOptions {
    /// Device ids for which camera-roll upload is enabled.
    pub enabled_upload_devices: Vec<String>,
}

/// A locally captured file that is a candidate for upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalFileInfo {
    pub name: String,
    pub full_path: String,
    pub mime_type: Option<String>,
}

/// What the server has already received from a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentUploadHistory {
    pub device_id: String,
    #[serde(default)]
    pub files_uploaded: Vec<LocalFileInfo>,
}

/// Bound client handle for one media server.
///
/// # Errors
///
/// Implementations map transport failures to [`BridgeError::OperationFailed`]
/// or [`BridgeError::Timeout`], HTTP 404 to [`BridgeError::NotFound`] and
/// HTTP 401 to [`BridgeError::Unauthorized`], so callers can apply the
/// retry/cleanup policy appropriate to each class.
///
/// [`BridgeError::OperationFailed`]: crate::error::BridgeError::OperationFailed
/// [`BridgeError::Timeout`]: crate::error::BridgeError::Timeout
/// [`BridgeError::NotFound`]: crate::error::BridgeError::NotFound
/// [`BridgeError::Unauthorized`]: crate::error::BridgeError::Unauthorized
#[async_trait]
pub trait RemoteApiClient: Send + Sync {
    /// The base address this handle currently targets.
    fn server_address(&self) -> String;

    /// Rebind the handle to a different base address.
    ///
    /// Existing credentials are kept; in-flight requests finish against the
    /// address they started with.
    fn set_server_address(&self, address: &str);

    /// Install or clear the credentials attached to subsequent requests.
    ///
    /// Concurrent writers race last-write-wins, which is acceptable because
    /// only the current user's token matters.
    fn set_auth(&self, access_token: Option<String>, user_id: Option<String>);

    /// Fetch unauthenticated system info. Doubles as the reachability probe.
    async fn get_public_system_info(&self) -> Result<PublicSystemInfo>;

    /// Fetch authenticated system info. Fails with `Unauthorized` when the
    /// installed token is no longer valid.
    async fn get_system_info(&self) -> Result<SystemInfo>;

    /// One reconciliation round trip: local inventory in, removal list and
    /// access map out.
    async fn sync_data(
        &self,
        device_id: &str,
        local_item_ids: Vec<String>,
        offline_user_ids: Vec<String>,
    ) -> Result<SyncDataResponse>;

    /// Job items queued for this device and ready for transfer.
    async fn get_ready_sync_items(&self, device_id: &str) -> Result<Vec<SyncedItem>>;

    /// Download the primary media file of a job item.
    async fn get_sync_job_item_file(&self, sync_job_item_id: &str) -> Result<Bytes>;

    /// Download one additional file (subtitles) of a job item by name.
    async fn get_sync_job_item_additional_file(
        &self,
        sync_job_item_id: &str,
        name: &str,
    ) -> Result<Bytes>;

    /// Tell the server the job item landed so it stops re-offering it.
    async fn report_sync_job_item_transferred(&self, sync_job_item_id: &str) -> Result<()>;

    /// Submit a batch of offline-recorded user actions.
    async fn report_offline_actions(&self, actions: &[UserAction]) -> Result<()>;

    /// Fetch the current record of one user authorized on this server.
    async fn get_offline_user(&self, user_id: &str) -> Result<OfflineUser>;

    /// Download an item/container image.
    async fn get_item_image(&self, item_id: &str, image_type: ImageType) -> Result<Bytes>;

    /// Download a user's avatar image.
    async fn get_user_image(&self, user_id: &str) -> Result<Bytes>;

    /// Fetch device-upload configuration.
    async fn get_devices_options(&self) -> Result<DevicesOptions>;

    /// Fetch what this device has already uploaded.
    async fn get_content_upload_history(&self, device_id: &str) -> Result<ContentUploadHistory>;

    /// Upload one locally captured file.
    async fn upload_file(
        &self,
        device_id: &str,
        file: &LocalFileInfo,
        contents: Bytes,
    ) -> Result<()>;
}

/// Produces bound client handles for candidate addresses.
///
/// The connection layer creates short-lived handles to probe addresses and
/// promotes the winning one into its per-server registry; implementations
/// should therefore keep construction cheap.
pub trait ApiClientFactory: Send + Sync {
    fn create(&self, address: &str) -> Arc<dyn RemoteApiClient>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_images_collects_containers() {
        let item = ItemDto {
            id: "item-1".to_string(),
            name: Some("Pilot".to_string()),
            media_sources: vec![],
            has_primary_image: true,
            series_id: Some("series-9".to_string()),
            series_primary_image_tag: Some("tag-a".to_string()),
            series_thumb_image_tag: None,
            album_id: None,
            album_primary_image_tag: None,
        };

        let images = item.required_images();
        assert_eq!(
            images,
            vec![
                ("item-1".to_string(), ImageType::Primary),
                ("series-9".to_string(), ImageType::Primary),
            ]
        );
    }

    #[test]
    fn test_needs_subtitle_file() {
        let mut stream = MediaStream {
            index: 3,
            stream_type: MediaStreamType::Subtitle,
            codec: Some("srt".to_string()),
            language: Some("eng".to_string()),
            is_external: true,
            path: None,
        };
        assert!(stream.needs_subtitle_file());

        stream.path = Some("/cache/item/file.srt".to_string());
        assert!(!stream.needs_subtitle_file());
    }

    #[test]
    fn test_sync_data_response_round_trip() {
        let response = SyncDataResponse {
            item_ids_to_remove: vec!["a".to_string()],
            item_user_access: HashMap::from([("a".to_string(), vec!["u1".to_string()])]),
        };

        let json = serde_json::to_string(&response).unwrap();
        let back: SyncDataResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, response);
    }
}
