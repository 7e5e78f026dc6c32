//! Local Asset Store Abstraction
//!
//! Owns every byte the client caches for offline use: item records, physical
//! media/image/subtitle files, offline user records and avatars, and the
//! queue of user actions recorded while disconnected.
//!
//! The store is the only component allowed to create or delete
//! [`ItemFileInfo`] rows; orchestrators go through it rather than touching
//! the filesystem directly.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::api::{ItemDto, LocalFileInfo};
use crate::error::{BridgeError, Result};

/// Kind of a physical file owned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemFileType {
    Media,
    Image,
    Subtitles,
}

impl ItemFileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemFileType::Media => "media",
            ItemFileType::Image => "image",
            ItemFileType::Subtitles => "subtitles",
        }
    }
}

impl FromStr for ItemFileType {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "media" => Ok(ItemFileType::Media),
            "image" => Ok(ItemFileType::Image),
            "subtitles" => Ok(ItemFileType::Subtitles),
            other => Err(BridgeError::OperationFailed(format!(
                "unknown file type '{}'",
                other
            ))),
        }
    }
}

/// Kind of a cached image.
///
/// Container artwork (series, album) is cached under the *container's* id,
/// so two episodes of one series share a single cached primary image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageType {
    Primary,
    Thumb,
}

impl ImageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageType::Primary => "primary",
            ImageType::Thumb => "thumb",
        }
    }
}

impl FromStr for ImageType {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "primary" => Ok(ImageType::Primary),
            "thumb" => Ok(ImageType::Thumb),
            other => Err(BridgeError::OperationFailed(format!(
                "unknown image type '{}'",
                other
            ))),
        }
    }
}

/// Client-cached representation of one server catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalItem {
    /// Same id the server uses for the item.
    pub id: String,
    pub server_id: String,
    /// The embedded catalog DTO, including media-source descriptors.
    pub item: ItemDto,
    /// User ids permitted to see this item locally. Kept sorted.
    pub user_ids_with_access: Vec<String>,
}

impl LocalItem {
    pub fn new(server_id: impl Into<String>, item: ItemDto) -> Self {
        Self {
            id: item.id.clone(),
            server_id: server_id.into(),
            item,
            user_ids_with_access: Vec::new(),
        }
    }

    /// Replace the access list, normalizing to a sorted, deduplicated order.
    ///
    /// Returns `true` when the stored list actually changed, so callers can
    /// skip a redundant re-write.
    pub fn set_user_access(&mut self, mut user_ids: Vec<String>) -> bool {
        user_ids.sort();
        user_ids.dedup();
        if user_ids == self.user_ids_with_access {
            return false;
        }
        self.user_ids_with_access = user_ids;
        true
    }
}

/// One physical local file associated with a [`LocalItem`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFileInfo {
    pub name: String,
    pub item_id: String,
    pub file_type: ItemFileType,
    pub image_type: Option<ImageType>,
    pub index: Option<i32>,
    /// Absolute path of the file on this device.
    pub path: String,
}

/// Kind of an offline-recorded user action.
///
/// Only playback-completion events are recorded while disconnected; explicit
/// playstate resets are applied live or not at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserActionType {
    PlayedItem,
}

/// A user event recorded while disconnected, pending upload to the server.
///
/// Deleted locally only after the server has acknowledged the batch that
/// contained it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAction {
    pub id: String,
    pub server_id: String,
    pub item_id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub action_type: UserActionType,
    pub date: DateTime<Utc>,
    pub position_ticks: Option<i64>,
}

impl UserAction {
    /// Record a playback completion at the given position.
    pub fn played(
        server_id: impl Into<String>,
        item_id: impl Into<String>,
        user_id: impl Into<String>,
        position_ticks: Option<i64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            server_id: server_id.into(),
            item_id: item_id.into(),
            user_id: user_id.into(),
            action_type: UserActionType::PlayedItem,
            date: Utc::now(),
            position_ticks,
        }
    }
}

/// Locally cached record of a user authorized on some server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineUser {
    pub id: String,
    pub server_id: String,
    pub name: String,
    pub primary_image_tag: Option<String>,
}

/// Persistent local storage for synced media and offline state.
///
/// All mutations are individually durable; there is no cross-call
/// transaction. Orchestrators sequence calls so that partial failure leaves
/// the store in a state the next sync run can repair (e.g. files are deleted
/// before their item record, never after).
#[async_trait]
pub trait LocalAssetStore: Send + Sync {
    // ---- items -------------------------------------------------------------

    async fn get_local_item(&self, item_id: &str) -> Result<Option<LocalItem>>;

    /// Insert or replace an item record.
    async fn save_local_item(&self, item: &LocalItem) -> Result<()>;

    async fn delete_local_item(&self, item_id: &str) -> Result<()>;

    /// Ids of every cached item belonging to one server.
    async fn get_server_item_ids(&self, server_id: &str) -> Result<Vec<String>>;

    // ---- physical files ----------------------------------------------------

    /// Every physical file owned by one item.
    async fn get_files(&self, item_id: &str) -> Result<Vec<ItemFileInfo>>;

    /// Delete one physical file and its record.
    async fn delete_file(&self, file: &ItemFileInfo) -> Result<()>;

    /// Persist the primary media payload of an item.
    async fn save_media(&self, item: &LocalItem, name: &str, contents: Bytes)
        -> Result<ItemFileInfo>;

    /// Persist one subtitle file of an item. The returned record carries the
    /// local path to be written back onto the item's media streams.
    async fn save_subtitles(
        &self,
        item: &LocalItem,
        name: &str,
        contents: Bytes,
    ) -> Result<ItemFileInfo>;

    /// Persist an item/container image.
    async fn save_item_image(
        &self,
        item_id: &str,
        image_type: ImageType,
        contents: Bytes,
    ) -> Result<ItemFileInfo>;

    async fn has_item_image(&self, item_id: &str, image_type: ImageType) -> Result<bool>;

    async fn file_exists(&self, path: &str) -> Result<bool>;

    // ---- offline user actions ----------------------------------------------

    async fn record_user_action(&self, action: &UserAction) -> Result<()>;

    /// All pending actions for one server, in storage order.
    async fn get_user_actions(&self, server_id: &str) -> Result<Vec<UserAction>>;

    async fn delete_user_action(&self, action: &UserAction) -> Result<()>;

    // ---- offline users -----------------------------------------------------

    /// Insert or replace an offline user record.
    async fn save_offline_user(&self, user: &OfflineUser) -> Result<()>;

    async fn delete_offline_user(&self, user_id: &str) -> Result<()>;

    /// Ids of every cached user belonging to one server.
    async fn get_offline_user_ids(&self, server_id: &str) -> Result<Vec<String>>;

    async fn save_user_image(&self, user_id: &str, contents: Bytes) -> Result<()>;

    async fn has_user_image(&self, user_id: &str) -> Result<bool>;

    async fn delete_user_image(&self, user_id: &str) -> Result<()>;

    // ---- content upload source ---------------------------------------------

    /// Locally captured photo/video files eligible for upload.
    async fn list_camera_roll(&self) -> Result<Vec<LocalFileInfo>>;

    /// Read a local file's contents for upload.
    async fn read_local_file(&self, full_path: &str) -> Result<Bytes>;
}
