//! SQLite-backed implementation of [`LocalAssetStore`].
//!
//! Records live in SQLite; payload bytes (media, subtitles, images) live
//! under a media root directory laid out as:
//!
//! ```text
//! <media_root>/<server_id>/<item_id>/<file>   media + subtitles
//! <media_root>/images/<owner>-<kind>.img      item/container artwork
//! <media_root>/users/<user_id>.img            user avatars
//! ```
//!
//! Container artwork is keyed by the container's id, so episodes of one
//! series share a single cached image and item eviction leaves it in place.

use async_trait::async_trait;
use bridge_traits::api::LocalFileInfo;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::storage::{
    ImageType, ItemFileInfo, ItemFileType, LocalAssetStore, LocalItem, OfflineUser, UserAction,
    UserActionType,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// File extensions treated as camera-roll content.
const CAMERA_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "heic", "mp4", "mov", "m4v"];

fn db(e: sqlx::Error) -> BridgeError {
    BridgeError::DatabaseError(e.to_string())
}

fn json(e: serde_json::Error) -> BridgeError {
    BridgeError::OperationFailed(format!("serialization failed: {}", e))
}

fn action_type_as_str(action_type: UserActionType) -> &'static str {
    match action_type {
        UserActionType::PlayedItem => "played",
    }
}

fn parse_action_type(s: &str) -> Result<UserActionType> {
    match s {
        "played" => Ok(UserActionType::PlayedItem),
        other => Err(BridgeError::OperationFailed(format!(
            "unknown action type '{}'",
            other
        ))),
    }
}

fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| BridgeError::OperationFailed(format!("invalid stored date '{}': {}", s, e)))
}

/// Keep stored names safe to use as a single path component.
fn sanitize_file_name(name: &str) -> String {
    name.replace(['/', '\\', ':'], "_")
}

/// SQLite + filesystem implementation of the local asset store.
pub struct SqliteAssetStore {
    pool: SqlitePool,
    media_root: PathBuf,
    camera_roll_dir: Option<PathBuf>,
}

impl SqliteAssetStore {
    pub fn new(pool: SqlitePool, media_root: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            media_root: media_root.into(),
            camera_roll_dir: None,
        }
    }

    /// Point the store at the device's camera roll for content upload.
    pub fn with_camera_roll(mut self, dir: impl Into<PathBuf>) -> Self {
        self.camera_roll_dir = Some(dir.into());
        self
    }

    fn item_dir(&self, server_id: &str, item_id: &str) -> PathBuf {
        self.media_root.join(server_id).join(item_id)
    }

    fn image_path(&self, owner_id: &str, image_type: ImageType) -> PathBuf {
        self.media_root
            .join("images")
            .join(format!("{}-{}.img", owner_id, image_type.as_str()))
    }

    fn user_image_path(&self, user_id: &str) -> PathBuf {
        self.media_root.join("users").join(format!("{}.img", user_id))
    }

    async fn write_payload(&self, path: &Path, contents: Bytes) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await?;
        Ok(())
    }

    async fn insert_file_record(&self, file: &ItemFileInfo) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO item_files (item_id, name, file_type, image_type, stream_index, path)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(item_id, name) DO UPDATE SET
                file_type = excluded.file_type,
                image_type = excluded.image_type,
                stream_index = excluded.stream_index,
                path = excluded.path
            "#,
        )
        .bind(&file.item_id)
        .bind(&file.name)
        .bind(file.file_type.as_str())
        .bind(file.image_type.map(|t| t.as_str()))
        .bind(file.index)
        .bind(&file.path)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    fn file_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ItemFileInfo> {
        let file_type: String = row.try_get("file_type").map_err(db)?;
        let image_type: Option<String> = row.try_get("image_type").map_err(db)?;
        Ok(ItemFileInfo {
            item_id: row.try_get("item_id").map_err(db)?,
            name: row.try_get("name").map_err(db)?,
            file_type: ItemFileType::from_str(&file_type)?,
            image_type: image_type.as_deref().map(ImageType::from_str).transpose()?,
            index: row.try_get("stream_index").map_err(db)?,
            path: row.try_get("path").map_err(db)?,
        })
    }
}

#[async_trait]
impl LocalAssetStore for SqliteAssetStore {
    async fn get_local_item(&self, item_id: &str) -> Result<Option<LocalItem>> {
        let row = sqlx::query(
            "SELECT id, server_id, item_json, user_ids_json FROM local_items WHERE id = ?",
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let item_json: String = row.try_get("item_json").map_err(db)?;
        let user_ids_json: String = row.try_get("user_ids_json").map_err(db)?;

        Ok(Some(LocalItem {
            id: row.try_get("id").map_err(db)?,
            server_id: row.try_get("server_id").map_err(db)?,
            item: serde_json::from_str(&item_json).map_err(json)?,
            user_ids_with_access: serde_json::from_str(&user_ids_json).map_err(json)?,
        }))
    }

    async fn save_local_item(&self, item: &LocalItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO local_items (id, server_id, item_json, user_ids_json)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                server_id = excluded.server_id,
                item_json = excluded.item_json,
                user_ids_json = excluded.user_ids_json
            "#,
        )
        .bind(&item.id)
        .bind(&item.server_id)
        .bind(serde_json::to_string(&item.item).map_err(json)?)
        .bind(serde_json::to_string(&item.user_ids_with_access).map_err(json)?)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn delete_local_item(&self, item_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM local_items WHERE id = ?")
            .bind(item_id)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn get_server_item_ids(&self, server_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT id FROM local_items WHERE server_id = ? ORDER BY id")
            .bind(server_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("id").map_err(db))
            .collect()
    }

    async fn get_files(&self, item_id: &str) -> Result<Vec<ItemFileInfo>> {
        let rows = sqlx::query(
            "SELECT item_id, name, file_type, image_type, stream_index, path
             FROM item_files WHERE item_id = ? ORDER BY name",
        )
        .bind(item_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter().map(Self::file_from_row).collect()
    }

    async fn delete_file(&self, file: &ItemFileInfo) -> Result<()> {
        match tokio::fs::remove_file(&file.path).await {
            Ok(()) => {}
            // Already gone is fine; the record still has to go.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %file.path, "File already absent on delete");
            }
            Err(e) => return Err(e.into()),
        }

        sqlx::query("DELETE FROM item_files WHERE item_id = ? AND name = ?")
            .bind(&file.item_id)
            .bind(&file.name)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn save_media(
        &self,
        item: &LocalItem,
        name: &str,
        contents: Bytes,
    ) -> Result<ItemFileInfo> {
        let name = sanitize_file_name(name);
        let path = self.item_dir(&item.server_id, &item.id).join(&name);
        self.write_payload(&path, contents).await?;

        let file = ItemFileInfo {
            name,
            item_id: item.id.clone(),
            file_type: ItemFileType::Media,
            image_type: None,
            index: None,
            path: path.to_string_lossy().into_owned(),
        };
        self.insert_file_record(&file).await?;
        Ok(file)
    }

    async fn save_subtitles(
        &self,
        item: &LocalItem,
        name: &str,
        contents: Bytes,
    ) -> Result<ItemFileInfo> {
        let name = sanitize_file_name(name);
        let path = self.item_dir(&item.server_id, &item.id).join(&name);
        self.write_payload(&path, contents).await?;

        let file = ItemFileInfo {
            name,
            item_id: item.id.clone(),
            file_type: ItemFileType::Subtitles,
            image_type: None,
            index: None,
            path: path.to_string_lossy().into_owned(),
        };
        self.insert_file_record(&file).await?;
        Ok(file)
    }

    async fn save_item_image(
        &self,
        item_id: &str,
        image_type: ImageType,
        contents: Bytes,
    ) -> Result<ItemFileInfo> {
        let path = self.image_path(item_id, image_type);
        self.write_payload(&path, contents).await?;

        let file = ItemFileInfo {
            name: format!("{}.img", image_type.as_str()),
            item_id: item_id.to_string(),
            file_type: ItemFileType::Image,
            image_type: Some(image_type),
            index: None,
            path: path.to_string_lossy().into_owned(),
        };
        self.insert_file_record(&file).await?;
        Ok(file)
    }

    async fn has_item_image(&self, item_id: &str, image_type: ImageType) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM item_files WHERE item_id = ? AND image_type = ?",
        )
        .bind(item_id)
        .bind(image_type.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db)?;

        let count: i64 = row.try_get("n").map_err(db)?;
        Ok(count > 0)
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn record_user_action(&self, action: &UserAction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO user_actions
                (id, server_id, item_id, user_id, action_type, date, position_ticks)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&action.id)
        .bind(&action.server_id)
        .bind(&action.item_id)
        .bind(&action.user_id)
        .bind(action_type_as_str(action.action_type))
        .bind(action.date.to_rfc3339())
        .bind(action.position_ticks)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn get_user_actions(&self, server_id: &str) -> Result<Vec<UserAction>> {
        let rows = sqlx::query(
            "SELECT id, server_id, item_id, user_id, action_type, date, position_ticks
             FROM user_actions WHERE server_id = ? ORDER BY date",
        )
        .bind(server_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter()
            .map(|row| {
                let action_type: String = row.try_get("action_type").map_err(db)?;
                let date: String = row.try_get("date").map_err(db)?;
                Ok(UserAction {
                    id: row.try_get("id").map_err(db)?,
                    server_id: row.try_get("server_id").map_err(db)?,
                    item_id: row.try_get("item_id").map_err(db)?,
                    user_id: row.try_get("user_id").map_err(db)?,
                    action_type: parse_action_type(&action_type)?,
                    date: parse_date(&date)?,
                    position_ticks: row.try_get("position_ticks").map_err(db)?,
                })
            })
            .collect()
    }

    async fn delete_user_action(&self, action: &UserAction) -> Result<()> {
        sqlx::query("DELETE FROM user_actions WHERE id = ?")
            .bind(&action.id)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn save_offline_user(&self, user: &OfflineUser) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO offline_users (id, server_id, name, primary_image_tag)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.server_id)
        .bind(&user.name)
        .bind(&user.primary_image_tag)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn delete_offline_user(&self, user_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM offline_users WHERE id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn get_offline_user_ids(&self, server_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT id FROM offline_users WHERE server_id = ? ORDER BY id")
            .bind(server_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("id").map_err(db))
            .collect()
    }

    async fn save_user_image(&self, user_id: &str, contents: Bytes) -> Result<()> {
        let path = self.user_image_path(user_id);
        self.write_payload(&path, contents).await?;

        sqlx::query("INSERT OR REPLACE INTO user_images (user_id, path) VALUES (?, ?)")
            .bind(user_id)
            .bind(path.to_string_lossy().into_owned())
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn has_user_image(&self, user_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM user_images WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db)?;

        let count: i64 = row.try_get("n").map_err(db)?;
        Ok(count > 0)
    }

    async fn delete_user_image(&self, user_id: &str) -> Result<()> {
        let row = sqlx::query("SELECT path FROM user_images WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

        if let Some(row) = row {
            let path: String = row.try_get("path").map_err(db)?;
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path, error = %e, "Failed to remove avatar file");
                }
            }
        }

        sqlx::query("DELETE FROM user_images WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn list_camera_roll(&self) -> Result<Vec<LocalFileInfo>> {
        let Some(dir) = &self.camera_roll_dir else {
            return Ok(Vec::new());
        };

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() {
                continue;
            }

            let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            let extension = extension.to_ascii_lowercase();
            if !CAMERA_EXTENSIONS.contains(&extension.as_str()) {
                continue;
            }

            files.push(LocalFileInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                full_path: path.to_string_lossy().into_owned(),
                mime_type: mime_for_extension(&extension),
            });
        }

        files.sort_by(|a, b| a.full_path.cmp(&b.full_path));
        Ok(files)
    }

    async fn read_local_file(&self, full_path: &str) -> Result<Bytes> {
        Ok(Bytes::from(tokio::fs::read(full_path).await?))
    }
}

fn mime_for_extension(extension: &str) -> Option<String> {
    let mime = match extension {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "heic" => "image/heic",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        _ => return None,
    };
    Some(mime.to_string())
}
