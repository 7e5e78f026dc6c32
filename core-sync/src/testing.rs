//! Shared scripted collaborators for this crate's tests: an in-memory asset
//! store and a scenario-driven remote API client/factory.

use async_trait::async_trait;
use bridge_traits::api::{
    ApiClientFactory, ContentUploadHistory, DevicesOptions, ItemDto, LocalFileInfo,
    PublicSystemInfo, RemoteApiClient, SyncDataResponse, SyncedItem, SystemInfo,
};
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::credentials::{CredentialStore, ServerCredentials};
use bridge_traits::storage::{
    ImageType, ItemFileInfo, ItemFileType, LocalAssetStore, LocalItem, OfflineUser, UserAction,
};
use bytes::Bytes;
use core_connect::reachability::AccessProbe;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use crate::progress::ProgressReporter;

/// Progress recorder asserting on the reported sequence.
pub struct RecordingProgress {
    values: Mutex<Vec<f64>>,
}

impl RecordingProgress {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            values: Mutex::new(Vec::new()),
        })
    }

    pub fn values(&self) -> Vec<f64> {
        self.values.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<f64> {
        self.values.lock().unwrap().last().copied()
    }

    pub fn assert_monotonic(&self) {
        let values = self.values();
        for pair in values.windows(2) {
            assert!(
                pair[1] >= pair[0],
                "progress went backwards: {:?}",
                values
            );
        }
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, percent: f64) {
        self.values.lock().unwrap().push(percent);
    }
}

// ============================================================================
// In-memory asset store
// ============================================================================

#[derive(Default)]
struct StoreState {
    items: HashMap<String, LocalItem>,
    files: Vec<ItemFileInfo>,
    blobs: HashMap<String, Bytes>,
    actions: Vec<UserAction>,
    users: HashMap<String, OfflineUser>,
    user_images: HashMap<String, Bytes>,
    camera_roll: Vec<LocalFileInfo>,
    local_files: HashMap<String, Bytes>,
    fail_file_deletes_for: HashSet<String>,
}

/// In-memory [`LocalAssetStore`] with scriptable failures.
#[derive(Default)]
pub struct MemoryAssetStore {
    state: Mutex<StoreState>,
}

impl MemoryAssetStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_item(&self, item: LocalItem) {
        self.state
            .lock()
            .unwrap()
            .items
            .insert(item.id.clone(), item);
    }

    pub fn insert_action(&self, action: UserAction) {
        self.state.lock().unwrap().actions.push(action);
    }

    pub fn insert_user(&self, user: OfflineUser) {
        self.state
            .lock()
            .unwrap()
            .users
            .insert(user.id.clone(), user);
    }

    pub fn insert_camera_file(&self, file: LocalFileInfo, contents: Bytes) {
        let mut state = self.state.lock().unwrap();
        state.local_files.insert(file.full_path.clone(), contents);
        state.camera_roll.push(file);
    }

    /// Make every file delete for `item_id` fail with an IO error.
    pub fn fail_file_deletes_for(&self, item_id: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_file_deletes_for
            .insert(item_id.to_string());
    }

    pub fn item(&self, item_id: &str) -> Option<LocalItem> {
        self.state.lock().unwrap().items.get(item_id).cloned()
    }

    pub fn files_for(&self, item_id: &str) -> Vec<ItemFileInfo> {
        self.state
            .lock()
            .unwrap()
            .files
            .iter()
            .filter(|f| f.item_id == item_id)
            .cloned()
            .collect()
    }

    pub fn action_count(&self) -> usize {
        self.state.lock().unwrap().actions.len()
    }

    pub fn user(&self, user_id: &str) -> Option<OfflineUser> {
        self.state.lock().unwrap().users.get(user_id).cloned()
    }
}

#[async_trait]
impl LocalAssetStore for MemoryAssetStore {
    async fn get_local_item(&self, item_id: &str) -> Result<Option<LocalItem>> {
        Ok(self.state.lock().unwrap().items.get(item_id).cloned())
    }

    async fn save_local_item(&self, item: &LocalItem) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .items
            .insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn delete_local_item(&self, item_id: &str) -> Result<()> {
        self.state.lock().unwrap().items.remove(item_id);
        Ok(())
    }

    async fn get_server_item_ids(&self, server_id: &str) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .items
            .values()
            .filter(|i| i.server_id == server_id)
            .map(|i| i.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn get_files(&self, item_id: &str) -> Result<Vec<ItemFileInfo>> {
        Ok(self.files_for(item_id))
    }

    async fn delete_file(&self, file: &ItemFileInfo) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_file_deletes_for.contains(&file.item_id) {
            return Err(BridgeError::OperationFailed(format!(
                "scripted delete failure for {}",
                file.item_id
            )));
        }
        state.blobs.remove(&file.path);
        state
            .files
            .retain(|f| !(f.item_id == file.item_id && f.name == file.name));
        Ok(())
    }

    async fn save_media(
        &self,
        item: &LocalItem,
        name: &str,
        contents: Bytes,
    ) -> Result<ItemFileInfo> {
        let file = ItemFileInfo {
            name: name.to_string(),
            item_id: item.id.clone(),
            file_type: ItemFileType::Media,
            image_type: None,
            index: None,
            path: format!("/cache/{}/{}/{}", item.server_id, item.id, name),
        };
        let mut state = self.state.lock().unwrap();
        state.blobs.insert(file.path.clone(), contents);
        state.files.push(file.clone());
        Ok(file)
    }

    async fn save_subtitles(
        &self,
        item: &LocalItem,
        name: &str,
        contents: Bytes,
    ) -> Result<ItemFileInfo> {
        let file = ItemFileInfo {
            name: name.to_string(),
            item_id: item.id.clone(),
            file_type: ItemFileType::Subtitles,
            image_type: None,
            index: None,
            path: format!("/cache/{}/{}/{}", item.server_id, item.id, name),
        };
        let mut state = self.state.lock().unwrap();
        state.blobs.insert(file.path.clone(), contents);
        state.files.push(file.clone());
        Ok(file)
    }

    async fn save_item_image(
        &self,
        item_id: &str,
        image_type: ImageType,
        contents: Bytes,
    ) -> Result<ItemFileInfo> {
        let file = ItemFileInfo {
            name: format!("{}.img", image_type.as_str()),
            item_id: item_id.to_string(),
            file_type: ItemFileType::Image,
            image_type: Some(image_type),
            index: None,
            path: format!("/cache/images/{}-{}.img", item_id, image_type.as_str()),
        };
        let mut state = self.state.lock().unwrap();
        state.blobs.insert(file.path.clone(), contents);
        state.files.push(file.clone());
        Ok(file)
    }

    async fn has_item_image(&self, item_id: &str, image_type: ImageType) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .files
            .iter()
            .any(|f| f.item_id == item_id && f.image_type == Some(image_type)))
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().blobs.contains_key(path))
    }

    async fn record_user_action(&self, action: &UserAction) -> Result<()> {
        self.state.lock().unwrap().actions.push(action.clone());
        Ok(())
    }

    async fn get_user_actions(&self, server_id: &str) -> Result<Vec<UserAction>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .actions
            .iter()
            .filter(|a| a.server_id == server_id)
            .cloned()
            .collect())
    }

    async fn delete_user_action(&self, action: &UserAction) -> Result<()> {
        self.state.lock().unwrap().actions.retain(|a| a.id != action.id);
        Ok(())
    }

    async fn save_offline_user(&self, user: &OfflineUser) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .users
            .insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn delete_offline_user(&self, user_id: &str) -> Result<()> {
        self.state.lock().unwrap().users.remove(user_id);
        Ok(())
    }

    async fn get_offline_user_ids(&self, server_id: &str) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .users
            .values()
            .filter(|u| u.server_id == server_id)
            .map(|u| u.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn save_user_image(&self, user_id: &str, contents: Bytes) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .user_images
            .insert(user_id.to_string(), contents);
        Ok(())
    }

    async fn has_user_image(&self, user_id: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().user_images.contains_key(user_id))
    }

    async fn delete_user_image(&self, user_id: &str) -> Result<()> {
        self.state.lock().unwrap().user_images.remove(user_id);
        Ok(())
    }

    async fn list_camera_roll(&self) -> Result<Vec<LocalFileInfo>> {
        Ok(self.state.lock().unwrap().camera_roll.clone())
    }

    async fn read_local_file(&self, full_path: &str) -> Result<Bytes> {
        self.state
            .lock()
            .unwrap()
            .local_files
            .get(full_path)
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(format!("no local file {}", full_path)))
    }
}

// ============================================================================
// Scripted remote API client
// ============================================================================

/// Scripted behavior for one user id.
pub enum UserFixture {
    Found(OfflineUser),
    Missing,
    Error,
}

/// Scenario shared by every client handle a [`ScriptedFactory`] creates for
/// one address. Public fields are the script; `Mutex`ed fields record calls.
pub struct ScriptedScenario {
    pub server_id: String,
    pub reachable: bool,
    pub supports_sync: bool,
    pub fail_system_info: Mutex<bool>,
    pub fail_report_actions: Mutex<bool>,
    pub reported_action_batches: Mutex<Vec<Vec<UserAction>>>,
    pub sync_data_responses: Mutex<VecDeque<SyncDataResponse>>,
    pub sync_data_requests: Mutex<Vec<(Vec<String>, Vec<String>)>>,
    pub ready_items: Mutex<Vec<SyncedItem>>,
    pub fail_media_for: Mutex<HashSet<String>>,
    pub additional_files: Mutex<HashMap<String, Bytes>>,
    pub transferred: Mutex<Vec<String>>,
    pub requested_images: Mutex<Vec<(String, ImageType)>>,
    pub users: Mutex<HashMap<String, UserFixture>>,
    pub user_images: Mutex<HashMap<String, Bytes>>,
    pub devices_options: Mutex<DevicesOptions>,
    pub upload_history: Mutex<ContentUploadHistory>,
    pub uploaded_paths: Mutex<Vec<String>>,
    pub fail_upload_paths: Mutex<HashSet<String>>,
}

impl ScriptedScenario {
    fn plain(server_id: &str) -> Self {
        Self {
            server_id: server_id.to_string(),
            reachable: true,
            supports_sync: true,
            fail_system_info: Mutex::new(false),
            fail_report_actions: Mutex::new(false),
            reported_action_batches: Mutex::new(Vec::new()),
            sync_data_responses: Mutex::new(VecDeque::new()),
            sync_data_requests: Mutex::new(Vec::new()),
            ready_items: Mutex::new(Vec::new()),
            fail_media_for: Mutex::new(HashSet::new()),
            additional_files: Mutex::new(HashMap::new()),
            transferred: Mutex::new(Vec::new()),
            requested_images: Mutex::new(Vec::new()),
            users: Mutex::new(HashMap::new()),
            user_images: Mutex::new(HashMap::new()),
            devices_options: Mutex::new(DevicesOptions::default()),
            upload_history: Mutex::new(ContentUploadHistory::default()),
            uploaded_paths: Mutex::new(Vec::new()),
            fail_upload_paths: Mutex::new(HashSet::new()),
        }
    }

    pub fn new(server_id: &str) -> Arc<Self> {
        Arc::new(Self::plain(server_id))
    }

    pub fn unreachable(server_id: &str) -> Arc<Self> {
        let mut scenario = Self::plain(server_id);
        scenario.reachable = false;
        Arc::new(scenario)
    }

    pub fn without_sync_support(server_id: &str) -> Arc<Self> {
        let mut scenario = Self::plain(server_id);
        scenario.supports_sync = false;
        Arc::new(scenario)
    }

    pub fn push_sync_data_response(&self, response: SyncDataResponse) {
        self.sync_data_responses.lock().unwrap().push_back(response);
    }

    pub fn push_ready_item(&self, item: SyncedItem) {
        self.ready_items.lock().unwrap().push(item);
    }

    pub fn add_additional_file(&self, job_item_id: &str, name: &str, contents: Bytes) {
        self.additional_files
            .lock()
            .unwrap()
            .insert(format!("{}/{}", job_item_id, name), contents);
    }

    pub fn transferred_ids(&self) -> Vec<String> {
        self.transferred.lock().unwrap().clone()
    }

    pub fn sync_data_request_count(&self) -> usize {
        self.sync_data_requests.lock().unwrap().len()
    }
}

/// Client handle bound to one [`ScriptedScenario`].
pub struct ScriptedApiClient {
    scenario: Arc<ScriptedScenario>,
    address: Mutex<String>,
    auth: Mutex<Option<String>>,
}

impl ScriptedApiClient {
    pub fn new(scenario: Arc<ScriptedScenario>, address: &str) -> Arc<Self> {
        Arc::new(Self {
            scenario,
            address: Mutex::new(address.to_string()),
            auth: Mutex::new(None),
        })
    }
}

#[async_trait]
impl RemoteApiClient for ScriptedApiClient {
    fn server_address(&self) -> String {
        self.address.lock().unwrap().clone()
    }

    fn set_server_address(&self, address: &str) {
        *self.address.lock().unwrap() = address.to_string();
    }

    fn set_auth(&self, access_token: Option<String>, _user_id: Option<String>) {
        *self.auth.lock().unwrap() = access_token;
    }

    async fn get_public_system_info(&self) -> Result<PublicSystemInfo> {
        if !self.scenario.reachable {
            return Err(BridgeError::OperationFailed(
                "connection refused".to_string(),
            ));
        }
        Ok(PublicSystemInfo {
            id: self.scenario.server_id.clone(),
            server_name: format!("Scripted {}", self.scenario.server_id),
            version: Some("4.8".to_string()),
            local_address: None,
        })
    }

    async fn get_system_info(&self) -> Result<SystemInfo> {
        if *self.scenario.fail_system_info.lock().unwrap() {
            return Err(BridgeError::OperationFailed("system info failed".to_string()));
        }
        Ok(SystemInfo {
            id: self.scenario.server_id.clone(),
            server_name: format!("Scripted {}", self.scenario.server_id),
            version: Some("4.8".to_string()),
            supports_sync: self.scenario.supports_sync,
        })
    }

    async fn sync_data(
        &self,
        _device_id: &str,
        local_item_ids: Vec<String>,
        offline_user_ids: Vec<String>,
    ) -> Result<SyncDataResponse> {
        self.scenario
            .sync_data_requests
            .lock()
            .unwrap()
            .push((local_item_ids, offline_user_ids));
        Ok(self
            .scenario
            .sync_data_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    async fn get_ready_sync_items(&self, _device_id: &str) -> Result<Vec<SyncedItem>> {
        let transferred = self.scenario.transferred.lock().unwrap().clone();
        Ok(self
            .scenario
            .ready_items
            .lock()
            .unwrap()
            .iter()
            .filter(|item| !transferred.contains(&item.sync_job_item_id))
            .cloned()
            .collect())
    }

    async fn get_sync_job_item_file(&self, sync_job_item_id: &str) -> Result<Bytes> {
        if self
            .scenario
            .fail_media_for
            .lock()
            .unwrap()
            .contains(sync_job_item_id)
        {
            return Err(BridgeError::OperationFailed(format!(
                "media transfer failed for {}",
                sync_job_item_id
            )));
        }
        Ok(Bytes::from(format!("media:{}", sync_job_item_id)))
    }

    async fn get_sync_job_item_additional_file(
        &self,
        sync_job_item_id: &str,
        name: &str,
    ) -> Result<Bytes> {
        self.scenario
            .additional_files
            .lock()
            .unwrap()
            .get(&format!("{}/{}", sync_job_item_id, name))
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(format!("no additional file {}", name)))
    }

    async fn report_sync_job_item_transferred(&self, sync_job_item_id: &str) -> Result<()> {
        self.scenario
            .transferred
            .lock()
            .unwrap()
            .push(sync_job_item_id.to_string());
        Ok(())
    }

    async fn report_offline_actions(&self, actions: &[UserAction]) -> Result<()> {
        if *self.scenario.fail_report_actions.lock().unwrap() {
            return Err(BridgeError::OperationFailed("report failed".to_string()));
        }
        self.scenario
            .reported_action_batches
            .lock()
            .unwrap()
            .push(actions.to_vec());
        Ok(())
    }

    async fn get_offline_user(&self, user_id: &str) -> Result<OfflineUser> {
        match self.scenario.users.lock().unwrap().get(user_id) {
            Some(UserFixture::Found(user)) => Ok(user.clone()),
            Some(UserFixture::Missing) | None => {
                Err(BridgeError::NotFound(format!("user {}", user_id)))
            }
            Some(UserFixture::Error) => {
                Err(BridgeError::OperationFailed("user fetch failed".to_string()))
            }
        }
    }

    async fn get_item_image(&self, item_id: &str, image_type: ImageType) -> Result<Bytes> {
        self.scenario
            .requested_images
            .lock()
            .unwrap()
            .push((item_id.to_string(), image_type));
        Ok(Bytes::from(format!("image:{}:{}", item_id, image_type.as_str())))
    }

    async fn get_user_image(&self, user_id: &str) -> Result<Bytes> {
        self.scenario
            .user_images
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(format!("no avatar for {}", user_id)))
    }

    async fn get_devices_options(&self) -> Result<DevicesOptions> {
        Ok(self.scenario.devices_options.lock().unwrap().clone())
    }

    async fn get_content_upload_history(&self, _device_id: &str) -> Result<ContentUploadHistory> {
        Ok(self.scenario.upload_history.lock().unwrap().clone())
    }

    async fn upload_file(
        &self,
        _device_id: &str,
        file: &LocalFileInfo,
        _contents: Bytes,
    ) -> Result<()> {
        if self
            .scenario
            .fail_upload_paths
            .lock()
            .unwrap()
            .contains(&file.full_path)
        {
            return Err(BridgeError::OperationFailed(format!(
                "upload failed for {}",
                file.full_path
            )));
        }
        self.scenario
            .uploaded_paths
            .lock()
            .unwrap()
            .push(file.full_path.clone());
        Ok(())
    }
}

/// Factory handing out [`ScriptedApiClient`]s by probed address.
#[derive(Default)]
pub struct ScriptedFactory {
    scenarios: Mutex<HashMap<String, Arc<ScriptedScenario>>>,
}

impl ScriptedFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, address: &str, scenario: Arc<ScriptedScenario>) {
        self.scenarios
            .lock()
            .unwrap()
            .insert(address.to_string(), scenario);
    }
}

impl ApiClientFactory for ScriptedFactory {
    fn create(&self, address: &str) -> Arc<dyn RemoteApiClient> {
        let scenario = self
            .scenarios
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_else(|| ScriptedScenario::unreachable("unknown"));
        ScriptedApiClient::new(scenario, address)
    }
}

// ============================================================================
// Miscellaneous fakes
// ============================================================================

/// Access probe with a static allow/deny script.
pub struct StaticAccessProbe {
    denied: HashSet<String>,
}

impl StaticAccessProbe {
    pub fn allowing_all() -> Arc<Self> {
        Arc::new(Self {
            denied: HashSet::new(),
        })
    }

    pub fn denying(paths: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            denied: paths.iter().map(|p| p.to_string()).collect(),
        })
    }
}

#[async_trait]
impl AccessProbe for StaticAccessProbe {
    async fn can_access_file(&self, path: &str) -> bool {
        !self.denied.contains(path)
    }

    async fn can_access_directory(&self, path: &str) -> bool {
        !self.denied.contains(path)
    }

    async fn can_access_url(&self, url: &str) -> bool {
        !self.denied.contains(url)
    }
}

/// Network bridge with fixed answers; wake requests always succeed.
pub struct StaticNetwork {
    pub on_local_network: bool,
}

#[async_trait]
impl bridge_traits::network::NetworkBridge for StaticNetwork {
    async fn is_on_local_network(&self) -> bool {
        self.on_local_network
    }

    async fn send_wake_on_lan(&self, _mac_address: &str) -> Result<()> {
        Ok(())
    }
}

/// Credential store backed by a mutex-guarded value.
pub struct MemoryCredentialStore {
    state: Mutex<ServerCredentials>,
}

impl MemoryCredentialStore {
    pub fn new(credentials: ServerCredentials) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(credentials),
        })
    }

    pub fn snapshot(&self) -> ServerCredentials {
        self.state.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<ServerCredentials> {
        Ok(self.state.lock().unwrap().clone())
    }

    async fn save(&self, credentials: &ServerCredentials) -> Result<()> {
        *self.state.lock().unwrap() = credentials.clone();
        Ok(())
    }
}

// ============================================================================
// Fixture helpers
// ============================================================================

pub fn item_dto(id: &str) -> ItemDto {
    ItemDto {
        id: id.to_string(),
        name: Some(format!("Item {}", id)),
        media_sources: vec![],
        has_primary_image: false,
        series_id: None,
        series_primary_image_tag: None,
        series_thumb_image_tag: None,
        album_id: None,
        album_primary_image_tag: None,
    }
}

pub fn synced_item(job_id: &str, item: ItemDto) -> SyncedItem {
    SyncedItem {
        sync_job_item_id: job_id.to_string(),
        original_file_name: format!("{}.mkv", item.id),
        item,
        additional_files: vec![],
    }
}
