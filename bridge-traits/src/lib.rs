//! # Host Bridge Traits
//!
//! Collaborator seams between the sync core and everything it does not own.
//!
//! ## Overview
//!
//! This crate defines the contract between the core crates and their
//! host-provided collaborators, together with the data model types that cross
//! those seams. Each trait represents a capability the core requires but does
//! not implement itself:
//!
//! - [`RemoteApiClient`](api::RemoteApiClient) — bound handle to one media
//!   server's HTTP API (the REST mapping itself is host-provided)
//! - [`ApiClientFactory`](api::ApiClientFactory) — creates bound handles for
//!   candidate addresses
//! - [`LocalAssetStore`](storage::LocalAssetStore) — items, files, offline
//!   users, and the offline action queue
//! - [`CredentialStore`](credentials::CredentialStore) — known servers and
//!   session state
//! - [`NetworkBridge`](network::NetworkBridge) — local-network detection and
//!   wake-on-LAN
//!
//! ## Error Handling
//!
//! All traits use [`BridgeError`](error::BridgeError) as their error
//! currency. Implementations should map authoritative remote rejections to
//! `NotFound`/`Unauthorized` and transport-level failures to
//! `OperationFailed`/`Timeout`, since callers branch on that distinction.
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync`; handles are shared across async tasks
//! behind `Arc`.

pub mod api;
pub mod credentials;
pub mod error;
pub mod network;
pub mod storage;

pub use error::BridgeError;

// Re-export commonly used types
pub use api::{
    ApiClientFactory, ContentUploadHistory, DevicesOptions, ItemDto, ItemFileResponse,
    LocalFileInfo, MediaSourceInfo, MediaStream, MediaStreamType, PublicSystemInfo,
    RemoteApiClient, SyncDataResponse, SyncedItem, SystemInfo,
};
pub use credentials::{
    ConnectionMode, CredentialStore, ServerCredentials, ServerRecord, ServerUserInfo,
};
pub use network::NetworkBridge;
pub use storage::{
    ImageType, ItemFileInfo, ItemFileType, LocalAssetStore, LocalItem, OfflineUser, UserAction,
    UserActionType,
};
