//! # Offline Media Synchronization
//!
//! Orchestrates the reconciliation of a client-local media cache with one or
//! more media servers across unreliable connectivity.
//!
//! ## Components
//!
//! - **Media Sync Engine** (`engine`): the per-server sequence — capability
//!   check, offline action replay, two-pass set reconciliation, per-item
//!   asset retrieval with acknowledgement
//! - **Fleet Sync Coordinator** (`fleet`): runs the sequence for every known
//!   server sequentially, with equal-weight aggregate progress
//! - **Offline User Reconciler** (`users`): keeps cached user records and
//!   avatars aligned with each server's authorized-user list
//! - **Content Uploader** (`upload`): pushes camera-roll files the server
//!   has not seen yet
//! - **Progress** (`progress`): pure composition of phase weights into the
//!   0-100 value both entry points report

pub mod engine;
pub mod error;
pub mod fleet;
pub mod progress;
pub mod upload;
pub mod users;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{MediaSyncEngine, SyncStats};
pub use error::{Result, SyncError};
pub use fleet::FleetSyncCoordinator;
pub use progress::{FnProgress, NoopProgress, ProgressReporter, ScaledProgress};
pub use upload::{ContentUploader, UploadStats};
pub use users::OfflineUserReconciler;
