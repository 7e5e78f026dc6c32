//! # Local Asset Catalog
//!
//! SQLite-backed implementation of the
//! [`LocalAssetStore`](bridge_traits::storage::LocalAssetStore) seam:
//! cached item records, their physical files, offline users, and the
//! offline user-action queue.

pub mod db;
pub mod error;
pub mod store;

pub use db::{create_pool, create_test_pool};
pub use error::{LibraryError, Result};
pub use store::SqliteAssetStore;
