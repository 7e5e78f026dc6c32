//! JSON File Credential Store
//!
//! Persists [`ServerCredentials`] as pretty-printed JSON at a configurable
//! path. Writes go through a temp file and rename so a crash mid-save never
//! leaves a half-written credential file behind. A missing file reads as
//! empty credentials, not an error.

use async_trait::async_trait;
use bridge_traits::credentials::{CredentialStore, ServerCredentials};
use bridge_traits::error::{BridgeError, Result};
use std::path::PathBuf;
use tracing::debug;

/// File-backed implementation of [`CredentialStore`].
pub struct JsonCredentialStore {
    path: PathBuf,
}

impl JsonCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CredentialStore for JsonCredentialStore {
    async fn load(&self) -> Result<ServerCredentials> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "No credential file yet");
                return Ok(ServerCredentials::default());
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&contents).map_err(|e| {
            BridgeError::OperationFailed(format!(
                "corrupt credential file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    async fn save(&self, credentials: &ServerCredentials) -> Result<()> {
        let contents = serde_json::to_vec_pretty(credentials).map_err(|e| {
            BridgeError::OperationFailed(format!("credential serialization failed: {}", e))
        })?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, &contents).await?;
        tokio::fs::rename(&staging, &self.path).await?;

        debug!(path = ?self.path, servers = credentials.servers.len(), "Saved credentials");
        Ok(())
    }
}
