use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync cancelled")]
    Cancelled,

    #[error("Connect failed: {0}")]
    Connect(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl SyncError {
    /// Cancellation unwinds; it is not a failure and is never logged as one.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
