use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Discovery failed: {0}")]
    Discovery(#[from] std::io::Error),

    #[error("Connect cancelled")]
    Cancelled,

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, ConnectError>;
