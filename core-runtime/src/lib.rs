//! # Core Runtime
//!
//! Ambient infrastructure shared by the sync core: the typed event bus,
//! logging bootstrap, and core configuration.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, DiscoveryConfig};
pub use error::{Error, Result};
pub use events::{ConnectionEvent, CoreEvent, EventBus, EventSeverity, SyncEvent, UploadEvent};
pub use logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
