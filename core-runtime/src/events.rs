//! # Event Bus System
//!
//! Decoupled communication between core modules using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! Orchestrators publish typed [`CoreEvent`]s; any number of subscribers
//! consume them independently. Because each subscriber owns its own receiver,
//! a slow, failing, or panicking subscriber cannot affect delivery to the
//! others — the channel replaces the multicast-delegate pattern without
//! shared dispatch state.
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber was too slow and missed `n`
//!   events. Non-fatal; the subscriber keeps receiving new events.
//! - **`RecvError::Closed`**: all senders are gone. Treat as shutdown.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{ConnectionEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut stream = bus.subscribe();
//!
//! bus.emit(CoreEvent::Connection(ConnectionEvent::SignedOut {
//!     server_id: "abc".to_string(),
//! }))
//! .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Signed out of server");
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Server discovery and connection events
    Connection(ConnectionEvent),
    /// Synchronization events
    Sync(SyncEvent),
    /// Content upload events
    Upload(UploadEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Connection(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Upload(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Connection(ConnectionEvent::Unavailable { .. }) => EventSeverity::Warning,
            CoreEvent::Connection(ConnectionEvent::Connected { .. }) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Upload(UploadEvent::Completed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Connection Events
// ============================================================================

/// Events related to server discovery and connection management.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum ConnectionEvent {
    /// A server answered the LAN discovery probe.
    ServerDiscovered {
        name: String,
        address: String,
    },
    /// A reachable address was found and the record persisted.
    Connected {
        server_id: String,
        server_name: String,
        /// Whether a stored token validated; false means server-sign-in is
        /// required before authenticated calls.
        signed_in: bool,
    },
    /// A stored token failed validation and was cleared.
    SignedOut {
        server_id: String,
    },
    /// Every candidate address of every candidate server failed.
    Unavailable {
        /// How many servers were attempted.
        attempted: usize,
    },
}

impl ConnectionEvent {
    fn description(&self) -> &str {
        match self {
            ConnectionEvent::ServerDiscovered { .. } => "Server discovered on LAN",
            ConnectionEvent::Connected { .. } => "Connected to server",
            ConnectionEvent::SignedOut { .. } => "Signed out of server",
            ConnectionEvent::Unavailable { .. } => "No server reachable",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events related to per-server synchronization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// Sync sequence started for a server.
    Started {
        server_id: String,
    },
    /// Incremental progress update (0-100 within one server's sync).
    Progress {
        server_id: String,
        percent: f64,
        phase: String,
    },
    /// An item was evicted by server-side reconciliation.
    ItemRemoved {
        server_id: String,
        item_id: String,
    },
    /// A job item finished transferring and was acknowledged.
    ItemSynced {
        server_id: String,
        item_id: String,
    },
    /// Sync sequence finished.
    Completed {
        server_id: String,
        items_synced: u64,
        items_removed: u64,
    },
    /// Sync sequence aborted with an error.
    Failed {
        server_id: String,
        message: String,
    },
    /// Sync sequence observed cancellation and unwound.
    Cancelled {
        server_id: String,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::Progress { .. } => "Sync progress",
            SyncEvent::ItemRemoved { .. } => "Item removed by reconciliation",
            SyncEvent::ItemSynced { .. } => "Item transferred",
            SyncEvent::Completed { .. } => "Sync completed",
            SyncEvent::Failed { .. } => "Sync failed",
            SyncEvent::Cancelled { .. } => "Sync cancelled",
        }
    }
}

// ============================================================================
// Upload Events
// ============================================================================

/// Events related to camera-roll content upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum UploadEvent {
    /// Upload pass started with the given number of pending files.
    Started {
        server_id: String,
        pending: usize,
    },
    /// One file finished uploading.
    FileUploaded {
        server_id: String,
        name: String,
    },
    /// Upload pass finished.
    Completed {
        server_id: String,
        uploaded: u64,
        failed: u64,
    },
}

impl UploadEvent {
    fn description(&self) -> &str {
        match self {
            UploadEvent::Started { .. } => "Content upload started",
            UploadEvent::FileUploaded { .. } => "File uploaded",
            UploadEvent::Completed { .. } => "Content upload completed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for publishing [`CoreEvent`]s.
///
/// Cheap to clone; clones share the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Returns the number of subscribers that will observe the event. An
    /// `Err` only means nobody is listening, which callers routinely ignore.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Create a new independent subscription.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_all_subscribers() {
        let bus = EventBus::new(16);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.emit(CoreEvent::Sync(SyncEvent::Started {
            server_id: "s1".to_string(),
        }))
        .unwrap();

        assert!(matches!(
            first.recv().await.unwrap(),
            CoreEvent::Sync(SyncEvent::Started { .. })
        ));
        assert!(matches!(
            second.recv().await.unwrap(),
            CoreEvent::Sync(SyncEvent::Started { .. })
        ));
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_an_error_not_a_panic() {
        let bus = EventBus::new(16);
        let result = bus.emit(CoreEvent::Connection(ConnectionEvent::Unavailable {
            attempted: 0,
        }));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_dropped_subscriber_does_not_block_others() {
        let bus = EventBus::new(16);
        let dropped = bus.subscribe();
        let mut kept = bus.subscribe();
        drop(dropped);

        bus.emit(CoreEvent::Upload(UploadEvent::Completed {
            server_id: "s1".to_string(),
            uploaded: 3,
            failed: 0,
        }))
        .unwrap();

        assert!(matches!(
            kept.recv().await.unwrap(),
            CoreEvent::Upload(UploadEvent::Completed { uploaded: 3, .. })
        ));
    }

    #[test]
    fn test_severity_mapping() {
        let failed = CoreEvent::Sync(SyncEvent::Failed {
            server_id: "s1".to_string(),
            message: "boom".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);

        let progress = CoreEvent::Sync(SyncEvent::Progress {
            server_id: "s1".to_string(),
            percent: 40.0,
            phase: "retrieval".to_string(),
        });
        assert_eq!(progress.severity(), EventSeverity::Debug);
    }
}
