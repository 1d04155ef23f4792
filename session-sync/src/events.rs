//! Notifications emitted by the engine to the host.
//!
//! Events are fanned out on a broadcast channel. Publishing never blocks and
//! never fails; with no subscriber the event is simply dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Maximum number of queued events per subscriber
const BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum SessionEvent {
    /// First backup of a session that had no remote record before.
    #[serde(rename = "session:saved")]
    RemoteSessionSaved { client_id: String },

    /// A sync cycle stored or updated the remote record.
    #[serde(rename = "sync:completed")]
    SyncCompleted {
        client_id: String,
        bytes: u64,
        created: bool,
    },

    /// A sync cycle failed; the schedule keeps running.
    #[serde(rename = "sync:failed")]
    SyncFailed { client_id: String, error: String },

    /// A best-effort cleanup step could not remove a path.
    #[serde(rename = "cleanup:failed")]
    CleanupFailed { path: String, error: String },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
