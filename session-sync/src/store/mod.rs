//! Remote session store abstraction.
//!
//! The engine only needs four operations on a single logical collection of
//! records keyed by `managerId`. Backends implement [`SessionStore`]; the
//! engine receives one at construction and never builds connections itself.

pub mod http;
pub mod memory;

use crate::utils::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use http::HttpStore;
pub use memory::MemoryStore;

/// The stored representation of one client's session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSessionRecord {
    pub manager_id: String,
    #[serde(skip)]
    pub session: Bytes,
    pub last_check: DateTime<Utc>,
    pub authenticated: bool,
}

impl RemoteSessionRecord {
    /// A freshly authenticated session checked now.
    pub fn new(manager_id: impl Into<String>, session: Bytes) -> Self {
        Self {
            manager_id: manager_id.into(),
            session,
            last_check: Utc::now(),
            authenticated: true,
        }
    }
}

/// Fields to change on an existing record. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordUpdate {
    pub session: Option<Bytes>,
    pub last_check: Option<DateTime<Utc>>,
    pub authenticated: Option<bool>,
}

impl RecordUpdate {
    /// Replace the session blob and bump `lastCheck`.
    pub fn session(session: Bytes) -> Self {
        Self {
            session: Some(session),
            last_check: Some(Utc::now()),
            authenticated: None,
        }
    }

    /// Only bump `lastCheck`.
    pub fn touch() -> Self {
        Self {
            last_check: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn apply(&self, record: &mut RemoteSessionRecord) {
        if let Some(session) = &self.session {
            record.session = session.clone();
        }
        if let Some(last_check) = self.last_check {
            record.last_check = last_check;
        }
        if let Some(authenticated) = self.authenticated {
            record.authenticated = authenticated;
        }
    }
}

/// CRUD over remote session records.
///
/// Every method fails with [`SyncError::RemoteUnavailable`](crate::SyncError::RemoteUnavailable)
/// on connectivity or authentication problems. "Not found" is never an error.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The most recently written record for `manager_id`, if any.
    async fn get(&self, manager_id: &str) -> Result<Option<RemoteSessionRecord>>;

    /// Create or replace the record for `record.manager_id`.
    async fn put(&self, record: RemoteSessionRecord) -> Result<()>;

    /// Change fields of an existing record. Returns `false` if none matched.
    async fn update(&self, manager_id: &str, update: RecordUpdate) -> Result<bool>;

    /// Remove every record for `manager_id`, returning how many were removed.
    async fn delete(&self, manager_id: &str) -> Result<u64>;
}
