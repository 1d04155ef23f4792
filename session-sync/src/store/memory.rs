//! In-process store, for tests and single-host setups.

use super::{RecordUpdate, RemoteSessionRecord, SessionStore};
use crate::utils::{Result, SyncError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<HashMap<String, RemoteSessionRecord>>>,
    offline: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unreachable store: every call fails until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::RemoteUnavailable("memory store is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, manager_id: &str) -> Result<Option<RemoteSessionRecord>> {
        self.check_online()?;
        Ok(self.records.read().await.get(manager_id).cloned())
    }

    async fn put(&self, record: RemoteSessionRecord) -> Result<()> {
        self.check_online()?;
        self.records
            .write()
            .await
            .insert(record.manager_id.clone(), record);
        Ok(())
    }

    async fn update(&self, manager_id: &str, update: RecordUpdate) -> Result<bool> {
        self.check_online()?;
        let mut records = self.records.write().await;
        match records.get_mut(manager_id) {
            Some(record) => {
                update.apply(record);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, manager_id: &str) -> Result<u64> {
        self.check_online()?;
        Ok(self.records.write().await.remove(manager_id).map_or(0, |_| 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_get_absent_is_none() {
        let store = MemoryStore::new();
        assert!(store.get("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_is_create_or_replace() {
        let store = MemoryStore::new();
        store
            .put(RemoteSessionRecord::new("alice", Bytes::from_static(b"v1")))
            .await
            .unwrap();
        store
            .put(RemoteSessionRecord::new("alice", Bytes::from_static(b"v2")))
            .await
            .unwrap();

        assert_eq!(store.len().await, 1);
        let record = store.get("alice").await.unwrap().unwrap();
        assert_eq!(record.session, Bytes::from_static(b"v2"));
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let store = MemoryStore::new();
        let matched = store.update("ghost", RecordUpdate::touch()).await.unwrap();
        assert!(!matched);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        store
            .put(RemoteSessionRecord::new("alice", Bytes::from_static(b"v1")))
            .await
            .unwrap();

        assert_eq!(store.delete("alice").await.unwrap(), 1);
        assert_eq!(store.delete("alice").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_offline_is_distinct_from_not_found() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.get("alice").await,
            Err(SyncError::RemoteUnavailable(_))
        ));
        store.set_offline(false);
        assert!(store.get("alice").await.unwrap().is_none());
    }
}
