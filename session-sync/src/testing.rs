//! Test doubles shared by the engine's unit tests.

use crate::store::{MemoryStore, RecordUpdate, RemoteSessionRecord, SessionStore};
use crate::utils::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Wraps a [`MemoryStore`], counting calls and optionally slowing writes.
#[derive(Clone, Default)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    pub puts: Arc<AtomicUsize>,
    pub updates: Arc<AtomicUsize>,
    pub deletes: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
    write_delay: Duration,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_write_delay(delay: Duration) -> Self {
        Self {
            write_delay: delay,
            ..Self::default()
        }
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn slow_write(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.write_delay.is_zero() {
            tokio::time::sleep(self.write_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionStore for RecordingStore {
    async fn get(&self, manager_id: &str) -> Result<Option<RemoteSessionRecord>> {
        self.inner.get(manager_id).await
    }

    async fn put(&self, record: RemoteSessionRecord) -> Result<()> {
        self.slow_write().await;
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(record).await
    }

    async fn update(&self, manager_id: &str, update: RecordUpdate) -> Result<bool> {
        self.slow_write().await;
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update(manager_id, update).await
    }

    async fn delete(&self, manager_id: &str) -> Result<u64> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(manager_id).await
    }
}

/// A small browser profile with retained and disposable content.
pub fn write_profile(session: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(session.join("Default/Local Storage/leveldb"))?;
    std::fs::create_dir_all(session.join("Default/IndexedDB/site.indexeddb.leveldb"))?;
    std::fs::create_dir_all(session.join("Default/Cache"))?;
    std::fs::write(session.join("Default/Local Storage/leveldb/000003.log"), b"local-storage")?;
    std::fs::write(session.join("Default/IndexedDB/site.indexeddb.leveldb/CURRENT"), b"MANIFEST-000001")?;
    std::fs::write(session.join("Default/Cache/data_0"), b"cache")?;
    std::fs::write(session.join("Local State"), b"{}")?;
    Ok(())
}
