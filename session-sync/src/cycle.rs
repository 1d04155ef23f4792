//! One sync cycle: package the session directory and upload it.
//!
//! At most one cycle runs at a time per engine. Ticks that arrive while a
//! cycle is in flight are dropped, not queued. Once closed, no cycle runs.

use crate::archive::ArchivePackager;
use crate::events::{EventBus, SessionEvent};
use crate::session::SessionLayout;
use crate::store::{RecordUpdate, RemoteSessionRecord, SessionStore};
use crate::utils::Result;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// How the remote record is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    /// Create the record; `notify` emits [`SessionEvent::RemoteSessionSaved`].
    Create { notify: bool },
    /// Replace the blob of the existing record.
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The record was written.
    Stored { bytes: u64, created: bool },
    /// No session directory to package yet, or syncing was closed.
    Skipped,
    /// Another cycle was already in flight.
    Dropped,
}

pub struct SyncCycle {
    manager_id: String,
    session_dir: PathBuf,
    packager: ArchivePackager,
    store: Arc<dyn SessionStore>,
    events: EventBus,
    guard: Mutex<()>,
    closed: AtomicBool,
}

impl SyncCycle {
    pub fn new(
        layout: &SessionLayout,
        packager: ArchivePackager,
        store: Arc<dyn SessionStore>,
        events: EventBus,
    ) -> Self {
        Self {
            manager_id: layout.record_key().to_string(),
            session_dir: layout.session_dir().to_path_buf(),
            packager,
            store,
            events,
            guard: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// Run a cycle, waiting for an in-flight one to finish first.
    pub async fn run(&self, kind: CycleKind) -> Result<CycleOutcome> {
        let _guard = self.guard.lock().await;
        self.execute(kind).await
    }

    /// Wait for an in-flight cycle, then refuse all later ones.
    ///
    /// No cycle runs while the returned guard is held, nor after it is
    /// released.
    pub async fn close(&self) -> MutexGuard<'_, ()> {
        let guard = self.guard.lock().await;
        self.closed.store(true, Ordering::SeqCst);
        guard
    }

    /// Run a cycle unless one is already in flight.
    pub async fn try_run(&self, kind: CycleKind) -> Result<CycleOutcome> {
        let Ok(_guard) = self.guard.try_lock() else {
            warn!(manager_id = %self.manager_id, "Sync cycle already in flight, dropping trigger");
            return Ok(CycleOutcome::Dropped);
        };
        self.execute(kind).await
    }

    async fn execute(&self, kind: CycleKind) -> Result<CycleOutcome> {
        if self.closed.load(Ordering::SeqCst) {
            debug!(manager_id = %self.manager_id, "Sync closed, skipping cycle");
            return Ok(CycleOutcome::Skipped);
        }
        let result = self.pack_and_upload(kind).await;
        if let Err(e) = &result {
            error!(manager_id = %self.manager_id, error = %e, "Sync cycle failed");
            self.events.publish(SessionEvent::SyncFailed {
                client_id: self.manager_id.clone(),
                error: e.to_string(),
            });
        }
        result
    }

    async fn pack_and_upload(&self, kind: CycleKind) -> Result<CycleOutcome> {
        if !self.session_dir.is_dir() {
            debug!(session_dir = %self.session_dir.display(), "No session directory, skipping cycle");
            return Ok(CycleOutcome::Skipped);
        }

        let archive = self.packager.pack(&self.session_dir).await?;
        let bytes = archive.len();
        let blob = archive.bytes().clone();

        let created = match kind {
            CycleKind::Create { .. } => {
                self.store
                    .put(RemoteSessionRecord::new(&self.manager_id, blob))
                    .await?;
                true
            }
            CycleKind::Update => {
                let matched = self
                    .store
                    .update(&self.manager_id, RecordUpdate::session(blob.clone()))
                    .await?;
                if !matched {
                    warn!(manager_id = %self.manager_id, "Remote record missing on update, recreating");
                    self.store
                        .put(RemoteSessionRecord::new(&self.manager_id, blob))
                        .await?;
                }
                !matched
            }
        };
        archive.discard();

        if let CycleKind::Create { notify: true } = kind {
            self.events.publish(SessionEvent::RemoteSessionSaved {
                client_id: self.manager_id.clone(),
            });
        }
        self.events.publish(SessionEvent::SyncCompleted {
            client_id: self.manager_id.clone(),
            bytes,
            created,
        });
        info!(manager_id = %self.manager_id, bytes, created, "Remote session synced");

        Ok(CycleOutcome::Stored { bytes, created })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ClientId;
    use crate::store::MemoryStore;
    use crate::testing::{write_profile, RecordingStore};
    use std::time::Duration;
    use tempfile::TempDir;

    fn cycle(data: &std::path::Path, store: Arc<dyn SessionStore>, events: EventBus) -> SyncCycle {
        let id = ClientId::new("alice").unwrap();
        let layout = SessionLayout::new(data, Some(&id));
        let packager = ArchivePackager::new(layout.clone(), events.clone());
        SyncCycle::new(&layout, packager, store, events)
    }

    #[tokio::test]
    async fn test_create_notifies_once() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        write_profile(&temp_dir.path().join("alice/session"))?;
        let store = RecordingStore::new();
        let events = EventBus::new();
        let mut rx = events.subscribe();

        let outcome = cycle(temp_dir.path(), Arc::new(store.clone()), events)
            .run(CycleKind::Create { notify: true })
            .await
            .unwrap();

        assert!(matches!(outcome, CycleOutcome::Stored { created: true, .. }));
        assert_eq!(store.puts(), 1);
        assert_eq!(
            rx.recv().await.unwrap(),
            SessionEvent::RemoteSessionSaved { client_id: "alice".into() }
        );
        assert!(matches!(rx.recv().await.unwrap(), SessionEvent::SyncCompleted { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_without_record_recreates_it() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        write_profile(&temp_dir.path().join("alice/session"))?;
        let store = RecordingStore::new();

        let outcome = cycle(temp_dir.path(), Arc::new(store.clone()), EventBus::new())
            .run(CycleKind::Update)
            .await
            .unwrap();

        assert!(matches!(outcome, CycleOutcome::Stored { created: true, .. }));
        assert_eq!(store.updates(), 1);
        assert_eq!(store.puts(), 1);
        assert!(store.inner.get("alice").await.unwrap().is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_session_dir_skips() {
        let temp_dir = TempDir::new().unwrap();
        let store = RecordingStore::new();

        let outcome = cycle(temp_dir.path(), Arc::new(store.clone()), EventBus::new())
            .run(CycleKind::Update)
            .await
            .unwrap();

        assert_eq!(outcome, CycleOutcome::Skipped);
        assert_eq!(store.updates(), 0);
    }

    #[tokio::test]
    async fn test_upload_failure_reported_and_archive_removed() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        write_profile(&temp_dir.path().join("alice/session"))?;
        let store = MemoryStore::new();
        store.set_offline(true);
        let events = EventBus::new();
        let mut rx = events.subscribe();

        let result = cycle(temp_dir.path(), Arc::new(store), events)
            .run(CycleKind::Update)
            .await;

        assert!(matches!(result, Err(crate::SyncError::RemoteUnavailable(_))));
        assert!(matches!(rx.recv().await.unwrap(), SessionEvent::SyncFailed { .. }));
        let leftovers = std::fs::read_dir(temp_dir.path().join(".session_sync_temp"))?.count();
        assert_eq!(leftovers, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_try_run_drops_while_in_flight() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        write_profile(&temp_dir.path().join("alice/session"))?;
        let store = RecordingStore::with_write_delay(Duration::from_millis(300));
        let cycle = Arc::new(cycle(temp_dir.path(), Arc::new(store.clone()), EventBus::new()));

        let first = tokio::spawn({
            let cycle = cycle.clone();
            async move { cycle.run(CycleKind::Update).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let second = cycle.try_run(CycleKind::Update).await.unwrap();
        assert_eq!(second, CycleOutcome::Dropped);

        assert!(matches!(first.await.unwrap().unwrap(), CycleOutcome::Stored { .. }));
        assert_eq!(store.max_in_flight(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_close_waits_for_in_flight_cycle() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        write_profile(&temp_dir.path().join("alice/session"))?;
        let store = RecordingStore::with_write_delay(Duration::from_millis(200));
        let cycle = Arc::new(cycle(temp_dir.path(), Arc::new(store.clone()), EventBus::new()));

        let running = tokio::spawn({
            let cycle = cycle.clone();
            async move { cycle.run(CycleKind::Create { notify: false }).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let guard = cycle.close().await;
        // The in-flight cycle finished its upload before close returned
        assert_eq!(store.puts(), 1);
        assert!(store.inner.get("alice").await.unwrap().is_some());
        drop(guard);
        assert!(matches!(running.await.unwrap().unwrap(), CycleOutcome::Stored { .. }));

        assert_eq!(cycle.run(CycleKind::Update).await.unwrap(), CycleOutcome::Skipped);
        assert_eq!(cycle.try_run(CycleKind::Update).await.unwrap(), CycleOutcome::Skipped);
        assert_eq!(store.updates(), 0);
        Ok(())
    }
}
