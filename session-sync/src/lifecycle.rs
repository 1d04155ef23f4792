//! Session engine: restore on startup, back up while authenticated, tear
//! down on disconnect.

use crate::archive::ArchivePackager;
use crate::cycle::{CycleKind, CycleOutcome, SyncCycle};
use crate::events::{EventBus, SessionEvent};
use crate::restore::RestoreManager;
use crate::scheduler::{SchedulerState, SyncScheduler};
use crate::session::{SessionLayout, SessionOptions};
use crate::store::{RemoteSessionRecord, SessionStore};
use crate::utils::{cleanup, Result, SyncError};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Builds a [`SessionEngine`] after checking that its dependencies are usable.
pub struct SessionEngineBuilder {
    options: SessionOptions,
    store: Option<Arc<dyn SessionStore>>,
    events: Option<EventBus>,
}

impl SessionEngineBuilder {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            store: None,
            events: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Fails with [`SyncError::Config`] when no store was supplied or the data
    /// path cannot be created and written.
    pub fn build(self) -> Result<SessionEngine> {
        let store = self
            .store
            .ok_or_else(|| SyncError::Config("A session store is required".into()))?;
        check_writable(&self.options.data_path)?;

        let events = self.events.unwrap_or_default();
        let layout = self.options.layout();
        let packager = ArchivePackager::new(layout.clone(), events.clone())
            .with_compression(self.options.compression, self.options.compression_level);
        let cycle = Arc::new(SyncCycle::new(&layout, packager, store.clone(), events.clone()));
        let scheduler = SyncScheduler::new(
            self.options.schedule,
            self.options.stabilization_delay,
            cycle.clone(),
        );
        let restore = RestoreManager::new(store.clone(), events.clone(), layout.scratch_root());

        Ok(SessionEngine {
            layout,
            store,
            events,
            restore,
            cycle,
            scheduler,
            restored: Mutex::new(None),
        })
    }
}

fn check_writable(data_path: &Path) -> Result<()> {
    fs::create_dir_all(data_path).map_err(|e| {
        SyncError::Config(format!("Cannot create data path {}: {}", data_path.display(), e))
    })?;

    let probe = data_path.join(format!(".probe-{}", Uuid::new_v4().simple()));
    fs::write(&probe, b"").map_err(|e| {
        SyncError::Config(format!("Data path {} is not writable: {}", data_path.display(), e))
    })?;
    if let Err(e) = fs::remove_file(&probe) {
        warn!(path = %probe.display(), error = %e, "Failed to remove write probe");
    }
    Ok(())
}

pub struct SessionEngine {
    layout: SessionLayout,
    store: Arc<dyn SessionStore>,
    events: EventBus,
    restore: RestoreManager,
    cycle: Arc<SyncCycle>,
    scheduler: SyncScheduler,
    /// Whether a remote record existed when the session was restored.
    restored: Mutex<Option<bool>>,
}

impl SessionEngine {
    pub fn builder(options: SessionOptions) -> SessionEngineBuilder {
        SessionEngineBuilder::new(options)
    }

    pub fn layout(&self) -> &SessionLayout {
        &self.layout
    }

    pub fn session_dir(&self) -> &Path {
        self.layout.session_dir()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn watch_scheduler(&self) -> watch::Receiver<SchedulerState> {
        self.scheduler.watch()
    }

    /// Restore the session directory before the browser uses it.
    ///
    /// Returns whether a remote session was found.
    pub async fn start(&self) -> Result<bool> {
        let key = self.layout.record_key();
        let found = self.restore.restore(key, self.layout.session_dir()).await?;
        *self.restored.lock().await = Some(found);
        debug!(manager_id = key, found, "Session restore finished");
        Ok(found)
    }

    /// The host reports an authenticated session: begin backing it up.
    pub async fn on_authenticated(&self) -> Result<()> {
        let existed = match *self.restored.lock().await {
            Some(found) => found,
            None => self.store.get(self.layout.record_key()).await?.is_some(),
        };
        let first = if existed {
            CycleKind::Update
        } else {
            CycleKind::Create { notify: true }
        };
        self.scheduler.start(first).await;
        Ok(())
    }

    /// Back up immediately unless a cycle is already in flight.
    pub async fn sync_now(&self) -> Result<CycleOutcome> {
        self.cycle.try_run(CycleKind::Update).await
    }

    /// Current remote record, without touching it.
    pub async fn remote_record(&self) -> Result<Option<RemoteSessionRecord>> {
        self.store.get(self.layout.record_key()).await
    }

    /// Stop backups, delete the remote record and remove the local session.
    ///
    /// Local removal is attempted even when the remote delete fails; the
    /// remote error is returned afterwards. An in-flight manual sync finishes
    /// first, and no sync runs afterwards.
    pub async fn disconnect(&self) -> Result<u64> {
        let key = self.layout.record_key();
        self.scheduler.stop().await;
        let _closed = self.cycle.close().await;

        let deleted = self.store.delete(key).await;
        cleanup::remove_dir(self.layout.session_dir(), &self.events);

        let deleted = deleted?;
        info!(manager_id = key, deleted, "Session disconnected");
        Ok(deleted)
    }

    pub async fn logout(&self) -> Result<u64> {
        self.disconnect().await
    }

    /// Stop backups. Local and remote state stay as they are.
    pub async fn destroy(&self) {
        self.scheduler.stop().await;
    }
}
