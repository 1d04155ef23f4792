//! Restore a session directory from the remote store.

use crate::events::EventBus;
use crate::store::{RecordUpdate, SessionStore};
use crate::utils::{cleanup, Result, SyncError};
use bytes::Bytes;
use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct RestoreManager {
    store: Arc<dyn SessionStore>,
    events: EventBus,
    staging_dir: PathBuf,
}

impl RestoreManager {
    /// `staging_dir` holds the transient archive while it is extracted.
    pub fn new(store: Arc<dyn SessionStore>, events: EventBus, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            events,
            staging_dir: staging_dir.into(),
        }
    }

    /// Populate `session_dir` from the remote record for `manager_id`.
    ///
    /// Returns `true` when a record was found and extracted. Without a record
    /// the directory is created empty. On extraction failure the directory
    /// contents are indeterminate.
    pub async fn restore(&self, manager_id: &str, session_dir: &Path) -> Result<bool> {
        let Some(record) = self.store.get(manager_id).await? else {
            fs::create_dir_all(session_dir).map_err(|e| {
                SyncError::Restore(format!("cannot create {}: {}", session_dir.display(), e))
            })?;
            debug!(manager_id, session_dir = %session_dir.display(), "No remote session, starting empty");
            return Ok(false);
        };

        if let Err(e) = self.store.update(manager_id, RecordUpdate::touch()).await {
            warn!(manager_id, error = %e, "Failed to record restore check");
        }

        let archive_path = self.staging_dir.join(format!("{}.zip", manager_id));
        let bytes = record.session.len();
        let session = record.session;
        let target = session_dir.to_path_buf();
        let staged = archive_path.clone();

        let extracted = tokio::task::spawn_blocking(move || extract(&session, &staged, &target))
            .await
            .map_err(|e| SyncError::Restore(format!("extraction task failed: {}", e)))?;
        cleanup::remove_file(&archive_path, &self.events);

        extracted.map_err(|e| {
            SyncError::Restore(format!("cannot extract into {}: {}", session_dir.display(), e))
        })?;

        info!(manager_id, bytes, session_dir = %session_dir.display(), "Remote session restored");
        Ok(true)
    }
}

fn extract(session: &Bytes, archive_path: &Path, session_dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(session_dir) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }
    fs::create_dir_all(session_dir)?;

    if let Some(parent) = archive_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(archive_path, session)?;

    let mut archive = zip::ZipArchive::new(Cursor::new(session.as_ref()))?;
    archive.extract(session_dir)?;
    Ok(())
}
