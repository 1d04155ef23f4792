//! Session identity, on-disk layout and construction options.

pub mod retention;

use crate::archive::Compression;
use crate::scheduler::SyncSchedule;
use crate::utils::{Result, SyncError};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

pub use retention::{RetentionPolicy, RETAINED_SUBTREES};

/// Default root for session data, relative to the working directory.
pub const DEFAULT_DATA_PATH: &str = "./.session_sync_auth/";

/// Delay between authentication and the first backup.
pub const DEFAULT_STABILIZATION_DELAY_MS: u64 = 15_000;

/// Directory and record name used when no client identifier is configured.
pub const UNNAMED_SESSION: &str = "RemoteSession";

const SCRATCH_DIR: &str = ".session_sync_temp";

/// Identifier selecting one remote record and one local session directory.
///
/// Only ASCII alphanumerics, underscores and hyphens are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(SyncError::Config(format!(
                "Invalid client id {:?}. Only alphanumeric characters, underscores and hyphens are allowed.",
                id
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ClientId {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Paths owned by one engine instance.
#[derive(Debug, Clone)]
pub struct SessionLayout {
    data_path: PathBuf,
    record_key: String,
    session_dir: PathBuf,
}

impl SessionLayout {
    /// `<data_path>/<id>/session`, or `<data_path>/RemoteSession` without an id.
    pub fn new(data_path: &Path, client_id: Option<&ClientId>) -> Self {
        let (record_key, session_dir) = match client_id {
            Some(id) => (
                id.as_str().to_string(),
                data_path.join(id.as_str()).join("session"),
            ),
            None => (UNNAMED_SESSION.to_string(), data_path.join(UNNAMED_SESSION)),
        };
        Self {
            data_path: data_path.to_path_buf(),
            record_key,
            session_dir,
        }
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Key of the remote record (`managerId`).
    pub fn record_key(&self) -> &str {
        &self.record_key
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.data_path.join(SCRATCH_DIR)
    }

    /// Fresh scratch directory and archive path for one packaging run.
    ///
    /// Every run gets its own names so a failed cleanup never collides with
    /// the next cycle.
    pub fn new_scratch(&self) -> (PathBuf, PathBuf) {
        let token = Uuid::new_v4().simple().to_string();
        let root = self.scratch_root();
        let stem = format!("{}-{}", self.record_key, token);
        (root.join(&stem), root.join(format!("{}.zip", stem)))
    }
}

/// Validated construction parameters for a remote session engine.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub client_id: Option<ClientId>,
    pub data_path: PathBuf,
    pub schedule: SyncSchedule,
    pub stabilization_delay: Duration,
    pub compression: Compression,
    pub compression_level: Option<i64>,
}

impl SessionOptions {
    pub fn new(
        client_id: Option<&str>,
        data_path: Option<&Path>,
        backup_interval_ms: u64,
    ) -> Result<Self> {
        let client_id = client_id.map(ClientId::new).transpose()?;
        let schedule = SyncSchedule::new(backup_interval_ms)?;
        let data_path = absolute(data_path.unwrap_or_else(|| Path::new(DEFAULT_DATA_PATH)))?;

        Ok(Self {
            client_id,
            data_path,
            schedule,
            stabilization_delay: Duration::from_millis(DEFAULT_STABILIZATION_DELAY_MS),
            compression: Compression::default(),
            compression_level: None,
        })
    }

    pub fn with_stabilization_delay(mut self, delay: Duration) -> Self {
        self.stabilization_delay = delay;
        self
    }

    pub fn with_compression(mut self, compression: Compression, level: Option<i64>) -> Self {
        self.compression = compression;
        self.compression_level = level;
        self
    }

    pub fn layout(&self) -> SessionLayout {
        SessionLayout::new(&self.data_path, self.client_id.as_ref())
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .map_err(|e| SyncError::Config(format!("Cannot resolve data path: {}", e)))?;
    Ok(cwd.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_validation() {
        assert!(ClientId::new("client_01-a").is_ok());
        assert!(ClientId::new("ABCxyz").is_ok());
        assert!(matches!(ClientId::new(""), Err(SyncError::Config(_))));
        assert!(matches!(ClientId::new("has space"), Err(SyncError::Config(_))));
        assert!(matches!(ClientId::new("../escape"), Err(SyncError::Config(_))));
        assert!(matches!(ClientId::new("ümlaut"), Err(SyncError::Config(_))));
    }

    #[test]
    fn test_backup_interval_floor() {
        let below = SessionOptions::new(Some("client"), None, 59_999);
        assert!(matches!(below, Err(SyncError::Config(_))));

        let floor = SessionOptions::new(Some("client"), None, 60_000).unwrap();
        assert_eq!(floor.schedule.interval(), Duration::from_millis(60_000));
    }

    #[test]
    fn test_invalid_client_id_rejected_by_options() {
        let result = SessionOptions::new(Some("bad/id"), None, 60_000);
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[test]
    fn test_default_data_path_is_absolute() {
        let options = SessionOptions::new(None, None, 60_000).unwrap();
        assert!(options.data_path.is_absolute());
        assert!(options.data_path.ends_with(".session_sync_auth"));
    }

    #[test]
    fn test_layout_with_client_id() {
        let id = ClientId::new("alice").unwrap();
        let layout = SessionLayout::new(Path::new("/data"), Some(&id));
        assert_eq!(layout.session_dir(), Path::new("/data/alice/session"));
        assert_eq!(layout.record_key(), "alice");
    }

    #[test]
    fn test_layout_without_client_id() {
        let layout = SessionLayout::new(Path::new("/data"), None);
        assert_eq!(layout.session_dir(), Path::new("/data/RemoteSession"));
        assert_eq!(layout.record_key(), UNNAMED_SESSION);
    }

    #[test]
    fn test_scratch_paths_are_unique() {
        let layout = SessionLayout::new(Path::new("/data"), None);
        let (dir_a, zip_a) = layout.new_scratch();
        let (dir_b, _) = layout.new_scratch();
        assert_ne!(dir_a, dir_b);
        assert!(dir_a.starts_with(layout.scratch_root()));
        assert_eq!(zip_a.extension().unwrap(), "zip");
        assert!(!zip_a.starts_with(&dir_a));
    }
}
