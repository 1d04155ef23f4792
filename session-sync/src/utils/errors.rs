//! Error types for the session sync engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Invalid construction parameters or missing capabilities. Fatal.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The session directory could not be copied, filtered or compressed.
    /// Aborts the current sync cycle only.
    #[error("Packaging error: {0}")]
    Packaging(String),

    /// The remote store is unreachable or rejected our credentials.
    /// Never used for "record not found".
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    /// Extraction of a remote session failed. The session directory is in an
    /// indeterminate state and must not be used.
    #[error("Restore error: {0}")]
    Restore(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Cycle-scoped errors leave the engine usable; the next tick retries.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Packaging(_) | SyncError::RemoteUnavailable(_))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::RemoteUnavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
