//! Best-effort removal of transient files and directories.
//!
//! Failures here never abort the caller. They are logged and published as
//! [`SessionEvent::CleanupFailed`] so they stay observable.

use crate::events::{EventBus, SessionEvent};
use std::io::ErrorKind;
use std::path::Path;
use tracing::warn;

/// Recursively remove a directory. Returns `true` when the path is gone.
pub fn remove_dir(path: &Path, events: &EventBus) -> bool {
    report(path, std::fs::remove_dir_all(path), events)
}

/// Remove a single file. Returns `true` when the path is gone.
pub fn remove_file(path: &Path, events: &EventBus) -> bool {
    report(path, std::fs::remove_file(path), events)
}

/// Remove whatever sits at `path`, without following symlinks.
pub fn remove_entry(path: &Path, events: &EventBus) -> bool {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => remove_dir(path, events),
        Ok(_) => remove_file(path, events),
        Err(e) => report(path, Err(e), events),
    }
}

fn report(path: &Path, result: std::io::Result<()>, events: &EventBus) -> bool {
    match result {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cleanup failed");
            events.publish(SessionEvent::CleanupFailed {
                path: path.display().to_string(),
                error: e.to_string(),
            });
            false
        }
    }
}
