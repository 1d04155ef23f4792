//! Archive packager.
//!
//! Turns a live session directory into a single zip archive containing only
//! the retained subtrees:
//!
//! 1. snapshot the live directory into a fresh scratch directory, so the
//!    browser can keep writing while we work
//! 2. prune the snapshot's filtered levels down to the retained names
//! 3. compress the snapshot into a non-solid zip (entries are independently
//!    compressed, so the archive can be streamed and extracted entry by entry)
//! 4. remove the scratch directory, whatever happened in 2 and 3

use super::walker::{self, EntryKind};
use crate::events::EventBus;
use crate::session::{RetentionPolicy, SessionLayout};
use crate::utils::{cleanup, Result, SyncError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Per-entry compression method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Deflate,
    Zstd,
    Stored,
}

impl Compression {
    fn method(self) -> CompressionMethod {
        match self {
            Compression::Deflate => CompressionMethod::Deflated,
            Compression::Zstd => CompressionMethod::Zstd,
            Compression::Stored => CompressionMethod::Stored,
        }
    }
}

/// A packaged session, backed by a transient file that is removed on drop.
pub struct SessionArchive {
    path: PathBuf,
    bytes: Bytes,
    entries: usize,
    events: EventBus,
}

impl SessionArchive {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of files and directories in the archive
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Delete the transient archive file now.
    pub fn discard(self) {}
}

impl Drop for SessionArchive {
    fn drop(&mut self) {
        cleanup::remove_file(&self.path, &self.events);
    }
}

#[derive(Clone)]
pub struct ArchivePackager {
    layout: SessionLayout,
    policy: RetentionPolicy,
    compression: Compression,
    level: Option<i64>,
    events: EventBus,
}

impl ArchivePackager {
    pub fn new(layout: SessionLayout, events: EventBus) -> Self {
        Self {
            layout,
            policy: RetentionPolicy::default(),
            compression: Compression::default(),
            level: None,
            events,
        }
    }

    pub fn with_compression(mut self, compression: Compression, level: Option<i64>) -> Self {
        self.compression = compression;
        self.level = level;
        self
    }

    /// Package `session_dir` on the blocking pool.
    pub async fn pack(&self, session_dir: &Path) -> Result<SessionArchive> {
        let packager = self.clone();
        let session_dir = session_dir.to_path_buf();
        tokio::task::spawn_blocking(move || packager.pack_blocking(&session_dir))
            .await
            .map_err(|e| SyncError::Packaging(format!("Packaging task failed: {}", e)))?
    }

    pub fn pack_blocking(&self, session_dir: &Path) -> Result<SessionArchive> {
        if !session_dir.is_dir() {
            return Err(SyncError::Packaging(format!(
                "Session directory {} does not exist",
                session_dir.display()
            )));
        }

        let (scratch, archive_path) = self.layout.new_scratch();
        fs::create_dir_all(&scratch).map_err(|e| {
            SyncError::Packaging(format!(
                "Failed to create scratch directory {}: {}",
                scratch.display(),
                e
            ))
        })?;

        let result = self.snapshot_and_compress(session_dir, &scratch, &archive_path);
        cleanup::remove_dir(&scratch, &self.events);

        let entries = match result {
            Ok(entries) => entries,
            Err(e) => {
                cleanup::remove_file(&archive_path, &self.events);
                return Err(e);
            }
        };

        let bytes = match fs::read(&archive_path) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                cleanup::remove_file(&archive_path, &self.events);
                return Err(SyncError::Packaging(format!(
                    "Failed to read archive {}: {}",
                    archive_path.display(),
                    e
                )));
            }
        };

        info!(
            session_dir = %session_dir.display(),
            entries,
            bytes = bytes.len(),
            "Session packaged"
        );

        Ok(SessionArchive {
            path: archive_path,
            bytes,
            entries,
            events: self.events.clone(),
        })
    }

    fn snapshot_and_compress(&self, source: &Path, scratch: &Path, archive_path: &Path) -> Result<usize> {
        self.snapshot(source, scratch)?;
        self.prune(scratch)?;
        self.compress(scratch, archive_path)
            .map_err(|e| SyncError::Packaging(format!("Compression failed: {}", e)))
    }

    /// Copy the admitted part of `source` into `scratch`.
    fn snapshot(&self, source: &Path, scratch: &Path) -> Result<()> {
        let entries = walker::walk_tree(source, |rel| self.policy.admits(rel))
            .map_err(|e| {
                SyncError::Packaging(format!("Failed to read {}: {}", source.display(), e))
            })?;

        debug!(
            source = %source.display(),
            entries = entries.len(),
            bytes = walker::total_size(&entries),
            "Snapshotting session directory"
        );

        for entry in &entries {
            let dest = scratch.join(&entry.relative_path);
            let copied = match entry.kind {
                EntryKind::Dir => fs::create_dir_all(&dest),
                EntryKind::File => copy_file(&entry.path, &dest),
                EntryKind::Symlink | EntryKind::Special => {
                    debug!(path = %entry.path.display(), "Skipping non-regular entry");
                    continue;
                }
            };
            match copied {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound && entry.path.symlink_metadata().is_err() => {
                    debug!(path = %entry.path.display(), "Entry vanished during snapshot, skipping");
                }
                Err(e) => {
                    return Err(SyncError::Packaging(format!(
                        "Failed to copy {}: {}",
                        entry.path.display(),
                        e
                    )));
                }
            }
        }

        Ok(())
    }

    /// Remove every non-retained entry at the filtered levels of the snapshot.
    fn prune(&self, scratch: &Path) -> Result<()> {
        for dir in self.policy.filtered_levels(scratch) {
            let listing = match fs::read_dir(&dir) {
                Ok(listing) => listing,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(SyncError::Packaging(format!(
                        "Failed to list {}: {}",
                        dir.display(),
                        e
                    )));
                }
            };

            for entry in listing.flatten() {
                let name = entry.file_name();
                if !self.policy.is_retained(&name) {
                    debug!(path = %entry.path().display(), "Pruning non-retained entry");
                    cleanup::remove_entry(&entry.path(), &self.events);
                }
            }
        }
        Ok(())
    }

    /// Zip `scratch` into `archive_path`, returning the entry count.
    ///
    /// Entries a failed prune left behind are still kept out of the archive.
    fn compress(&self, scratch: &Path, archive_path: &Path) -> io::Result<usize> {
        let entries = walker::walk_tree(scratch, |rel| self.policy.admits(rel))?;

        let file = File::create(archive_path)?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        let options = SimpleFileOptions::default()
            .compression_method(self.compression.method())
            .compression_level(self.level);

        let mut count = 0;
        for entry in &entries {
            let name = archive_name(&entry.relative_path);
            match entry.kind {
                EntryKind::Dir => zip.add_directory(name, options)?,
                EntryKind::File => {
                    zip.start_file(name, options)?;
                    let mut source = File::open(&entry.path)?;
                    io::copy(&mut source, &mut zip)?;
                }
                EntryKind::Symlink | EntryKind::Special => continue,
            }
            count += 1;
        }

        let mut writer = zip.finish()?;
        writer.flush()?;
        Ok(count)
    }
}

fn copy_file(source: &Path, dest: &Path) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(source, dest).map(|_| ())
}

/// Zip entry names always use `/`, whatever the platform separator.
fn archive_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
