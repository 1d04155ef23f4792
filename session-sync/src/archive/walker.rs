//! Directory traversal for session snapshots.
//!
//! Walks a tree in a stable order, pruning subtrees rejected by a filter on
//! the relative path. Entries that disappear while walking are skipped: the
//! browser keeps writing to the live directory during a snapshot.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    /// Sockets, fifos and devices.
    Special,
}

/// An entry discovered during walking. The root itself is never reported.
#[derive(Debug, Clone)]
pub struct EntryInfo {
    /// Full path to the entry
    pub path: PathBuf,

    /// Relative path from the root
    pub relative_path: PathBuf,

    pub kind: EntryKind,

    /// File size in bytes (0 for anything but files)
    pub size: u64,
}

impl EntryInfo {
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Self> {
        let file_type = entry.file_type();
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Special
        };
        let size = match kind {
            EntryKind::File => entry.metadata()?.len(),
            _ => 0,
        };
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

        Ok(Self {
            path,
            relative_path,
            kind,
            size,
        })
    }
}

/// Walk `root`, keeping only entries whose relative path passes `admit`.
///
/// A rejected directory is not descended into. Fails if `root` itself cannot
/// be read. Symlinks are reported, never followed.
pub fn walk_tree<F>(root: &Path, admit: F) -> std::io::Result<Vec<EntryInfo>>
where
    F: Fn(&Path) -> bool,
{
    let walker = WalkDir::new(root).follow_links(false).sort_by_file_name();

    let mut entries = Vec::new();
    let iter = walker.into_iter().filter_entry(|e| {
        e.depth() == 0 || admit(e.path().strip_prefix(root).unwrap_or(e.path()))
    });

    for entry in iter {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() > 0 && is_vanished(&e) => {
                debug!(path = ?e.path(), "Entry vanished during walk, skipping");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if entry.depth() == 0 {
            continue;
        }

        match EntryInfo::from_entry(&entry, root) {
            Ok(info) => entries.push(info),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %entry.path().display(), "Entry vanished during walk, skipping");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(entries)
}

/// Total size of all files in a walk result
pub fn total_size(entries: &[EntryInfo]) -> u64 {
    entries
        .iter()
        .filter(|e| e.kind == EntryKind::File)
        .map(|e| e.size)
        .sum()
}

fn is_vanished(e: &walkdir::Error) -> bool {
    e.io_error()
        .map(|io| io.kind() == ErrorKind::NotFound)
        .unwrap_or(false)
}
