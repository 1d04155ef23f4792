//! Which parts of a browser profile survive packaging.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Directory names holding essential session state: the profile root and its
/// local-storage and IndexedDB subdirectories.
pub const RETAINED_SUBTREES: [&str; 3] = ["Default", "IndexedDB", "Local Storage"];

const PROFILE_ROOT: &str = "Default";

/// Filter applied at the top level of the session directory and at the top
/// level of the profile root. Deeper levels are kept as-is.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    retained: &'static [&'static str],
    profile_root: &'static str,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            retained: &RETAINED_SUBTREES,
            profile_root: PROFILE_ROOT,
        }
    }
}

impl RetentionPolicy {
    pub fn is_retained(&self, name: &OsStr) -> bool {
        self.retained.iter().any(|r| OsStr::new(r) == name)
    }

    /// Directories whose immediate children are filtered, for a tree rooted at `root`.
    pub fn filtered_levels(&self, root: &Path) -> [PathBuf; 2] {
        [root.to_path_buf(), root.join(self.profile_root)]
    }

    /// Whether a path relative to the session root survives filtering.
    pub fn admits(&self, relative: &Path) -> bool {
        let mut names = relative.components().filter_map(|c| match c {
            Component::Normal(name) => Some(name),
            _ => None,
        });

        let Some(top) = names.next() else {
            return true;
        };
        if !self.is_retained(top) {
            return false;
        }
        if top != OsStr::new(self.profile_root) {
            return true;
        }
        match names.next() {
            Some(child) => self.is_retained(child),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_level_filter() {
        let policy = RetentionPolicy::default();
        assert!(policy.admits(Path::new("Default")));
        assert!(policy.admits(Path::new("Local Storage/leveldb/000003.log")));
        assert!(!policy.admits(Path::new("SingletonLock")));
        assert!(!policy.admits(Path::new("Crashpad/settings.dat")));
    }

    #[test]
    fn test_profile_root_filter() {
        let policy = RetentionPolicy::default();
        assert!(policy.admits(Path::new("Default/IndexedDB/https_web.example_0.indexeddb.leveldb/CURRENT")));
        assert!(policy.admits(Path::new("Default/Local Storage")));
        assert!(!policy.admits(Path::new("Default/Cache/data_0")));
        assert!(!policy.admits(Path::new("Default/Cookies-journal")));
    }

    #[test]
    fn test_deeper_levels_unfiltered() {
        let policy = RetentionPolicy::default();
        assert!(policy.admits(Path::new("IndexedDB/anything/Cache")));
        assert!(policy.admits(Path::new("Default/Local Storage/Cache")));
    }

    #[test]
    fn test_filtered_levels() {
        let policy = RetentionPolicy::default();
        let [root, profile] = policy.filtered_levels(Path::new("/tmp/scratch"));
        assert_eq!(root, Path::new("/tmp/scratch"));
        assert_eq!(profile, Path::new("/tmp/scratch/Default"));
    }
}
