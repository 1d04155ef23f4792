//! Session archives: snapshot, filter and compress a session directory.

pub mod packager;
pub mod walker;

pub use packager::{ArchivePackager, Compression, SessionArchive};
