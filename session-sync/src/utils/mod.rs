//! Utility modules for the session sync engine.

pub mod cleanup;
pub mod errors;
pub mod logger;

pub use errors::{Result, SyncError};
