//! Session Sync Library
//!
//! Keeps a browser session directory backed up to a remote store and
//! restores it on startup.

pub mod archive;
pub mod config;
pub mod cycle;
pub mod daemon;
pub mod events;
pub mod lifecycle;
pub mod restore;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod strategy;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::Config;
pub use events::{EventBus, SessionEvent};
pub use lifecycle::{SessionEngine, SessionEngineBuilder};
pub use session::{ClientId, SessionOptions};
pub use store::{RemoteSessionRecord, SessionStore};
pub use strategy::{AuthStrategy, LaunchOptions, LocalSession};
pub use utils::errors::SyncError;
pub use utils::Result;
