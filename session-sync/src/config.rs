//! Configuration management for the session sync engine.
//!
//! Loads configuration from an optional TOML file with `SESSION_SYNC__*`
//! environment overrides (`SESSION_SYNC__SESSION__CLIENT_ID=alice`).

use crate::archive::Compression;
use crate::session::{SessionOptions, DEFAULT_STABILIZATION_DELAY_MS};
use crate::store::HttpStore;
use crate::utils::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "SESSION_SYNC";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Selects the remote record and local directory; unnamed when unset
    #[serde(default)]
    pub client_id: Option<String>,

    /// Root for session directories (default: ./.session_sync_auth/)
    #[serde(default)]
    pub data_path: Option<PathBuf>,

    /// Backup period, at least 60000
    #[serde(default)]
    pub backup_interval_ms: Option<u64>,

    /// Wait after authentication before the first backup
    #[serde(default = "default_stabilization_delay_ms")]
    pub stabilization_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the session store service
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Bearer token, if the store requires one
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// deflate, zstd or stored
    #[serde(default)]
    pub compression: Compression,

    #[serde(default)]
    pub compression_level: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_stabilization_delay_ms() -> u64 {
    DEFAULT_STABILIZATION_DELAY_MS
}

fn default_store_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            data_path: None,
            backup_interval_ms: None,
            stabilization_delay_ms: default_stabilization_delay_ms(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from `path` (if any) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Toml),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| SyncError::Config(format!("Failed to load configuration: {}", e)))
    }

    /// Validated engine options.
    pub fn session_options(&self) -> Result<SessionOptions> {
        let interval = self.session.backup_interval_ms.ok_or_else(|| {
            SyncError::Config("session.backup_interval_ms is required".into())
        })?;
        let options = SessionOptions::new(
            self.session.client_id.as_deref(),
            self.session.data_path.as_deref(),
            interval,
        )?;
        Ok(options
            .with_stabilization_delay(Duration::from_millis(self.session.stabilization_delay_ms))
            .with_compression(self.archive.compression, self.archive.compression_level))
    }

    pub fn build_store(&self) -> Result<HttpStore> {
        HttpStore::new(
            &self.store.url,
            self.store.token.clone().filter(|t| !t.is_empty()),
            Duration::from_secs(self.store.timeout_secs),
        )
    }
}
