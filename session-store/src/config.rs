use std::path::PathBuf;

/// 64 MiB, well above a filtered browser profile.
const DEFAULT_MAX_SESSION_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    /// Bearer token required on `/api/*` when set.
    pub store_token: Option<String>,
    pub max_session_bytes: usize,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".into()));

        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            db_path: std::env::var("DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("session-store.db")),
            data_dir,
            store_token: std::env::var("STORE_TOKEN").ok().filter(|t| !t.is_empty()),
            max_session_bytes: std::env::var("MAX_SESSION_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_SESSION_BYTES),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
        }
    }

    #[cfg(test)]
    pub fn for_tests(data_dir: &std::path::Path) -> Self {
        Self {
            port: 0,
            data_dir: data_dir.to_path_buf(),
            db_path: data_dir.join("session-store.db"),
            store_token: None,
            max_session_bytes: DEFAULT_MAX_SESSION_BYTES,
            log_level: "debug".into(),
        }
    }
}
