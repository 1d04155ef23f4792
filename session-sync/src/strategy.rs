//! Hooks the browser host calls around its own lifecycle.

use crate::lifecycle::SessionEngine;
use crate::session::{ClientId, DEFAULT_DATA_PATH};
use crate::utils::{Result, SyncError};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// Browser launch settings the strategy may redirect.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub user_data_dir: Option<PathBuf>,
}

#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Prepare the profile directory and point the browser at it.
    async fn before_browser_initialized(&self, launch: &mut LaunchOptions) -> Result<()>;

    /// The host finished authenticating.
    async fn after_auth_ready(&self) -> Result<()> {
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        Ok(())
    }
}

fn claim_user_data_dir(launch: &mut LaunchOptions, dir: &Path, strategy: &str) -> Result<()> {
    if let Some(existing) = &launch.user_data_dir {
        if existing != dir {
            return Err(SyncError::Config(format!(
                "{} is not compatible with a user-supplied user data directory ({})",
                strategy,
                existing.display()
            )));
        }
    }
    launch.user_data_dir = Some(dir.to_path_buf());
    Ok(())
}

#[async_trait]
impl AuthStrategy for SessionEngine {
    async fn before_browser_initialized(&self, launch: &mut LaunchOptions) -> Result<()> {
        claim_user_data_dir(launch, self.session_dir(), "Remote session")?;
        self.start().await?;
        Ok(())
    }

    async fn after_auth_ready(&self) -> Result<()> {
        self.on_authenticated().await
    }

    async fn logout(&self) -> Result<()> {
        SessionEngine::logout(self).await.map(|_| ())
    }

    async fn disconnect(&self) -> Result<()> {
        SessionEngine::disconnect(self).await.map(|_| ())
    }

    async fn destroy(&self) -> Result<()> {
        SessionEngine::destroy(self).await;
        Ok(())
    }
}

/// Keeps the profile in a fixed local directory with no remote copy.
#[derive(Debug, Clone)]
pub struct LocalSession {
    session_dir: PathBuf,
}

impl LocalSession {
    pub fn new(client_id: Option<&str>, data_path: Option<&Path>) -> Result<Self> {
        let client_id = client_id.map(ClientId::new).transpose()?;
        let data_path = data_path.unwrap_or_else(|| Path::new(DEFAULT_DATA_PATH));
        let dir_name = match &client_id {
            Some(id) => format!("session-{}", id),
            None => "session".to_string(),
        };
        Ok(Self {
            session_dir: data_path.join(dir_name),
        })
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }
}

#[async_trait]
impl AuthStrategy for LocalSession {
    async fn before_browser_initialized(&self, launch: &mut LaunchOptions) -> Result<()> {
        claim_user_data_dir(launch, &self.session_dir, "Local session")?;
        tokio::fs::create_dir_all(&self.session_dir).await?;
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.session_dir).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => {
                info!(session_dir = %self.session_dir.display(), "Local session removed");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionOptions;
    use crate::store::MemoryStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn engine(data: &Path) -> SessionEngine {
        let options = SessionOptions::new(Some("alice"), Some(data), 60_000).unwrap();
        SessionEngine::builder(options)
            .store(Arc::new(MemoryStore::new()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_remote_strategy_redirects_browser() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(temp_dir.path());
        let mut launch = LaunchOptions::default();

        engine.before_browser_initialized(&mut launch).await.unwrap();

        let dir = launch.user_data_dir.unwrap();
        assert_eq!(dir, temp_dir.path().join("alice/session"));
        assert!(dir.is_dir());
    }

    #[tokio::test]
    async fn test_remote_strategy_accepts_matching_dir() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(temp_dir.path());
        let mut launch = LaunchOptions {
            user_data_dir: Some(temp_dir.path().join("alice/session")),
        };
        assert!(engine.before_browser_initialized(&mut launch).await.is_ok());
    }

    #[tokio::test]
    async fn test_remote_strategy_rejects_foreign_dir() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(temp_dir.path());
        let mut launch = LaunchOptions {
            user_data_dir: Some(temp_dir.path().join("elsewhere")),
        };

        let result = engine.before_browser_initialized(&mut launch).await;
        assert!(matches!(result, Err(SyncError::Config(_))));
        assert!(!temp_dir.path().join("alice/session").exists());
    }

    #[tokio::test]
    async fn test_remote_logout_disconnects() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(temp_dir.path());
        let strategy: &dyn AuthStrategy = &engine;
        let mut launch = LaunchOptions::default();

        strategy.before_browser_initialized(&mut launch).await.unwrap();
        strategy.logout().await.unwrap();
        assert!(!temp_dir.path().join("alice/session").exists());
    }

    #[tokio::test]
    async fn test_local_session_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let local = LocalSession::new(Some("bob"), Some(temp_dir.path())).unwrap();
        let mut launch = LaunchOptions::default();

        local.before_browser_initialized(&mut launch).await.unwrap();
        assert_eq!(launch.user_data_dir.as_deref(), Some(temp_dir.path().join("session-bob").as_path()));
        assert!(local.session_dir().is_dir());

        local.logout().await.unwrap();
        assert!(!local.session_dir().exists());
        // Logging out twice is fine
        local.logout().await.unwrap();
    }

    #[test]
    fn test_local_session_without_client_id() {
        let local = LocalSession::new(None, Some(Path::new("/data"))).unwrap();
        assert_eq!(local.session_dir(), Path::new("/data/session"));
        assert!(matches!(LocalSession::new(Some("a b"), None), Err(SyncError::Config(_))));
    }
}
