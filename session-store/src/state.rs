use crate::config::AppConfig;
use crate::db::connection::DbPool;

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(db: DbPool, config: AppConfig) -> Self {
        Self { db, config }
    }
}
