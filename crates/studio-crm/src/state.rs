use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::db::Database;
use crate::storage::{self, ObjectStore};

/// Shared by every request handler
pub struct AppState {
    pub db: Database,
    pub store: Arc<dyn ObjectStore>,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Arc<Self>> {
        info!(path = %config.database_path.display(), "Opening database");
        let db = Database::open(&config.database_path).await?;

        let store = storage::from_config(&config.storage)?;

        Ok(Arc::new(Self { db, store, config }))
    }
}
