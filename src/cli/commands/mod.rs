pub mod data;
pub mod migrate;

use sqlx::PgPool;

use crate::config;
use crate::database::DatabaseManager;

/// Connect with the configured database settings
pub async fn connect() -> anyhow::Result<PgPool> {
    Ok(DatabaseManager::connect(&config::config().database).await?)
}
