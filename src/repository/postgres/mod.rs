mod migrations;
mod repos;

pub use repos::PostgresRepositories;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::RepositoryError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

fn default_pool_size() -> u32 {
    10
}

pub async fn connect(config: &PostgresConfig) -> Result<PgPool, RepositoryError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .connect(&config.url)
        .await
        .map_err(|e| RepositoryError::Backend(e.to_string()))?;

    migrations::run_migrations(&pool).await?;

    Ok(pool)
}
