//! Database access
//!
//! Each service owns its tables; all writers go through this pool.

use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;

use crate::config::DatabaseConfig;

/// PostgreSQL database handle
#[derive(Clone)]
pub struct Database {
    pool: Pool<Postgres>,
}

impl Database {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

/// Create PostgreSQL connection pool
pub async fn create_pool(config: &DatabaseConfig) -> crate::Result<Pool<Postgres>> {
    tracing::info!("Connecting to PostgreSQL (pool_size={})...", config.pool_size);

    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(&config.url)
        .await
        .map_err(crate::Error::Database)?;

    tracing::info!("PostgreSQL connected successfully");
    Ok(pool)
}
