//! Postgres-backed repository and index.
//!
//! One pool serves both roles: the `items` table holds the authoritative
//! logs, the `item_index` view is the search projection over them.

pub mod index;
pub mod items;

use std::time::Duration;

use crate::error::{Error, Result};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

/// Database handle implementing both [`crate::repository::EventRepository`]
/// and [`crate::index::ItemIndex`].
pub struct Db {
    pool: PgPool,
}

impl Db {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
            .map_err(|e| Error::Communication(format!("cannot connect to database: {e}")))?;
        info!("database pool ready");
        Ok(Self { pool })
    }

    /// Wrap an existing pool, e.g. one shared with other components.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply `migrations/` (tables plus the index view).
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Other(format!("migration failed: {e}")))?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}
