//! PostgreSQL connection pool and query timeouts.
//!
//! The pool backs [`crate::store::PgStore`] and [`crate::store::PgOutbox`].

use log::info;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;

pub mod config;
pub mod timeouts;

pub use config::DatabaseConfig;
use timeouts::{TimeoutError, with_default_timeout};

/// Database connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect a pool sized by `config`
    ///
    /// ```no_run
    /// use tourney::db::{Database, DatabaseConfig};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = Database::new(&DatabaseConfig::from_env()?).await?;
    /// db.health_check().await?;
    /// let store = tourney::PgStore::new(db.shared_pool());
    /// store.migrate().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .connect(&config.database_url)
            .await?;

        info!(
            "Database pool ready ({}..{} connections)",
            config.min_connections, config.max_connections
        );
        Ok(Self { pool })
    }

    /// Shared handle for [`crate::PgStore`] and [`crate::PgOutbox`]
    pub fn shared_pool(&self) -> Arc<PgPool> {
        Arc::new(self.pool.clone())
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        with_default_timeout(sqlx::query("SELECT 1").execute(&self.pool))
            .await
            .map_err(|e| match e {
                TimeoutError::Database(e) => e,
                TimeoutError::Timeout(_) => sqlx::Error::PoolTimedOut,
            })?;
        Ok(())
    }

    /// Wait for in-flight queries, then close every connection
    pub async fn close(self) {
        self.pool.close().await;
    }
}
