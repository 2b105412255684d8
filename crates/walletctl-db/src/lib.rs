//! walletctl Database Layer
//!
//! Durable persistence for the request pipeline on SQLite.
//!
//! # Tables
//!
//! - **apps**: registered client applications
//! - **app_permissions**: one grant per (app, method)
//! - **request_events**: every inbound request and its lifecycle state
//! - **spends**: settled and in-flight spends feeding budget usage
//!
//! # Repository Pattern
//!
//! Each table has its own repository. The repositories also implement the
//! storage traits of the domain crates (`EventStore`, `PermissionStore`,
//! `UsageLedger`), so the pipeline can run on them unchanged.

pub mod config;
pub mod error;
pub mod models;
pub mod repos;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

pub use config::DatabaseConfig;
pub use error::{DbError, DbResult};
pub use repos::*;

/// Database connection pool
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    /// Open the SQLite database, creating the file if needed
    pub async fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        info!("Connecting to SQLite: {}", config.url);

        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| DbError::Connection(format!("SQLite URL: {}", e)))?
            .create_if_missing(true);

        let mut pool_options = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs));
        pool_options = if config.is_memory() {
            pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(config.max_connections)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| DbError::Connection(format!("SQLite: {}", e)))?;

        info!("Connected to SQLite");
        Ok(Self { pool })
    }

    /// Open a private in-memory database with migrations applied
    pub async fn in_memory() -> DbResult<Self> {
        let db = Self::connect(&DatabaseConfig::in_memory()).await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Run database migrations
    pub async fn migrate(&self) -> DbResult<()> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DbError::Migration(e.to_string()))?;
        info!("Migrations complete");
        Ok(())
    }

    /// Whether the database answers queries
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    pub fn app_repo(&self) -> AppRepo {
        AppRepo::new(self.pool.clone())
    }

    pub fn permission_repo(&self) -> PermissionRepo {
        PermissionRepo::new(self.pool.clone())
    }

    pub fn request_event_repo(&self) -> RequestEventRepo {
        RequestEventRepo::new(self.pool.clone())
    }

    pub fn spend_repo(&self) -> SpendRepo {
        SpendRepo::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database_is_healthy() {
        let db = Database::in_memory().await.unwrap();
        assert!(db.health_check().await);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::in_memory().await.unwrap();
        db.migrate().await.unwrap();
    }
}
