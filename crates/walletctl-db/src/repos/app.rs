//! Application repository

use sqlx::SqlitePool;
use walletctl_types::{AppId, Application, PublicKey};

use crate::models::{to_millis, DbApp};
use crate::{DbError, DbResult};

#[derive(Clone)]
pub struct AppRepo {
    pool: SqlitePool,
}

impl AppRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, app: &Application) -> DbResult<()> {
        let result = sqlx::query(
            "INSERT INTO apps (id, name, pubkey, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(app.id.0.to_string())
        .bind(&app.name)
        .bind(app.pubkey.as_str())
        .bind(to_millis(app.created_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(DbError::Duplicate(
                format!("app with pubkey {}", app.pubkey),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_by_id(&self, id: &AppId) -> DbResult<Option<Application>> {
        let row = sqlx::query_as::<_, DbApp>("SELECT * FROM apps WHERE id = ?")
            .bind(id.0.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Application::try_from).transpose()
    }

    /// Resolve the application that owns a connection key
    pub async fn find_by_pubkey(&self, pubkey: &PublicKey) -> DbResult<Option<Application>> {
        let row = sqlx::query_as::<_, DbApp>("SELECT * FROM apps WHERE pubkey = ?")
            .bind(pubkey.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Application::try_from).transpose()
    }
}
