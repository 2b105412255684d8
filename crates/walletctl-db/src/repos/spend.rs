//! Spend repository, the persistent usage ledger

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use walletctl_budget::{BudgetError, SpendLimit, SpendRecord, UsageLedger};
use walletctl_types::{AppId, Sats, SpendId};

use crate::models::{to_millis, DbSpend};
use crate::{DbError, DbResult};

#[derive(Clone)]
pub struct SpendRepo {
    pool: SqlitePool,
}

impl SpendRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, record: &SpendRecord) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO spends (id, app_id, amount, settled, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(record.id.0.to_string())
        .bind(record.app_id.0.to_string())
        .bind(record.amount.0)
        .bind(record.settled)
        .bind(to_millis(record.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Sum of settled spends for an app created after `since`
    pub async fn settled_since(&self, app_id: &AppId, since: DateTime<Utc>) -> DbResult<Sats> {
        let sum: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount), 0) FROM spends
            WHERE app_id = ? AND settled = 1 AND created_at > ?
            "#,
        )
        .bind(app_id.0.to_string())
        .bind(to_millis(since))
        .fetch_one(&self.pool)
        .await?;
        Ok(Sats(sum))
    }

    pub async fn list_by_app(&self, app_id: &AppId) -> DbResult<Vec<SpendRecord>> {
        let rows = sqlx::query_as::<_, DbSpend>(
            "SELECT * FROM spends WHERE app_id = ? ORDER BY created_at",
        )
        .bind(app_id.0.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SpendRecord::try_from).collect()
    }

    /// Insert `record` as in-flight if it fits `limit`, in one transaction.
    ///
    /// The insert runs first so the transaction holds SQLite's write lock
    /// before usage is summed; concurrent reservations queue behind it.
    pub async fn reserve(&self, record: &SpendRecord, limit: &SpendLimit) -> Result<Sats, BudgetError> {
        record.ensure_positive()?;
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        sqlx::query(
            "INSERT INTO spends (id, app_id, amount, settled, created_at) VALUES (?, ?, ?, 0, ?)",
        )
        .bind(record.id.0.to_string())
        .bind(record.app_id.0.to_string())
        .bind(record.amount.0)
        .bind(to_millis(record.created_at))
        .execute(&mut *tx)
        .await
        .map_err(DbError::from)?;

        let used: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount), 0) FROM spends
            WHERE app_id = ? AND created_at > ? AND id != ?
            "#,
        )
        .bind(record.app_id.0.to_string())
        .bind(to_millis(limit.window_start))
        .bind(record.id.0.to_string())
        .fetch_one(&mut *tx)
        .await
        .map_err(DbError::from)?;

        let used = Sats(used);
        let after = used.saturating_add(record.amount);
        if after > limit.max_amount {
            tx.rollback().await.map_err(DbError::from)?;
            return Err(BudgetError::QuotaExceeded {
                app_id: record.app_id.to_string(),
                limit: limit.max_amount,
                used,
                requested: record.amount,
            });
        }

        tx.commit().await.map_err(DbError::from)?;
        Ok(limit.max_amount.saturating_sub(after))
    }
}

#[async_trait]
impl UsageLedger for SpendRepo {
    async fn used_since(&self, app_id: &AppId, since: DateTime<Utc>) -> Result<Sats, BudgetError> {
        Ok(self.settled_since(app_id, since).await?)
    }

    async fn record_spend(&self, record: &SpendRecord) -> Result<(), BudgetError> {
        Ok(self.insert(record).await?)
    }

    async fn try_spend(&self, record: &SpendRecord, limit: &SpendLimit) -> Result<Sats, BudgetError> {
        self.reserve(record, limit).await
    }

    async fn settle_spend(&self, id: &SpendId) -> Result<(), BudgetError> {
        let result = sqlx::query("UPDATE spends SET settled = 1 WHERE id = ?")
            .bind(id.0.to_string())
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;
        if result.rows_affected() == 0 {
            return Err(BudgetError::SpendNotFound {
                spend_id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn cancel_spend(&self, id: &SpendId) -> Result<(), BudgetError> {
        let result = sqlx::query("DELETE FROM spends WHERE id = ? AND settled = 0")
            .bind(id.0.to_string())
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;
        if result.rows_affected() == 0 {
            return Err(BudgetError::SpendNotFound {
                spend_id: id.to_string(),
            });
        }
        Ok(())
    }
}
