//! Permission grant repository

use async_trait::async_trait;
use sqlx::SqlitePool;
use walletctl_permits::{PermissionStore, PermitError};
use walletctl_types::{AppId, Method, PermissionGrant};

use crate::models::{to_millis, DbPermission};
use crate::DbResult;

#[derive(Clone)]
pub struct PermissionRepo {
    pool: SqlitePool,
}

impl PermissionRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, app_id: &AppId, method: Method) -> DbResult<Option<PermissionGrant>> {
        let row = sqlx::query_as::<_, DbPermission>(
            "SELECT * FROM app_permissions WHERE app_id = ? AND request_method = ?",
        )
        .bind(app_id.0.to_string())
        .bind(method.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(PermissionGrant::try_from).transpose()
    }

    pub async fn list_by_app(&self, app_id: &AppId) -> DbResult<Vec<PermissionGrant>> {
        let rows = sqlx::query_as::<_, DbPermission>(
            "SELECT * FROM app_permissions WHERE app_id = ? ORDER BY request_method",
        )
        .bind(app_id.0.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PermissionGrant::try_from).collect()
    }

    /// Insert a grant, or update the cap, renewal and expiry of the existing
    /// grant for the same (app, method)
    pub async fn upsert(&self, grant: &PermissionGrant) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO app_permissions
                (id, app_id, request_method, max_amount, budget_renewal, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (app_id, request_method) DO UPDATE SET
                max_amount = excluded.max_amount,
                budget_renewal = excluded.budget_renewal,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(grant.id.0.to_string())
        .bind(grant.app_id.0.to_string())
        .bind(grant.method.as_str())
        .bind(grant.max_amount.0)
        .bind(grant.budget_renewal.as_str())
        .bind(grant.expires_at.map(to_millis))
        .bind(to_millis(grant.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for PermissionRepo {
    async fn find_grant(
        &self,
        app_id: &AppId,
        method: Method,
    ) -> Result<Option<PermissionGrant>, PermitError> {
        Ok(self.find(app_id, method).await?)
    }

    async fn upsert_grant(&self, grant: &PermissionGrant) -> Result<(), PermitError> {
        Ok(self.upsert(grant).await?)
    }
}
