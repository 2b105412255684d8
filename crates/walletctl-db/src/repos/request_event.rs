//! Request event repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use walletctl_ledger::{EventStore, LedgerError};
use walletctl_types::{AppId, RequestEvent, RequestEventId, RequestState};

use crate::models::{to_millis, DbRequestEvent};
use crate::DbResult;

#[derive(Clone)]
pub struct RequestEventRepo {
    pool: SqlitePool,
}

impl RequestEventRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, event: &RequestEvent) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO request_events
                (id, app_id, origin_event_id, content, state, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.id.0.to_string())
        .bind(event.app_id.0.to_string())
        .bind(&event.origin_event_id)
        .bind(&event.content)
        .bind(event.state.as_str())
        .bind(to_millis(event.created_at))
        .bind(to_millis(event.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: &RequestEventId) -> DbResult<Option<RequestEvent>> {
        let row = sqlx::query_as::<_, DbRequestEvent>("SELECT * FROM request_events WHERE id = ?")
            .bind(id.0.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(RequestEvent::try_from).transpose()
    }

    /// Move a `received` event to `to`; returns whether a row changed
    pub async fn mark_terminal(
        &self,
        id: &RequestEventId,
        to: RequestState,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE request_events SET state = ?, updated_at = ? WHERE id = ? AND state = ?",
        )
        .bind(to.as_str())
        .bind(to_millis(at))
        .bind(id.0.to_string())
        .bind(RequestState::Received.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn list_by_app(&self, app_id: &AppId, limit: i64) -> DbResult<Vec<RequestEvent>> {
        let rows = sqlx::query_as::<_, DbRequestEvent>(
            "SELECT * FROM request_events WHERE app_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(app_id.0.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RequestEvent::try_from).collect()
    }

    /// Events that never reached a terminal state
    pub async fn list_unfinished(&self, limit: i64) -> DbResult<Vec<RequestEvent>> {
        let rows = sqlx::query_as::<_, DbRequestEvent>(
            "SELECT * FROM request_events WHERE state = ? ORDER BY created_at LIMIT ?",
        )
        .bind(RequestState::Received.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RequestEvent::try_from).collect()
    }
}

#[async_trait]
impl EventStore for RequestEventRepo {
    async fn insert(&self, event: &RequestEvent) -> Result<(), LedgerError> {
        Ok(RequestEventRepo::insert(self, event).await?)
    }

    async fn transition(
        &self,
        id: &RequestEventId,
        to: RequestState,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if self.mark_terminal(id, to, at).await? {
            return Ok(());
        }
        match self.find_by_id(id).await? {
            Some(event) => Err(LedgerError::InvalidTransition {
                event_id: id.to_string(),
                from: event.state,
                to,
            }),
            None => Err(LedgerError::NotFound {
                event_id: id.to_string(),
            }),
        }
    }

    async fn get(&self, id: &RequestEventId) -> Result<Option<RequestEvent>, LedgerError> {
        Ok(self.find_by_id(id).await?)
    }
}
