//! Database row models and their conversion to domain types
//!
//! IDs are stored as bare UUID strings and timestamps as Unix milliseconds.

use chrono::{DateTime, TimeZone, Utc};
use sqlx::FromRow;
use uuid::Uuid;
use walletctl_budget::SpendRecord;
use walletctl_types::{
    AppId, Application, GrantId, PermissionGrant, PublicKey, RequestEvent, RequestEventId,
    Sats, SpendId,
};

use crate::{DbError, DbResult};

pub(crate) fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DbResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| DbError::Decode(format!("timestamp out of range: {}", ms)))
}

fn parse_uuid(column: &str, value: &str) -> DbResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| DbError::Decode(format!("{}: {}", column, e)))
}

#[derive(Debug, Clone, FromRow)]
pub struct DbApp {
    pub id: String,
    pub name: String,
    pub pubkey: String,
    pub created_at: i64,
}

impl TryFrom<DbApp> for Application {
    type Error = DbError;

    fn try_from(row: DbApp) -> DbResult<Self> {
        Ok(Application {
            id: AppId::from_uuid(parse_uuid("apps.id", &row.id)?),
            name: row.name,
            pubkey: PublicKey::parse(&row.pubkey).map_err(|e| DbError::Decode(e.to_string()))?,
            created_at: from_millis(row.created_at)?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbPermission {
    pub id: String,
    pub app_id: String,
    pub request_method: String,
    pub max_amount: i64,
    pub budget_renewal: String,
    pub expires_at: Option<i64>,
    pub created_at: i64,
}

impl TryFrom<DbPermission> for PermissionGrant {
    type Error = DbError;

    fn try_from(row: DbPermission) -> DbResult<Self> {
        Ok(PermissionGrant {
            id: GrantId::from_uuid(parse_uuid("app_permissions.id", &row.id)?),
            app_id: AppId::from_uuid(parse_uuid("app_permissions.app_id", &row.app_id)?),
            method: row
                .request_method
                .parse()
                .map_err(|e: walletctl_types::TypesError| DbError::Decode(e.to_string()))?,
            max_amount: Sats(row.max_amount),
            budget_renewal: row
                .budget_renewal
                .parse()
                .map_err(|e: walletctl_types::TypesError| DbError::Decode(e.to_string()))?,
            expires_at: row.expires_at.map(from_millis).transpose()?,
            created_at: from_millis(row.created_at)?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbRequestEvent {
    pub id: String,
    pub app_id: String,
    pub origin_event_id: String,
    pub content: String,
    pub state: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<DbRequestEvent> for RequestEvent {
    type Error = DbError;

    fn try_from(row: DbRequestEvent) -> DbResult<Self> {
        Ok(RequestEvent {
            id: RequestEventId::from_uuid(parse_uuid("request_events.id", &row.id)?),
            app_id: AppId::from_uuid(parse_uuid("request_events.app_id", &row.app_id)?),
            origin_event_id: row.origin_event_id,
            content: row.content,
            state: row
                .state
                .parse()
                .map_err(|e: walletctl_types::TypesError| DbError::Decode(e.to_string()))?,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbSpend {
    pub id: String,
    pub app_id: String,
    pub amount: i64,
    pub settled: bool,
    pub created_at: i64,
}

impl TryFrom<DbSpend> for SpendRecord {
    type Error = DbError;

    fn try_from(row: DbSpend) -> DbResult<Self> {
        Ok(SpendRecord {
            id: SpendId::from_uuid(parse_uuid("spends.id", &row.id)?),
            app_id: AppId::from_uuid(parse_uuid("spends.app_id", &row.app_id)?),
            amount: Sats(row.amount),
            settled: row.settled,
            created_at: from_millis(row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_roundtrip_truncates_to_millis() {
        let now = Utc::now();
        let back = from_millis(to_millis(now)).unwrap();
        assert_eq!(back.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn test_bad_state_is_decode_error() {
        let row = DbRequestEvent {
            id: Uuid::new_v4().to_string(),
            app_id: Uuid::new_v4().to_string(),
            origin_event_id: "evt".to_string(),
            content: String::new(),
            state: "replied".to_string(),
            created_at: 0,
            updated_at: 0,
        };
        assert!(matches!(
            RequestEvent::try_from(row),
            Err(DbError::Decode(_))
        ));
    }
}
