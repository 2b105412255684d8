//! walletctl Permits - Capability grants and checks
//!
//! An application may call a method only if it holds a grant for it. When
//! a request carries an amount, the grant's budget must also have room for
//! it. Denials are values, not errors, so the caller can always answer with
//! a protocol-compliant error response.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use walletctl_budget::BudgetAccountant;
use walletctl_types::{
    AppId, Application, ErrorCode, Method, MilliSats, PermissionGrant, RequestContext,
    ResponseError,
};

/// Errors raised by grant storage
#[derive(Error, Debug)]
pub enum PermitError {
    #[error("Grant store error: {message}")]
    Store { message: String },

    #[error("Grant lookup timed out")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, PermitError>;

/// Storage of permission grants, at most one per (application, method)
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn find_grant(&self, app_id: &AppId, method: Method) -> Result<Option<PermissionGrant>>;

    /// Insert or replace the grant for `(grant.app_id, grant.method)`
    async fn upsert_grant(&self, grant: &PermissionGrant) -> Result<()>;
}

/// Look up a grant under the request deadline
pub async fn find_grant_within(
    store: &dyn PermissionStore,
    ctx: &RequestContext,
    app_id: &AppId,
    method: Method,
) -> Result<Option<PermissionGrant>> {
    ctx.run(store.find_grant(app_id, method))
        .await
        .map_err(|_| PermitError::Timeout)?
}

/// Outcome of a capability check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionCheck {
    Allowed,
    Denied(ResponseError),
}

impl PermissionCheck {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    fn denied(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Denied(ResponseError::new(code, message))
    }
}

/// Decides whether an application may invoke a method
#[derive(Clone)]
pub struct CapabilityChecker {
    grants: Arc<dyn PermissionStore>,
    budget: BudgetAccountant,
}

impl CapabilityChecker {
    pub fn new(grants: Arc<dyn PermissionStore>, budget: BudgetAccountant) -> Self {
        Self { grants, budget }
    }

    /// Check `method` for `application`, with `requested` millisats to spend
    pub async fn check(
        &self,
        ctx: &RequestContext,
        application: &Application,
        method: Method,
        requested: MilliSats,
    ) -> PermissionCheck {
        self.check_at(ctx, application, method, requested, Utc::now())
            .await
    }

    /// [`check`](Self::check) against an explicit clock
    pub async fn check_at(
        &self,
        ctx: &RequestContext,
        application: &Application,
        method: Method,
        requested: MilliSats,
        now: DateTime<Utc>,
    ) -> PermissionCheck {
        let grant = match find_grant_within(self.grants.as_ref(), ctx, &application.id, method).await {
            Ok(Some(grant)) => grant,
            Ok(None) => {
                debug!(app_id = %application.id, %method, "No grant for method");
                return PermissionCheck::denied(
                    ErrorCode::Restricted,
                    format!("This app does not have permission to request {}", method),
                );
            }
            Err(e) => {
                return PermissionCheck::denied(
                    ErrorCode::Internal,
                    format!("Failed to look up permission: {}", e),
                );
            }
        };

        if grant.is_expired(now) {
            return PermissionCheck::denied(ErrorCode::Expired, "This app has expired");
        }

        if requested.is_positive() && grant.is_capped() {
            match self
                .budget
                .can_spend_msats(ctx, &grant, requested, now)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    return PermissionCheck::denied(
                        ErrorCode::QuotaExceeded,
                        "Insufficient budget remaining to make payment",
                    );
                }
                Err(e) => {
                    return PermissionCheck::denied(
                        ErrorCode::Internal,
                        format!("Failed to compute budget usage: {}", e),
                    );
                }
            }
        }

        PermissionCheck::Allowed
    }
}

/// In-process grant store
#[derive(Clone, Default)]
pub struct MemoryPermissionStore {
    grants: Arc<RwLock<HashMap<(AppId, Method), PermissionGrant>>>,
}

impl MemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `grants`
    pub async fn with_grants(grants: impl IntoIterator<Item = PermissionGrant>) -> Self {
        let store = Self::new();
        {
            let mut map = store.grants.write().await;
            for grant in grants {
                map.insert((grant.app_id.clone(), grant.method), grant);
            }
        }
        store
    }
}

#[async_trait]
impl PermissionStore for MemoryPermissionStore {
    async fn find_grant(&self, app_id: &AppId, method: Method) -> Result<Option<PermissionGrant>> {
        let grants = self.grants.read().await;
        Ok(grants.get(&(app_id.clone(), method)).cloned())
    }

    async fn upsert_grant(&self, grant: &PermissionGrant) -> Result<()> {
        let mut grants = self.grants.write().await;
        grants.insert((grant.app_id.clone(), grant.method), grant.clone());
        Ok(())
    }
}
