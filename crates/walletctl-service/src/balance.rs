//! Balance orchestration
//!
//! The balance disclosed to an application is the backend balance capped by
//! whatever remains of the budget on the grant that governs its spending.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;
use walletctl_budget::{cap_available, BudgetAccountant, BudgetError};
use walletctl_permits::{find_grant_within, PermissionStore, PermitError};
use walletctl_types::{Application, BudgetRenewal, Method, PublicKey, RequestContext, Sats};

use crate::response::BalancePayload;
use crate::{BackendError, FundingBackend};

/// Failures while computing an available balance
#[derive(Error, Debug)]
pub enum BalanceError {
    #[error("{0}")]
    Backend(#[from] BackendError),

    #[error("{0}")]
    Store(#[from] PermitError),

    #[error("{0}")]
    Budget(#[from] BudgetError),
}

/// The budget that capped a balance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetCap {
    pub max_amount: Sats,
    pub renewal: BudgetRenewal,
    pub used: Sats,
}

/// A balance ready to disclose, in sats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailableBalance {
    /// What the backend reported
    pub raw: Sats,
    /// What the application may see
    pub available: Sats,
    pub cap: Option<BudgetCap>,
}

impl AvailableBalance {
    /// Wire payload in millisats
    pub fn to_payload(&self) -> BalancePayload {
        BalancePayload {
            balance: self.available.to_msats(),
            max_amount: self.cap.map(|c| c.max_amount.to_msats()),
            budget_renewal: self.cap.map(|c| c.renewal),
        }
    }
}

/// Combines the funding backend with grants and budget usage
#[derive(Clone)]
pub struct BalanceOrchestrator {
    backend: Arc<dyn FundingBackend>,
    grants: Arc<dyn PermissionStore>,
    budget: BudgetAccountant,
}

impl BalanceOrchestrator {
    pub fn new(
        backend: Arc<dyn FundingBackend>,
        grants: Arc<dyn PermissionStore>,
        budget: BudgetAccountant,
    ) -> Self {
        Self {
            backend,
            grants,
            budget,
        }
    }

    /// Balance `application` may see when asking through `method`
    pub async fn get_available_balance(
        &self,
        ctx: &RequestContext,
        application: &Application,
        identity: &PublicKey,
        method: Method,
    ) -> Result<AvailableBalance, BalanceError> {
        self.get_available_balance_at(ctx, application, identity, method, Utc::now())
            .await
    }

    pub async fn get_available_balance_at(
        &self,
        ctx: &RequestContext,
        application: &Application,
        identity: &PublicKey,
        method: Method,
        now: DateTime<Utc>,
    ) -> Result<AvailableBalance, BalanceError> {
        let raw = ctx
            .run(self.backend.get_balance(identity))
            .await
            .map_err(|_| BackendError::Timeout)??;

        let grant = match method.budget_source() {
            Some(source) => {
                find_grant_within(self.grants.as_ref(), ctx, &application.id, source).await?
            }
            None => None,
        };

        let snapshot = match &grant {
            Some(grant) => self.budget.snapshot(ctx, grant, now).await?,
            None => None,
        };

        let balance = match snapshot {
            Some(snapshot) => AvailableBalance {
                raw,
                available: cap_available(raw, Some(snapshot.remaining)),
                cap: Some(BudgetCap {
                    max_amount: snapshot.max_amount,
                    renewal: snapshot.renewal,
                    used: snapshot.used,
                }),
            },
            None => AvailableBalance {
                raw,
                available: raw,
                cap: None,
            },
        };

        debug!(
            app_id = %application.id,
            raw = raw.0,
            available = balance.available.0,
            capped = balance.cap.is_some(),
            "Computed available balance"
        );
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use walletctl_budget::{MemoryUsageLedger, SpendRecord, UsageLedger};
    use walletctl_permits::MemoryPermissionStore;
    use walletctl_types::{MilliSats, PermissionGrant};

    struct FixedBackend(Sats);

    #[async_trait]
    impl FundingBackend for FixedBackend {
        async fn get_balance(&self, _identity: &PublicKey) -> Result<Sats, BackendError> {
            Ok(self.0)
        }
    }

    fn app() -> Application {
        Application::new(
            "wallet app",
            PublicKey::parse("c9b0a3d1f2e4c6b8a0d2f4e6c8b0a2d4f6e8c0b2a4d6f8e0c2b4a6d8f0e2c4b6")
                .unwrap(),
        )
    }

    async fn orchestrator(
        raw: i64,
        grant: Option<PermissionGrant>,
        used: i64,
    ) -> BalanceOrchestrator {
        let usage = Arc::new(MemoryUsageLedger::new());
        if let Some(grant) = &grant {
            if used > 0 {
                let spend = SpendRecord::settled(grant.app_id.clone(), Sats(used))
                    .at(grant.created_at + chrono::Duration::seconds(1));
                usage.record_spend(&spend).await.unwrap();
            }
        }
        let grants = Arc::new(MemoryPermissionStore::with_grants(grant).await);
        BalanceOrchestrator::new(
            Arc::new(FixedBackend(Sats(raw))),
            grants,
            BudgetAccountant::new(usage),
        )
    }

    #[tokio::test]
    async fn test_uncapped_balance_passes_through() {
        let app = app();
        let orchestrator = orchestrator(5000, None, 0).await;
        let balance = orchestrator
            .get_available_balance(&RequestContext::background(), &app, &app.pubkey, Method::GetBalance)
            .await
            .unwrap();
        assert_eq!(balance.available, Sats(5000));
        assert!(balance.cap.is_none());
        assert_eq!(balance.to_payload().balance, MilliSats(5_000_000));
    }

    #[tokio::test]
    async fn test_cap_uses_remaining_budget() {
        let app = app();
        let grant = PermissionGrant::new(app.id.clone(), Method::PayInvoice)
            .with_budget(Sats(3000), BudgetRenewal::Never);
        let orchestrator = orchestrator(5000, Some(grant), 1000).await;
        let balance = orchestrator
            .get_available_balance(&RequestContext::background(), &app, &app.pubkey, Method::GetBalance)
            .await
            .unwrap();
        assert_eq!(balance.available, Sats(2000));
        assert_eq!(balance.cap.map(|c| c.used), Some(Sats(1000)));

        let payload = balance.to_payload();
        assert_eq!(payload.max_amount, Some(MilliSats(3_000_000)));
        assert_eq!(payload.budget_renewal, Some(BudgetRenewal::Never));
    }

    #[tokio::test]
    async fn test_zero_max_amount_is_uncapped() {
        let app = app();
        let grant = PermissionGrant::new(app.id.clone(), Method::PayInvoice);
        let orchestrator = orchestrator(700, Some(grant), 0).await;
        let balance = orchestrator
            .get_available_balance(&RequestContext::background(), &app, &app.pubkey, Method::GetBalance)
            .await
            .unwrap();
        assert_eq!(balance.available, Sats(700));
        assert!(balance.to_payload().max_amount.is_none());
    }

    #[tokio::test]
    async fn test_overspent_budget_is_zero() {
        let app = app();
        let grant = PermissionGrant::new(app.id.clone(), Method::PayInvoice)
            .with_budget(Sats(1000), BudgetRenewal::Never);
        let orchestrator = orchestrator(5000, Some(grant), 1500).await;
        let balance = orchestrator
            .get_available_balance(&RequestContext::background(), &app, &app.pubkey, Method::GetBalance)
            .await
            .unwrap();
        assert_eq!(balance.available, Sats(0));
        assert_eq!(balance.to_payload().balance, MilliSats(0));
    }
}
