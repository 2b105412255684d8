//! walletctl Budget - Rolling spend budgets
//!
//! A capped grant allows at most `max_amount` sats of settled spend per
//! renewal window. This crate computes how much of that is already used and
//! how much remains, and offers an atomic reserve-and-check primitive for
//! the spend side.
//!
//! Remaining-budget figures reported to reads are advisory: two reads can
//! observe the same headroom. The cap is authoritative only through
//! [`UsageLedger::try_spend`].

pub mod window;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use walletctl_types::{
    AppId, BudgetRenewal, MilliSats, PermissionGrant, RequestContext, Sats, SpendId,
};

pub use window::start_of_budget;

/// Errors that can occur in budget accounting
#[derive(Error, Debug)]
pub enum BudgetError {
    #[error("Usage ledger error: {message}")]
    Store { message: String },

    #[error("Usage ledger timed out")]
    Timeout,

    #[error("Budget exceeded for {app_id}: limit {limit}, used {used}, requested {requested}")]
    QuotaExceeded {
        app_id: String,
        limit: Sats,
        used: Sats,
        requested: Sats,
    },

    #[error("Spend not found: {spend_id}")]
    SpendNotFound { spend_id: String },

    #[error("Spend amount must be positive, got {amount}")]
    InvalidAmount { amount: Sats },
}

pub type Result<T> = std::result::Result<T, BudgetError>;

/// A spend attributed to an application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendRecord {
    pub id: SpendId,
    pub app_id: AppId,
    pub amount: Sats,
    /// Only settled spends count as used budget
    pub settled: bool,
    pub created_at: DateTime<Utc>,
}

impl SpendRecord {
    /// A completed spend
    pub fn settled(app_id: AppId, amount: Sats) -> Self {
        Self {
            id: SpendId::new(),
            app_id,
            amount,
            settled: true,
            created_at: Utc::now(),
        }
    }

    /// A spend that is in flight
    pub fn pending(app_id: AppId, amount: Sats) -> Self {
        Self {
            settled: false,
            ..Self::settled(app_id, amount)
        }
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Reservations must move a positive amount
    pub fn ensure_positive(&self) -> Result<()> {
        if self.amount.is_positive() {
            Ok(())
        } else {
            Err(BudgetError::InvalidAmount {
                amount: self.amount,
            })
        }
    }
}

/// The cap a reservation is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpendLimit {
    pub max_amount: Sats,
    pub window_start: DateTime<Utc>,
}

impl SpendLimit {
    /// The limit in force for `grant` at `now`, if the grant is capped
    pub fn for_grant(grant: &PermissionGrant, now: DateTime<Utc>) -> Option<Self> {
        grant.is_capped().then(|| Self {
            max_amount: grant.max_amount,
            window_start: start_of_budget(grant.budget_renewal, grant.created_at, now),
        })
    }
}

/// Ledger of spends, owned by the funding side
#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Sum of settled spends for `app_id` created strictly after `since`
    async fn used_since(&self, app_id: &AppId, since: DateTime<Utc>) -> Result<Sats>;

    /// Append a spend without any limit check
    async fn record_spend(&self, record: &SpendRecord) -> Result<()>;

    /// Atomically check `limit` and insert `record` as an in-flight spend.
    ///
    /// In-flight spends count against the limit here even though
    /// `used_since` ignores them. Returns the headroom left after the
    /// reservation.
    async fn try_spend(&self, record: &SpendRecord, limit: &SpendLimit) -> Result<Sats>;

    /// Mark an in-flight spend as completed
    async fn settle_spend(&self, id: &SpendId) -> Result<()>;

    /// Drop an in-flight spend that did not complete
    async fn cancel_spend(&self, id: &SpendId) -> Result<()>;
}

/// Budget figures for a capped grant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetSnapshot {
    pub max_amount: Sats,
    pub used: Sats,
    pub remaining: Sats,
    pub renewal: BudgetRenewal,
    pub window_start: DateTime<Utc>,
}

/// Cap a raw balance by the remaining budget.
///
/// With no cap the raw balance passes through; with a cap the result is
/// never above either figure and never negative.
pub fn cap_available(raw: Sats, remaining: Option<Sats>) -> Sats {
    match remaining {
        Some(remaining) => raw.min(remaining).non_negative(),
        None => raw,
    }
}

/// Computes used and remaining budget for grants
#[derive(Clone)]
pub struct BudgetAccountant {
    usage: Arc<dyn UsageLedger>,
}

impl BudgetAccountant {
    pub fn new(usage: Arc<dyn UsageLedger>) -> Self {
        Self { usage }
    }

    /// Settled spend inside the grant's current window
    pub async fn used(
        &self,
        ctx: &RequestContext,
        grant: &PermissionGrant,
        now: DateTime<Utc>,
    ) -> Result<Sats> {
        let since = start_of_budget(grant.budget_renewal, grant.created_at, now);
        let used = ctx
            .run(self.usage.used_since(&grant.app_id, since))
            .await
            .map_err(|_| BudgetError::Timeout)??;
        debug!(app_id = %grant.app_id, %since, used = used.0, "Computed budget usage");
        Ok(used)
    }

    /// Budget figures for `grant`, or `None` when the grant is unlimited
    pub async fn snapshot(
        &self,
        ctx: &RequestContext,
        grant: &PermissionGrant,
        now: DateTime<Utc>,
    ) -> Result<Option<BudgetSnapshot>> {
        if !grant.is_capped() {
            return Ok(None);
        }
        let used = self.used(ctx, grant, now).await?;
        Ok(Some(BudgetSnapshot {
            max_amount: grant.max_amount,
            used,
            remaining: grant.max_amount.saturating_sub(used).non_negative(),
            renewal: grant.budget_renewal,
            window_start: start_of_budget(grant.budget_renewal, grant.created_at, now),
        }))
    }

    /// `max(max_amount - used, 0)`, or `None` when the grant is unlimited
    pub async fn remaining_budget(
        &self,
        ctx: &RequestContext,
        grant: &PermissionGrant,
        now: DateTime<Utc>,
    ) -> Result<Option<Sats>> {
        Ok(self.snapshot(ctx, grant, now).await?.map(|s| s.remaining))
    }

    /// Whether `requested` more sats fit in the grant's current window
    pub async fn can_spend(
        &self,
        ctx: &RequestContext,
        grant: &PermissionGrant,
        requested: Sats,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        match self.snapshot(ctx, grant, now).await? {
            Some(snapshot) => Ok(snapshot.used.saturating_add(requested) <= snapshot.max_amount),
            None => Ok(true),
        }
    }

    /// [`can_spend`](Self::can_spend) for a wire amount, compared in millisats
    /// so sub-sat remainders are never rounded away
    pub async fn can_spend_msats(
        &self,
        ctx: &RequestContext,
        grant: &PermissionGrant,
        requested: MilliSats,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        match self.snapshot(ctx, grant, now).await? {
            Some(snapshot) => Ok(snapshot.used.to_msats().saturating_add(requested)
                <= snapshot.max_amount.to_msats()),
            None => Ok(true),
        }
    }
}

/// In-process usage ledger
#[derive(Clone, Default)]
pub struct MemoryUsageLedger {
    spends: Arc<RwLock<Vec<SpendRecord>>>,
}

impl MemoryUsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All spends recorded for an application
    pub async fn spends_for_app(&self, app_id: &AppId) -> Vec<SpendRecord> {
        let spends = self.spends.read().await;
        spends.iter().filter(|s| &s.app_id == app_id).cloned().collect()
    }
}

fn sum_since<'a>(
    spends: impl Iterator<Item = &'a SpendRecord>,
    app_id: &AppId,
    since: DateTime<Utc>,
    include_pending: bool,
) -> Sats {
    spends
        .filter(|s| &s.app_id == app_id && s.created_at > since)
        .filter(|s| include_pending || s.settled)
        .fold(Sats::ZERO, |acc, s| acc.saturating_add(s.amount))
}

#[async_trait]
impl UsageLedger for MemoryUsageLedger {
    async fn used_since(&self, app_id: &AppId, since: DateTime<Utc>) -> Result<Sats> {
        let spends = self.spends.read().await;
        Ok(sum_since(spends.iter(), app_id, since, false))
    }

    async fn record_spend(&self, record: &SpendRecord) -> Result<()> {
        self.spends.write().await.push(record.clone());
        Ok(())
    }

    async fn try_spend(&self, record: &SpendRecord, limit: &SpendLimit) -> Result<Sats> {
        record.ensure_positive()?;
        // Hold the write lock across read and insert
        let mut spends = self.spends.write().await;
        let used = sum_since(spends.iter(), &record.app_id, limit.window_start, true);
        let after = used.saturating_add(record.amount);
        if after > limit.max_amount {
            debug!(
                app_id = %record.app_id,
                used = used.0,
                requested = record.amount.0,
                "Spend over budget"
            );
            return Err(BudgetError::QuotaExceeded {
                app_id: record.app_id.to_string(),
                limit: limit.max_amount,
                used,
                requested: record.amount,
            });
        }
        spends.push(SpendRecord {
            settled: false,
            ..record.clone()
        });
        Ok(limit.max_amount.saturating_sub(after))
    }

    async fn settle_spend(&self, id: &SpendId) -> Result<()> {
        let mut spends = self.spends.write().await;
        let spend = spends
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| BudgetError::SpendNotFound {
                spend_id: id.to_string(),
            })?;
        spend.settled = true;
        Ok(())
    }

    async fn cancel_spend(&self, id: &SpendId) -> Result<()> {
        let mut spends = self.spends.write().await;
        let before = spends.len();
        spends.retain(|s| &s.id != id || s.settled);
        if spends.len() == before {
            return Err(BudgetError::SpendNotFound {
                spend_id: id.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use walletctl_types::Method;

    fn capped_grant(app_id: &AppId, max: i64) -> PermissionGrant {
        PermissionGrant::new(app_id.clone(), Method::PayInvoice)
            .with_budget(Sats(max), BudgetRenewal::Monthly)
    }

    async fn accountant_with_usage(app_id: &AppId, used: i64) -> (BudgetAccountant, MemoryUsageLedger) {
        let usage = MemoryUsageLedger::new();
        if used > 0 {
            usage
                .record_spend(&SpendRecord::settled(app_id.clone(), Sats(used)))
                .await
                .unwrap();
        }
        (BudgetAccountant::new(Arc::new(usage.clone())), usage)
    }

    #[test]
    fn test_cap_available_unlimited() {
        for raw in [0, 1, 5000, 1_000_000] {
            assert_eq!(cap_available(Sats(raw), None), Sats(raw));
        }
    }

    #[test]
    fn test_cap_available_takes_minimum() {
        assert_eq!(cap_available(Sats(5000), Some(Sats(2000))), Sats(2000));
        assert_eq!(cap_available(Sats(100), Some(Sats(50))), Sats(50));
        assert_eq!(cap_available(Sats(10), Some(Sats(50))), Sats(10));
        assert_eq!(cap_available(Sats(10), Some(Sats(0))), Sats(0));
    }

    #[test]
    fn test_cap_available_never_negative() {
        assert_eq!(cap_available(Sats(-10), Some(Sats(50))), Sats(0));
    }

    #[tokio::test]
    async fn test_remaining_budget() {
        let app_id = AppId::new();
        let (accountant, _) = accountant_with_usage(&app_id, 1000).await;
        let ctx = RequestContext::background();
        let grant = capped_grant(&app_id, 3000);

        let remaining = accountant
            .remaining_budget(&ctx, &grant, Utc::now())
            .await
            .unwrap();
        assert_eq!(remaining, Some(Sats(2000)));
    }

    #[tokio::test]
    async fn test_overspent_budget_clamps_to_zero() {
        let app_id = AppId::new();
        let (accountant, _) = accountant_with_usage(&app_id, 3500).await;
        let ctx = RequestContext::background();
        let grant = capped_grant(&app_id, 3000);

        let snapshot = accountant
            .snapshot(&ctx, &grant, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.used, Sats(3500));
        assert_eq!(snapshot.remaining, Sats(0));
        assert_eq!(snapshot.renewal, BudgetRenewal::Monthly);
    }

    #[tokio::test]
    async fn test_unlimited_grant_has_no_snapshot() {
        let app_id = AppId::new();
        let (accountant, _) = accountant_with_usage(&app_id, 1000).await;
        let grant = PermissionGrant::new(app_id, Method::PayInvoice);

        let ctx = RequestContext::background();
        assert_eq!(
            accountant.remaining_budget(&ctx, &grant, Utc::now()).await.unwrap(),
            None
        );
        assert!(accountant
            .can_spend(&ctx, &grant, Sats(i64::MAX), Utc::now())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_usage_outside_window_is_ignored() {
        let app_id = AppId::new();
        let usage = MemoryUsageLedger::new();
        let now = Utc::now();
        let grant = capped_grant(&app_id, 3000).with_budget(Sats(3000), BudgetRenewal::Daily);

        usage
            .record_spend(&SpendRecord::settled(app_id.clone(), Sats(2500)).at(now - Duration::days(2)))
            .await
            .unwrap();
        usage
            .record_spend(&SpendRecord::settled(app_id.clone(), Sats(100)))
            .await
            .unwrap();

        let accountant = BudgetAccountant::new(Arc::new(usage));
        let ctx = RequestContext::background();
        assert_eq!(accountant.used(&ctx, &grant, Utc::now()).await.unwrap(), Sats(100));
    }

    #[tokio::test]
    async fn test_pending_and_other_apps_do_not_count() {
        let app_id = AppId::new();
        let usage = MemoryUsageLedger::new();
        usage
            .record_spend(&SpendRecord::pending(app_id.clone(), Sats(700)))
            .await
            .unwrap();
        usage
            .record_spend(&SpendRecord::settled(AppId::new(), Sats(900)))
            .await
            .unwrap();

        let accountant = BudgetAccountant::new(Arc::new(usage));
        let ctx = RequestContext::background();
        let grant = capped_grant(&app_id, 3000);
        assert_eq!(accountant.used(&ctx, &grant, Utc::now()).await.unwrap(), Sats(0));
    }

    #[tokio::test]
    async fn test_can_spend() {
        let app_id = AppId::new();
        let (accountant, _) = accountant_with_usage(&app_id, 2950).await;
        let ctx = RequestContext::background();
        let grant = capped_grant(&app_id, 3000);

        assert!(accountant.can_spend(&ctx, &grant, Sats(50), Utc::now()).await.unwrap());
        assert!(!accountant.can_spend(&ctx, &grant, Sats(51), Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_can_spend_msats_keeps_sub_sat_remainder() {
        let app_id = AppId::new();
        let (accountant, _) = accountant_with_usage(&app_id, 2950).await;
        let ctx = RequestContext::background();
        let grant = capped_grant(&app_id, 3000);
        let now = Utc::now();

        assert!(accountant
            .can_spend_msats(&ctx, &grant, MilliSats(50_000), now)
            .await
            .unwrap());
        assert!(!accountant
            .can_spend_msats(&ctx, &grant, MilliSats(50_001), now)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_try_spend_reserves_headroom() {
        let app_id = AppId::new();
        let usage = MemoryUsageLedger::new();
        let grant = capped_grant(&app_id, 1000);
        let limit = SpendLimit::for_grant(&grant, Utc::now()).unwrap();

        let first = SpendRecord::pending(app_id.clone(), Sats(600));
        let left = usage.try_spend(&first, &limit).await.unwrap();
        assert_eq!(left, Sats(400));

        // The in-flight 600 blocks a second 600 even before it settles
        let second = SpendRecord::pending(app_id.clone(), Sats(600));
        assert!(matches!(
            usage.try_spend(&second, &limit).await,
            Err(BudgetError::QuotaExceeded { .. })
        ));

        // Settled reservations count as used
        usage.settle_spend(&first.id).await.unwrap();
        assert_eq!(
            usage.used_since(&app_id, limit.window_start).await.unwrap(),
            Sats(600)
        );
    }

    #[tokio::test]
    async fn test_try_spend_rejects_non_positive_amounts() {
        let app_id = AppId::new();
        let usage = MemoryUsageLedger::new();
        let grant = capped_grant(&app_id, 1000);
        let limit = SpendLimit::for_grant(&grant, Utc::now()).unwrap();

        for amount in [0, -500] {
            let spend = SpendRecord::pending(app_id.clone(), Sats(amount));
            assert!(matches!(
                usage.try_spend(&spend, &limit).await,
                Err(BudgetError::InvalidAmount { amount: a }) if a == Sats(amount)
            ));
        }

        // A negative reservation must not free up headroom
        let full = SpendRecord::pending(app_id.clone(), Sats(1000));
        assert_eq!(usage.try_spend(&full, &limit).await.unwrap(), Sats(0));
        assert_eq!(usage.spends.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_releases_reservation() {
        let app_id = AppId::new();
        let usage = MemoryUsageLedger::new();
        let grant = capped_grant(&app_id, 1000);
        let limit = SpendLimit::for_grant(&grant, Utc::now()).unwrap();

        let spend = SpendRecord::pending(app_id.clone(), Sats(900));
        usage.try_spend(&spend, &limit).await.unwrap();
        usage.cancel_spend(&spend.id).await.unwrap();

        let again = SpendRecord::pending(app_id.clone(), Sats(900));
        assert!(usage.try_spend(&again, &limit).await.is_ok());
        assert!(matches!(
            usage.cancel_spend(&SpendId::new()).await,
            Err(BudgetError::SpendNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_try_spend_never_exceeds_limit() {
        let app_id = AppId::new();
        let usage = MemoryUsageLedger::new();
        let grant = capped_grant(&app_id, 1000);
        let limit = SpendLimit::for_grant(&grant, Utc::now()).unwrap();

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let usage = usage.clone();
            let app_id = app_id.clone();
            tasks.push(tokio::spawn(async move {
                usage
                    .try_spend(&SpendRecord::pending(app_id, Sats(100)), &limit)
                    .await
                    .is_ok()
            }));
        }

        let mut accepted = 0;
        for task in tasks {
            if task.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 10);
        assert_eq!(usage.spends_for_app(&app_id).await.len(), 10);
    }

    #[test]
    fn test_uncapped_grant_has_no_limit() {
        let grant = PermissionGrant::new(AppId::new(), Method::PayInvoice);
        assert!(SpendLimit::for_grant(&grant, Utc::now()).is_none());
    }
}
