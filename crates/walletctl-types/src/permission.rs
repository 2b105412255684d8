//! Permission grants
//!
//! A grant is the per-application, per-method capability record. It may
//! carry a spending cap that renews on a fixed calendar period.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{AppId, GrantId, Method, Sats, TypesError};

/// How often a grant's budget resets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetRenewal {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    #[default]
    Never,
}

impl BudgetRenewal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::Never => "never",
        }
    }
}

impl fmt::Display for BudgetRenewal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BudgetRenewal {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            "never" | "" => Ok(Self::Never),
            other => Err(TypesError::UnknownBudgetRenewal {
                value: other.to_string(),
            }),
        }
    }
}

/// A capability record for one (application, method) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub id: GrantId,
    pub app_id: AppId,
    pub method: Method,
    /// Spending cap per renewal window; zero or less means unlimited
    pub max_amount: Sats,
    pub budget_renewal: BudgetRenewal,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PermissionGrant {
    /// Create an uncapped, non-expiring grant
    pub fn new(app_id: AppId, method: Method) -> Self {
        Self {
            id: GrantId::new(),
            app_id,
            method,
            max_amount: Sats::ZERO,
            budget_renewal: BudgetRenewal::Never,
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    /// Set a spending cap renewing every `renewal`
    pub fn with_budget(mut self, max_amount: Sats, renewal: BudgetRenewal) -> Self {
        self.max_amount = max_amount;
        self.budget_renewal = renewal;
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether this grant bounds spending at all
    pub fn is_capped(&self) -> bool {
        self.max_amount.is_positive()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires) if expires <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_renewal_parsing() {
        assert_eq!("monthly".parse::<BudgetRenewal>().unwrap(), BudgetRenewal::Monthly);
        assert_eq!("".parse::<BudgetRenewal>().unwrap(), BudgetRenewal::Never);
        assert!("hourly".parse::<BudgetRenewal>().is_err());
        assert_eq!(
            serde_json::to_string(&BudgetRenewal::Weekly).unwrap(),
            "\"weekly\""
        );
    }

    #[test]
    fn test_zero_cap_is_unlimited() {
        let grant = PermissionGrant::new(AppId::new(), Method::PayInvoice);
        assert!(!grant.is_capped());

        let negative = grant.clone().with_budget(Sats(-5), BudgetRenewal::Daily);
        assert!(!negative.is_capped());

        let capped = grant.with_budget(Sats(3000), BudgetRenewal::Monthly);
        assert!(capped.is_capped());
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let grant = PermissionGrant::new(AppId::new(), Method::GetBalance);
        assert!(!grant.is_expired(now));
        assert!(grant.clone().with_expiry(now).is_expired(now));
        assert!(!grant.with_expiry(now + Duration::hours(1)).is_expired(now));
    }
}
