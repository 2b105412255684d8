//! Budget renewal windows

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use walletctl_types::BudgetRenewal;

/// Start of the budget window that contains `now`.
///
/// Windows are aligned to UTC midnight. A `never` budget runs from the
/// grant's creation for its whole lifetime.
pub fn start_of_budget(
    renewal: BudgetRenewal,
    grant_created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let today = now.date_naive();
    let first_day = match renewal {
        BudgetRenewal::Daily => today,
        BudgetRenewal::Weekly => {
            today - Duration::days(i64::from(today.weekday().num_days_from_monday()))
        }
        BudgetRenewal::Monthly => {
            NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap_or(today)
        }
        BudgetRenewal::Yearly => NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today),
        BudgetRenewal::Never => return grant_created_at,
    };
    Utc.from_utc_datetime(&first_day.and_time(NaiveTime::default()))
}
