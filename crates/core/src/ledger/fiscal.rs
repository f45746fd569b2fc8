//! Closed-period rule.
//!
//! Periods close in order, so the ledger is locked through the end date of
//! the latest closed period.

use chrono::NaiveDate;

use super::error::LedgerError;

/// Returns true if an entry dated `entry_date` may be posted.
#[must_use]
pub fn period_allows_posting(entry_date: NaiveDate, closed_through: Option<NaiveDate>) -> bool {
    closed_through.is_none_or(|end| entry_date > end)
}

/// Rejects entries dated inside a closed period.
///
/// # Errors
///
/// Returns `LedgerError::PeriodClosed` if `entry_date` is on or before
/// `closed_through`.
pub fn ensure_period_open(
    entry_date: NaiveDate,
    closed_through: Option<NaiveDate>,
) -> Result<(), LedgerError> {
    match closed_through {
        Some(end) if entry_date <= end => Err(LedgerError::PeriodClosed {
            date: entry_date,
            closed_through: end,
        }),
        _ => Ok(()),
    }
}
