//! Accounting period lifecycle.
//!
//! `OPEN -> CLOSING -> CLOSED`, with `CLOSING -> OPEN` when a close fails.
//! Only closed periods are persisted.

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::{JournalEntryId, PeriodId};

use crate::ledger::{LedgerError, period_allows_posting};

/// Period status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodStatus {
    /// Accepting postings.
    Open,
    /// Close in progress; locks are held.
    Closing,
    /// Closed; no postings dated inside it.
    Closed,
}

impl PeriodStatus {
    /// Checks if a transition to the target status is valid.
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Open, Self::Closing) | (Self::Closing, Self::Closed | Self::Open)
        )
    }

    /// Stable storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
        }
    }
}

impl std::str::FromStr for PeriodStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OPEN" => Ok(Self::Open),
            "CLOSING" => Ok(Self::Closing),
            "CLOSED" => Ok(Self::Closed),
            _ => Err(format!("Unknown period status: {s}")),
        }
    }
}

/// An accounting period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingPeriod {
    /// Period ID.
    pub id: PeriodId,
    /// First day of the period.
    pub start_date: NaiveDate,
    /// Last day of the period.
    pub end_date: NaiveDate,
    /// Lifecycle status.
    pub status: PeriodStatus,
    /// Revenue closed out.
    pub total_revenue: Decimal,
    /// Expense closed out.
    pub total_expense: Decimal,
    /// Revenue minus expense.
    pub net_income: Decimal,
    /// Closing entry, absent when every temporary account was already zero.
    pub closing_entry_id: Option<JournalEntryId>,
    /// Optional description.
    pub description: Option<String>,
    /// When the period was closed.
    pub closed_at: Option<DateTime<Utc>>,
}

impl AccountingPeriod {
    /// Creates an open period.
    #[must_use]
    pub fn open(start_date: NaiveDate, end_date: NaiveDate, description: Option<String>) -> Self {
        Self {
            id: PeriodId::new(),
            start_date,
            end_date,
            status: PeriodStatus::Open,
            total_revenue: Decimal::ZERO,
            total_expense: Decimal::ZERO,
            net_income: Decimal::ZERO,
            closing_entry_id: None,
            description,
            closed_at: None,
        }
    }

    /// Returns true if the date falls inside the period.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    /// Moves the period to the target status.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidPeriodTransition` if the transition is not allowed.
    pub fn transition(&mut self, target: PeriodStatus) -> Result<(), LedgerError> {
        if !self.status.can_transition_to(target) {
            return Err(LedgerError::InvalidPeriodTransition {
                from: self.status.as_str().to_string(),
                to: target.as_str().to_string(),
            });
        }
        self.status = target;
        Ok(())
    }

    /// Returns the closed version of a period that is `CLOSING`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidPeriodTransition` unless the period is closing.
    pub fn closed(
        &self,
        total_revenue: Decimal,
        total_expense: Decimal,
        closing_entry_id: Option<JournalEntryId>,
        closed_at: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        let mut closed = self.clone();
        closed.transition(PeriodStatus::Closed)?;
        closed.total_revenue = total_revenue;
        closed.total_expense = total_expense;
        closed.net_income = total_revenue - total_expense;
        closed.closing_entry_id = closing_entry_id;
        closed.closed_at = Some(closed_at);
        Ok(closed)
    }
}

/// Summary of the most recent close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastClosing {
    /// Latest closed period.
    pub period_id: Option<PeriodId>,
    /// End date of the latest closed period.
    pub last_end_date: Option<NaiveDate>,
    /// Day after the latest closed end date.
    pub next_start_date: Option<NaiveDate>,
    /// Net income of the latest closed period.
    pub last_net_income: Option<Decimal>,
}

impl LastClosing {
    /// Builds the summary from the latest closed period.
    #[must_use]
    pub fn from_latest(latest: Option<&AccountingPeriod>) -> Self {
        Self {
            period_id: latest.map(|p| p.id),
            last_end_date: latest.map(|p| p.end_date),
            next_start_date: latest.and_then(|p| p.end_date.checked_add_days(Days::new(1))),
            last_net_income: latest.map(|p| p.net_income),
        }
    }
}

/// Posting status of a single date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodDateInfo {
    /// The date looked up.
    pub date: NaiveDate,
    /// True when postings dated `date` are rejected.
    pub is_closed: bool,
    /// End date of the latest closed period.
    pub closed_through: Option<NaiveDate>,
    /// Closed period whose range covers the date, if any.
    pub period: Option<AccountingPeriod>,
}

impl PeriodDateInfo {
    /// Looks the date up in the closed periods.
    ///
    /// A date before the first recorded period start is still closed once any
    /// later period is closed.
    #[must_use]
    pub fn for_date(date: NaiveDate, periods: &[AccountingPeriod]) -> Self {
        let closed = || periods.iter().filter(|p| p.status == PeriodStatus::Closed);
        let closed_through = closed().map(|p| p.end_date).max();
        Self {
            date,
            is_closed: !period_allows_posting(date, closed_through),
            closed_through,
            period: closed().find(|p| p.contains(date)).cloned(),
        }
    }
}

/// Rejects closes that are not strictly after the latest closed period.
///
/// # Errors
///
/// Returns `LedgerError::ClosingConflict` if a period ending on `period_end`
/// is already closed or a later period is.
pub fn check_close_order(
    period_end: NaiveDate,
    latest: Option<&AccountingPeriod>,
) -> Result<(), LedgerError> {
    match latest {
        Some(latest) if period_end == latest.end_date => Err(LedgerError::ClosingConflict(
            format!("period ending {period_end} is already closed"),
        )),
        Some(latest) if period_end < latest.end_date => {
            Err(LedgerError::ClosingConflict(format!(
                "cannot close period ending {period_end} after period ending {} was closed",
                latest.end_date
            )))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_valid_transitions() {
        assert!(PeriodStatus::Open.can_transition_to(PeriodStatus::Closing));
        assert!(PeriodStatus::Closing.can_transition_to(PeriodStatus::Closed));
        assert!(PeriodStatus::Closing.can_transition_to(PeriodStatus::Open));
        assert!(!PeriodStatus::Open.can_transition_to(PeriodStatus::Closed));
        assert!(!PeriodStatus::Closed.can_transition_to(PeriodStatus::Open));
        assert!(!PeriodStatus::Closed.can_transition_to(PeriodStatus::Closing));
    }

    #[test]
    fn test_closed_requires_closing_status() {
        let period = AccountingPeriod::open(date(2024, 1, 1), date(2024, 1, 31), None);
        assert!(matches!(
            period.closed(dec!(0), dec!(0), None, Utc::now()),
            Err(LedgerError::InvalidPeriodTransition { .. })
        ));

        let mut period = period;
        period.transition(PeriodStatus::Closing).unwrap();
        let closed = period
            .closed(dec!(10000000), dec!(4000000), None, Utc::now())
            .unwrap();
        assert_eq!(closed.status, PeriodStatus::Closed);
        assert_eq!(closed.net_income, dec!(6000000));
        assert_eq!(period.status, PeriodStatus::Closing);
    }

    #[test]
    fn test_close_order() {
        let mut latest = AccountingPeriod::open(date(2024, 1, 1), date(2024, 1, 31), None);
        latest.status = PeriodStatus::Closed;

        assert!(check_close_order(date(2024, 2, 29), Some(&latest)).is_ok());
        assert!(check_close_order(date(2024, 2, 29), None).is_ok());
        assert!(matches!(
            check_close_order(date(2024, 1, 31), Some(&latest)),
            Err(LedgerError::ClosingConflict(_))
        ));
        assert!(matches!(
            check_close_order(date(2023, 12, 31), Some(&latest)),
            Err(LedgerError::ClosingConflict(_))
        ));
    }

    #[test]
    fn test_last_closing_next_start() {
        let mut latest = AccountingPeriod::open(date(2024, 1, 1), date(2024, 1, 31), None);
        latest.net_income = dec!(500);

        let info = LastClosing::from_latest(Some(&latest));
        assert_eq!(info.next_start_date, Some(date(2024, 2, 1)));
        assert_eq!(info.last_net_income, Some(dec!(500)));

        let empty = LastClosing::from_latest(None);
        assert_eq!(empty.last_end_date, None);
        assert_eq!(empty.next_start_date, None);
    }

    #[test]
    fn test_contains() {
        let period = AccountingPeriod::open(date(2024, 1, 1), date(2024, 1, 31), None);
        assert!(period.contains(date(2024, 1, 1)));
        assert!(period.contains(date(2024, 1, 31)));
        assert!(!period.contains(date(2024, 2, 1)));
    }

    #[test]
    fn test_period_date_info() {
        let mut january = AccountingPeriod::open(date(2024, 1, 10), date(2024, 1, 31), None);
        january.status = PeriodStatus::Closed;
        let mut february = AccountingPeriod::open(date(2024, 2, 1), date(2024, 2, 29), None);
        february.status = PeriodStatus::Closed;
        let periods = vec![january.clone(), february];

        let inside = PeriodDateInfo::for_date(date(2024, 1, 15), &periods);
        assert!(inside.is_closed);
        assert_eq!(inside.closed_through, Some(date(2024, 2, 29)));
        assert_eq!(inside.period.map(|p| p.id), Some(january.id));

        let before_first = PeriodDateInfo::for_date(date(2024, 1, 2), &periods);
        assert!(before_first.is_closed);
        assert!(before_first.period.is_none());

        let after = PeriodDateInfo::for_date(date(2024, 3, 1), &periods);
        assert!(!after.is_closed);
        assert!(after.period.is_none());

        let empty = PeriodDateInfo::for_date(date(2024, 3, 1), &[]);
        assert!(!empty.is_closed);
        assert_eq!(empty.closed_through, None);
    }
}
