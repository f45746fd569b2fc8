//! Ledger store: persistence seam for accounts, entries, periods and the
//! balance cache.
//!
//! The trait is implemented by the db crate for PostgreSQL and by
//! [`MemoryLedgerStore`] for tests and embedded use. Implementations must make
//! [`LedgerStore::commit_entry`] atomic: either the entry, its lines and the
//! requested side effect are all visible, or none of them are.

mod memory;

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tally_shared::types::{AccountId, JournalEntryId};
use thiserror::Error;

use crate::account::{Account, Side};
use crate::balance::{BalanceDelta, BalanceSnapshot};
use crate::closing::AccountingPeriod;
use crate::ledger::LedgerError;
use crate::ledger::types::{JournalEntry, JournalLine, PostedEntry, SourceRef};

pub use memory::MemoryLedgerStore;

/// Errors raised by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An entry for the same source already exists.
    #[error("Source already posted as entry {existing}")]
    DuplicateSource {
        /// The existing entry.
        existing: JournalEntryId,
    },

    /// Entry date is inside a closed period.
    #[error("Entry date {date} is inside a closed period (closed through {closed_through})")]
    PeriodClosed {
        /// Entry date.
        date: NaiveDate,
        /// Latest closed end date.
        closed_through: NaiveDate,
    },

    /// The entry to reverse is no longer `POSTED`.
    #[error("Journal entry {0} is already reversed")]
    AlreadyReversed(JournalEntryId),

    /// Referenced entry does not exist.
    #[error("Journal entry not found: {0}")]
    EntryNotFound(JournalEntryId),

    /// Referenced account does not exist.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Account code already used.
    #[error("Account code already exists: {0}")]
    DuplicateAccountCode(String),

    /// Period would close out of order or twice.
    #[error("Closing conflict: {0}")]
    ClosingConflict(String),

    /// Backend failure.
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateSource { existing } => Self::DuplicateSource { existing },
            StoreError::PeriodClosed {
                date,
                closed_through,
            } => Self::PeriodClosed {
                date,
                closed_through,
            },
            StoreError::AlreadyReversed(id) => Self::AlreadyReversed(id),
            StoreError::EntryNotFound(id) => Self::EntryNotFound(id),
            StoreError::AccountNotFound(id) => Self::AccountNotFound(id),
            StoreError::DuplicateAccountCode(code) => Self::DuplicateAccountCode(code),
            StoreError::ClosingConflict(msg) => Self::ClosingConflict(msg),
            StoreError::Backend(msg) => Self::Storage(msg),
        }
    }
}

/// Aggregated posted lines of one account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineTotals {
    /// Sum of debit amounts.
    pub debit: Decimal,
    /// Sum of credit amounts.
    pub credit: Decimal,
    /// Number of posted lines.
    pub line_count: u64,
}

impl LineTotals {
    /// Adds one line.
    pub fn add_line(&mut self, debit: Decimal, credit: Decimal) {
        self.debit += debit;
        self.credit += credit;
        self.line_count += 1;
    }

    /// Balance on the account's normal side.
    #[must_use]
    pub fn balance(&self, normal_side: Side) -> Decimal {
        normal_side.signed(self.debit, self.credit)
    }
}

/// Side effect committed together with an entry.
#[derive(Debug, Clone)]
pub enum CommitEffect {
    /// Plain posting.
    None,
    /// Marks the given `POSTED` entry as `REVERSED` by the new entry.
    Reverses(JournalEntryId),
    /// Records the period as closed; the entry is its closing entry.
    ClosesPeriod(AccountingPeriod),
}

/// Everything written by one atomic commit.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    /// Entry header with status `POSTED`.
    pub entry: JournalEntry,
    /// Entry lines.
    pub lines: Vec<JournalLine>,
    /// Side effect.
    pub effect: CommitEffect,
}

/// Persistence operations needed by the ledger.
///
/// "Posted lines" means the lines of entries whose status is `POSTED` or
/// `REVERSED`.
pub trait LedgerStore: Send + Sync + 'static {
    /// Lists every account.
    fn list_accounts(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Account>, StoreError>> + Send;

    /// Inserts an account. Fails with `DuplicateAccountCode` if the code exists.
    fn insert_account(
        &self,
        account: Account,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Sets the active flag and returns the updated account.
    fn set_account_active(
        &self,
        account_id: AccountId,
        is_active: bool,
    ) -> impl std::future::Future<Output = Result<Account, StoreError>> + Send;

    /// Finds an entry with its lines.
    fn find_entry(
        &self,
        entry_id: JournalEntryId,
    ) -> impl std::future::Future<Output = Result<Option<PostedEntry>, StoreError>> + Send;

    /// Finds the entry recorded for a source.
    fn find_entry_by_source(
        &self,
        source: &SourceRef,
    ) -> impl std::future::Future<Output = Result<Option<PostedEntry>, StoreError>> + Send;

    /// Atomically writes an entry, its lines and the requested effect.
    ///
    /// Must re-check, inside the same commit, that the source is new
    /// (`DuplicateSource`), that the entry date is after the latest closed
    /// period (`PeriodClosed`), that a reversed entry is still `POSTED`
    /// (`AlreadyReversed`), and that a closing period ends after the latest
    /// closed one (`ClosingConflict`).
    fn commit_entry(
        &self,
        request: CommitRequest,
    ) -> impl std::future::Future<Output = Result<PostedEntry, StoreError>> + Send;

    /// Records a closed period that needed no closing entry.
    fn record_closed_period(
        &self,
        period: AccountingPeriod,
    ) -> impl std::future::Future<Output = Result<AccountingPeriod, StoreError>> + Send;

    /// Lists closed periods ordered by end date.
    fn list_periods(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<AccountingPeriod>, StoreError>> + Send;

    /// Returns the closed period with the latest end date.
    fn latest_closed_period(
        &self,
    ) -> impl std::future::Future<Output = Result<Option<AccountingPeriod>, StoreError>> + Send;

    /// Date of the earliest posted entry.
    fn earliest_entry_date(
        &self,
    ) -> impl std::future::Future<Output = Result<Option<NaiveDate>, StoreError>> + Send;

    /// Totals of one account's posted lines, optionally only through a date.
    fn account_line_totals(
        &self,
        account_id: AccountId,
        through: Option<NaiveDate>,
    ) -> impl std::future::Future<Output = Result<LineTotals, StoreError>> + Send;

    /// Totals of all posted lines grouped by account.
    fn posted_line_totals(
        &self,
    ) -> impl std::future::Future<Output = Result<HashMap<AccountId, LineTotals>, StoreError>> + Send;

    /// Loads an account's balance snapshot.
    fn load_snapshot(
        &self,
        account_id: AccountId,
    ) -> impl std::future::Future<Output = Result<Option<BalanceSnapshot>, StoreError>> + Send;

    /// Lists every balance snapshot.
    fn list_snapshots(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<BalanceSnapshot>, StoreError>> + Send;

    /// Inserts or overwrites a snapshot.
    fn save_snapshot(
        &self,
        snapshot: BalanceSnapshot,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Atomically adds a delta to an existing snapshot and bumps its version.
    ///
    /// Returns `None` without writing if the account has no snapshot yet.
    fn increment_snapshot(
        &self,
        delta: &BalanceDelta,
        normal_side: Side,
        refreshed_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Option<BalanceSnapshot>, StoreError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_line_totals_balance() {
        let mut totals = LineTotals::default();
        totals.add_line(dec!(100), dec!(0));
        totals.add_line(dec!(0), dec!(30));

        assert_eq!(totals.line_count, 2);
        assert_eq!(totals.balance(Side::Debit), dec!(70));
        assert_eq!(totals.balance(Side::Credit), dec!(-70));
    }

    #[test]
    fn test_store_errors_map_to_ledger_errors() {
        let id = JournalEntryId::new();
        assert!(matches!(
            LedgerError::from(StoreError::DuplicateSource { existing: id }),
            LedgerError::DuplicateSource { existing } if existing == id
        ));
        assert!(matches!(
            LedgerError::from(StoreError::Backend("boom".into())),
            LedgerError::Storage(msg) if msg == "boom"
        ));
    }
}
