//! In-memory ledger store.
//!
//! Every operation takes one lock over the whole state, which gives the same
//! atomicity as a database transaction. Faults can be switched on to exercise
//! the error paths of the engines.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, NaiveDate, Utc};
use tally_shared::types::{AccountId, JournalEntryId};

use super::{CommitEffect, CommitRequest, LedgerStore, LineTotals, StoreError};
use crate::account::{Account, Side};
use crate::balance::{BalanceDelta, BalanceSnapshot};
use crate::closing::AccountingPeriod;
use crate::ledger::types::{EntryStatus, JournalEntry, JournalLine, PostedEntry, SourceRef};

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<AccountId, Account>,
    entries: HashMap<JournalEntryId, JournalEntry>,
    lines: HashMap<JournalEntryId, Vec<JournalLine>>,
    sources: HashMap<SourceRef, JournalEntryId>,
    periods: Vec<AccountingPeriod>,
    snapshots: HashMap<AccountId, BalanceSnapshot>,
}

impl MemoryState {
    fn closed_through(&self) -> Option<NaiveDate> {
        self.periods.iter().map(|p| p.end_date).max()
    }

    fn posted(&self, entry_id: JournalEntryId) -> Option<PostedEntry> {
        let entry = self.entries.get(&entry_id)?.clone();
        let lines = self.lines.get(&entry_id).cloned().unwrap_or_default();
        Some(PostedEntry { entry, lines })
    }

    fn check_close_order(&self, period: &AccountingPeriod) -> Result<(), StoreError> {
        match self.closed_through() {
            Some(end) if period.end_date <= end => Err(StoreError::ClosingConflict(format!(
                "period ending {} is not after the latest closed period ending {end}",
                period.end_date
            ))),
            _ => Ok(()),
        }
    }

    fn counted_lines(&self) -> impl Iterator<Item = (&JournalEntry, &JournalLine)> {
        self.entries
            .values()
            .filter(|e| e.status.counts_in_balances())
            .flat_map(move |e| {
                self.lines
                    .get(&e.id)
                    .into_iter()
                    .flatten()
                    .map(move |l| (e, l))
            })
    }
}

/// Ledger store kept entirely in memory.
#[derive(Default)]
pub struct MemoryLedgerStore {
    state: RwLock<MemoryState>,
    fail_snapshot_writes: AtomicBool,
    fail_commits: AtomicBool,
}

impl MemoryLedgerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every snapshot write fail with a backend error.
    pub fn fail_snapshot_writes(&self, fail: bool) {
        self.fail_snapshot_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes every entry commit fail with a backend error.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of stored entries, whatever their status.
    pub fn entry_count(&self) -> usize {
        self.read().map(|s| s.entries.len()).unwrap_or_default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }

    fn check_snapshot_fault(&self) -> Result<(), StoreError> {
        if self.fail_snapshot_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("snapshot write failed".to_string()));
        }
        Ok(())
    }
}

impl LedgerStore for MemoryLedgerStore {
    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        Ok(self.read()?.accounts.values().cloned().collect())
    }

    async fn insert_account(&self, account: Account) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.accounts.values().any(|a| a.code == account.code) {
            return Err(StoreError::DuplicateAccountCode(account.code));
        }
        state.accounts.insert(account.id, account);
        Ok(())
    }

    async fn set_account_active(
        &self,
        account_id: AccountId,
        is_active: bool,
    ) -> Result<Account, StoreError> {
        let mut state = self.write()?;
        let account = state
            .accounts
            .get_mut(&account_id)
            .ok_or(StoreError::AccountNotFound(account_id))?;
        account.is_active = is_active;
        Ok(account.clone())
    }

    async fn find_entry(
        &self,
        entry_id: JournalEntryId,
    ) -> Result<Option<PostedEntry>, StoreError> {
        Ok(self.read()?.posted(entry_id))
    }

    async fn find_entry_by_source(
        &self,
        source: &SourceRef,
    ) -> Result<Option<PostedEntry>, StoreError> {
        let state = self.read()?;
        Ok(state.sources.get(source).and_then(|id| state.posted(*id)))
    }

    async fn commit_entry(&self, request: CommitRequest) -> Result<PostedEntry, StoreError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("commit failed".to_string()));
        }

        let mut state = self.write()?;
        let CommitRequest {
            entry,
            lines,
            effect,
        } = request;

        // All checks before the first mutation.
        if let Some(existing) = state.sources.get(&entry.source) {
            return Err(StoreError::DuplicateSource {
                existing: *existing,
            });
        }
        if let Some(closed_through) = state.closed_through() {
            if entry.entry_date <= closed_through {
                return Err(StoreError::PeriodClosed {
                    date: entry.entry_date,
                    closed_through,
                });
            }
        }
        match &effect {
            CommitEffect::None => {}
            CommitEffect::Reverses(original_id) => {
                let original = state
                    .entries
                    .get(original_id)
                    .ok_or(StoreError::EntryNotFound(*original_id))?;
                if original.status != EntryStatus::Posted {
                    return Err(StoreError::AlreadyReversed(*original_id));
                }
            }
            CommitEffect::ClosesPeriod(period) => state.check_close_order(period)?,
        }

        match effect {
            CommitEffect::None => {}
            CommitEffect::Reverses(original_id) => {
                if let Some(original) = state.entries.get_mut(&original_id) {
                    original.status = EntryStatus::Reversed;
                    original.reversed_by = Some(entry.id);
                }
            }
            CommitEffect::ClosesPeriod(period) => state.periods.push(period),
        }

        let posted = PostedEntry {
            entry: entry.clone(),
            lines: lines.clone(),
        };
        state.sources.insert(entry.source.clone(), entry.id);
        state.lines.insert(entry.id, lines);
        state.entries.insert(entry.id, entry);
        Ok(posted)
    }

    async fn record_closed_period(
        &self,
        period: AccountingPeriod,
    ) -> Result<AccountingPeriod, StoreError> {
        let mut state = self.write()?;
        state.check_close_order(&period)?;
        state.periods.push(period.clone());
        Ok(period)
    }

    async fn list_periods(&self) -> Result<Vec<AccountingPeriod>, StoreError> {
        let mut periods = self.read()?.periods.clone();
        periods.sort_by_key(|p| p.end_date);
        Ok(periods)
    }

    async fn latest_closed_period(&self) -> Result<Option<AccountingPeriod>, StoreError> {
        Ok(self
            .read()?
            .periods
            .iter()
            .max_by_key(|p| p.end_date)
            .cloned())
    }

    async fn earliest_entry_date(&self) -> Result<Option<NaiveDate>, StoreError> {
        Ok(self
            .read()?
            .entries
            .values()
            .filter(|e| e.status.counts_in_balances())
            .map(|e| e.entry_date)
            .min())
    }

    async fn account_line_totals(
        &self,
        account_id: AccountId,
        through: Option<NaiveDate>,
    ) -> Result<LineTotals, StoreError> {
        let state = self.read()?;
        let mut totals = LineTotals::default();
        for (entry, line) in state.counted_lines() {
            if line.account_id == account_id && through.is_none_or(|d| entry.entry_date <= d) {
                totals.add_line(line.debit_amount, line.credit_amount);
            }
        }
        Ok(totals)
    }

    async fn posted_line_totals(&self) -> Result<HashMap<AccountId, LineTotals>, StoreError> {
        let state = self.read()?;
        let mut totals: HashMap<AccountId, LineTotals> = HashMap::new();
        for (_, line) in state.counted_lines() {
            totals
                .entry(line.account_id)
                .or_default()
                .add_line(line.debit_amount, line.credit_amount);
        }
        Ok(totals)
    }

    async fn load_snapshot(
        &self,
        account_id: AccountId,
    ) -> Result<Option<BalanceSnapshot>, StoreError> {
        Ok(self.read()?.snapshots.get(&account_id).cloned())
    }

    async fn list_snapshots(&self) -> Result<Vec<BalanceSnapshot>, StoreError> {
        Ok(self.read()?.snapshots.values().cloned().collect())
    }

    async fn save_snapshot(&self, snapshot: BalanceSnapshot) -> Result<(), StoreError> {
        self.check_snapshot_fault()?;
        self.write()?.snapshots.insert(snapshot.account_id, snapshot);
        Ok(())
    }

    async fn increment_snapshot(
        &self,
        delta: &BalanceDelta,
        normal_side: Side,
        refreshed_at: DateTime<Utc>,
    ) -> Result<Option<BalanceSnapshot>, StoreError> {
        self.check_snapshot_fault()?;
        let mut state = self.write()?;
        Ok(state.snapshots.get_mut(&delta.account_id).map(|snapshot| {
            snapshot.apply(delta, normal_side, refreshed_at);
            snapshot.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountType;
    use crate::closing::PeriodStatus;
    use crate::ledger::types::SourceKind;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tally_shared::types::JournalLineId;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn request(source: &str, entry_date: NaiveDate, a: AccountId, b: AccountId) -> CommitRequest {
        let id = JournalEntryId::new();
        let line = |account_id, debit: Decimal, credit: Decimal, n| JournalLine {
            id: JournalLineId::new(),
            entry_id: id,
            account_id,
            debit_amount: debit,
            credit_amount: credit,
            line_number: n,
            description: None,
        };
        CommitRequest {
            entry: JournalEntry {
                id,
                entry_date,
                description: "test".to_string(),
                reference: None,
                source: SourceRef::new(SourceKind::Manual, source),
                status: EntryStatus::Posted,
                total_debit: dec!(10),
                total_credit: dec!(10),
                reverses: None,
                reversed_by: None,
                posted_at: Some(Utc::now()),
            },
            lines: vec![line(a, dec!(10), dec!(0), 1), line(b, dec!(0), dec!(10), 2)],
            effect: CommitEffect::None,
        }
    }

    fn closed_period(end: NaiveDate) -> AccountingPeriod {
        let mut period = AccountingPeriod::open(date(2024, 1, 1), end, None);
        period.status = PeriodStatus::Closed;
        period
    }

    #[tokio::test]
    async fn test_duplicate_source_rejected() {
        let store = MemoryLedgerStore::new();
        let (a, b) = (AccountId::new(), AccountId::new());
        let first = store
            .commit_entry(request("JV-1", date(2024, 1, 5), a, b))
            .await
            .unwrap();

        let err = store
            .commit_entry(request("JV-1", date(2024, 1, 5), a, b))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateSource { existing } if existing == first.entry.id));
        assert_eq!(store.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_closed_period_rejected_at_commit() {
        let store = MemoryLedgerStore::new();
        store
            .record_closed_period(closed_period(date(2024, 1, 31)))
            .await
            .unwrap();

        let err = store
            .commit_entry(request("JV-2", date(2024, 1, 31), AccountId::new(), AccountId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PeriodClosed { .. }));
    }

    #[tokio::test]
    async fn test_reversal_effect_marks_original() {
        let store = MemoryLedgerStore::new();
        let (a, b) = (AccountId::new(), AccountId::new());
        let original = store
            .commit_entry(request("JV-3", date(2024, 2, 1), a, b))
            .await
            .unwrap();

        let mut reversal = request("REV-3", date(2024, 2, 1), b, a);
        reversal.effect = CommitEffect::Reverses(original.entry.id);
        let reversal = store.commit_entry(reversal).await.unwrap();

        let original = store.find_entry(original.entry.id).await.unwrap().unwrap();
        assert_eq!(original.entry.status, EntryStatus::Reversed);
        assert_eq!(original.entry.reversed_by, Some(reversal.entry.id));

        let totals = store.account_line_totals(a, None).await.unwrap();
        assert_eq!(totals.line_count, 2);
        assert_eq!(totals.balance(AccountType::Asset.normal_side()), dec!(0));
    }

    #[tokio::test]
    async fn test_close_order_enforced() {
        let store = MemoryLedgerStore::new();
        store
            .record_closed_period(closed_period(date(2024, 2, 29)))
            .await
            .unwrap();

        let err = store
            .record_closed_period(closed_period(date(2024, 1, 31)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ClosingConflict(_)));
    }

    #[tokio::test]
    async fn test_line_totals_through_date() {
        let store = MemoryLedgerStore::new();
        let (a, b) = (AccountId::new(), AccountId::new());
        store
            .commit_entry(request("JV-4", date(2024, 1, 10), a, b))
            .await
            .unwrap();
        store
            .commit_entry(request("JV-5", date(2024, 2, 10), a, b))
            .await
            .unwrap();

        let through_jan = store
            .account_line_totals(a, Some(date(2024, 1, 31)))
            .await
            .unwrap();
        assert_eq!(through_jan.debit, dec!(10));

        let all = store.posted_line_totals().await.unwrap();
        assert_eq!(all[&a].debit, dec!(20));
        assert_eq!(all[&b].credit, dec!(20));
        assert_eq!(store.earliest_entry_date().await.unwrap(), Some(date(2024, 1, 10)));
    }

    #[tokio::test]
    async fn test_increment_without_snapshot_returns_none() {
        let store = MemoryLedgerStore::new();
        let delta = BalanceDelta {
            account_id: AccountId::new(),
            debit: dec!(5),
            credit: dec!(0),
            line_count: 1,
        };
        let result = store
            .increment_snapshot(&delta, Side::Debit, Utc::now())
            .await
            .unwrap();
        assert!(result.is_none());

        store.fail_snapshot_writes(true);
        assert!(
            store
                .increment_snapshot(&delta, Side::Debit, Utc::now())
                .await
                .is_err()
        );
    }
}
