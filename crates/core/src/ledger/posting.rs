//! Posting engine: validates and commits journal entries.
//!
//! Flow of `post`:
//! 0. Reversal and closing sources are rejected; only `reverse` and the
//!    closing engine write them
//! 1. Replay check on the source (retries succeed even if the draft would no
//!    longer validate)
//! 2. Draft validation against the chart and the closed-period rule
//! 3. Account locks in ascending id order
//! 4. Atomic commit through the store
//! 5. Balance projection per touched account; failures become warnings

use std::sync::Arc;

use chrono::Utc;
use tally_shared::types::{Currency, JournalEntryId, JournalLineId};
use tracing::{info, warn};

use super::error::LedgerError;
use super::fiscal::ensure_period_open;
use super::reversal::build_reversal;
use super::types::{
    DraftTotals, EntryStatus, JournalDraft, JournalEntry, JournalLine, PostedEntry,
    PostingOutcome, ReverseRequest,
};
use super::validation::{AccountInfo, ValidationRules, validate_draft};
use crate::account::AccountDirectory;
use crate::balance::{AccountLockGuard, AccountLocks, BalanceProjector, compute_deltas};
use crate::store::{CommitEffect, CommitRequest, LedgerStore, StoreError};

/// Commits balanced journal entries and keeps the balance cache in step.
pub struct PostingEngine<S> {
    store: Arc<S>,
    directory: Arc<AccountDirectory<S>>,
    projector: Arc<BalanceProjector<S>>,
    locks: Arc<AccountLocks>,
    currency: Currency,
}

impl<S: LedgerStore> PostingEngine<S> {
    /// Creates a posting engine.
    pub fn new(
        store: Arc<S>,
        directory: Arc<AccountDirectory<S>>,
        projector: Arc<BalanceProjector<S>>,
        locks: Arc<AccountLocks>,
        currency: Currency,
    ) -> Self {
        Self {
            store,
            directory,
            projector,
            locks,
            currency,
        }
    }

    /// Posts a draft.
    ///
    /// Resubmitting an already-posted source returns the existing entry with
    /// `replayed = true` and writes nothing.
    pub async fn post(&self, draft: JournalDraft) -> Result<PostingOutcome, LedgerError> {
        if draft.source.kind.is_system() {
            return Err(LedgerError::ReservedSourceKind(draft.source.kind));
        }
        if let Some(existing) = self.store.find_entry_by_source(&draft.source).await? {
            info!(
                entry_id = %existing.entry.id,
                source = %draft.source,
                "Replaying already posted source"
            );
            return Ok(PostingOutcome::replayed(existing));
        }

        let totals = self.validate(&draft, false).await?;
        let guard = self
            .locks
            .acquire(draft.lines.iter().map(|l| l.account_id))
            .await;
        self.commit_locked(JournalEntryId::new(), draft, totals, CommitEffect::None, &guard)
            .await
    }

    /// Reverses a posted entry with a new entry that swaps every line's side.
    ///
    /// Reversing an entry that is already reversed replays the existing reversal.
    pub async fn reverse(
        &self,
        entry_id: JournalEntryId,
        request: ReverseRequest,
    ) -> Result<PostingOutcome, LedgerError> {
        let original = self
            .store
            .find_entry(entry_id)
            .await?
            .ok_or(LedgerError::EntryNotFound(entry_id))?;

        if original.entry.status == EntryStatus::Reversed {
            if let Some(reversal_id) = original.entry.reversed_by {
                if let Some(existing) = self.store.find_entry(reversal_id).await? {
                    return Ok(PostingOutcome::replayed(existing));
                }
            }
        }

        let draft = build_reversal(&original, &request)?;
        if let Some(existing) = self.store.find_entry_by_source(&draft.source).await? {
            return Ok(PostingOutcome::replayed(existing));
        }

        let totals = self.validate(&draft, false).await?;
        let guard = self
            .locks
            .acquire(draft.lines.iter().map(|l| l.account_id))
            .await;
        let outcome = self
            .commit_locked(
                JournalEntryId::new(),
                draft,
                totals,
                CommitEffect::Reverses(entry_id),
                &guard,
            )
            .await?;

        info!(
            original_id = %entry_id,
            reversal_id = %outcome.entry.entry.id,
            "Journal entry reversed"
        );
        Ok(outcome)
    }

    /// Runs every pre-write check: draft rules and the closed-period rule.
    ///
    /// `allow_inactive_accounts` is set only by the closing engine, which must
    /// zero deactivated revenue and expense accounts too.
    pub(crate) async fn validate(
        &self,
        draft: &JournalDraft,
        allow_inactive_accounts: bool,
    ) -> Result<DraftTotals, LedgerError> {
        let chart = self.directory.chart().await?;
        let rules = ValidationRules {
            currency: self.currency,
            allow_inactive_accounts,
        };
        let totals = validate_draft(draft, rules, |id| chart.get(id).map(AccountInfo::from))?;

        let closed = self.store.latest_closed_period().await?;
        ensure_period_open(draft.entry_date, closed.map(|p| p.end_date))?;
        Ok(totals)
    }

    /// Commits a validated draft while the caller holds the locks of every
    /// account it touches.
    pub(crate) async fn commit_locked(
        &self,
        entry_id: JournalEntryId,
        draft: JournalDraft,
        totals: DraftTotals,
        effect: CommitEffect,
        guard: &AccountLockGuard,
    ) -> Result<PostingOutcome, LedgerError> {
        let reverses = match &effect {
            CommitEffect::Reverses(original) => Some(*original),
            _ => None,
        };
        let (entry, lines) = materialize(entry_id, draft, totals, reverses);
        let source = entry.source.clone();

        let posted = match self
            .store
            .commit_entry(CommitRequest {
                entry,
                lines,
                effect,
            })
            .await
        {
            Ok(posted) => posted,
            Err(StoreError::DuplicateSource { existing }) => {
                // Lost a race with a concurrent submission of the same source.
                let existing = self
                    .store
                    .find_entry(existing)
                    .await?
                    .ok_or(LedgerError::EntryNotFound(existing))?;
                info!(entry_id = %existing.entry.id, source = %source, "Replaying concurrent posting");
                return Ok(PostingOutcome::replayed(existing));
            }
            Err(e) => return Err(e.into()),
        };

        let warnings = self.project(&posted, guard).await;
        info!(
            entry_id = %posted.entry.id,
            source = %posted.entry.source,
            entry_date = %posted.entry.entry_date,
            total = %posted.entry.total_debit,
            lines = posted.lines.len(),
            "Journal entry posted"
        );

        Ok(PostingOutcome {
            entry: posted,
            replayed: false,
            warnings,
        })
    }

    /// Applies the entry's deltas; a failed cache write never fails the posting.
    async fn project(&self, posted: &PostedEntry, guard: &AccountLockGuard) -> Vec<String> {
        let mut warnings = Vec::new();
        for delta in compute_deltas(&posted.lines) {
            if let Err(e) = self.projector.apply_delta_held(&delta, guard).await {
                warn!(
                    entry_id = %posted.entry.id,
                    account_id = %delta.account_id,
                    error = %e,
                    "Balance cache update failed; left for the reconciler"
                );
                warnings.push(format!(
                    "balance cache for account {} not updated: {e}",
                    delta.account_id
                ));
            }
        }
        warnings
    }
}

fn materialize(
    entry_id: JournalEntryId,
    draft: JournalDraft,
    totals: DraftTotals,
    reverses: Option<JournalEntryId>,
) -> (JournalEntry, Vec<JournalLine>) {
    let lines = draft
        .lines
        .into_iter()
        .zip(1..)
        .map(|(line, line_number)| JournalLine {
            id: JournalLineId::new(),
            entry_id,
            account_id: line.account_id,
            debit_amount: line.debit_amount(),
            credit_amount: line.credit_amount(),
            line_number,
            description: line.description,
        })
        .collect();

    let entry = JournalEntry {
        id: entry_id,
        entry_date: draft.entry_date,
        description: draft.description,
        reference: draft.reference,
        source: draft.source,
        status: EntryStatus::Posted,
        total_debit: totals.debit,
        total_credit: totals.credit,
        reverses,
        reversed_by: None,
        posted_at: Some(Utc::now()),
    };

    (entry, lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::STANDARD_CHART;
    use crate::ledger::types::{DraftLine, SourceKind, SourceRef};
    use crate::store::MemoryLedgerStore;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use tally_shared::types::AccountId;

    struct Fixture {
        store: Arc<MemoryLedgerStore>,
        directory: Arc<AccountDirectory<MemoryLedgerStore>>,
        engine: PostingEngine<MemoryLedgerStore>,
    }

    impl Fixture {
        async fn new() -> Self {
            let store = Arc::new(MemoryLedgerStore::new());
            let directory = Arc::new(AccountDirectory::new(Arc::clone(&store)));
            directory.seed(STANDARD_CHART).await.unwrap();
            let locks = Arc::new(AccountLocks::new());
            let projector = Arc::new(BalanceProjector::new(
                Arc::clone(&store),
                Arc::clone(&directory),
                Arc::clone(&locks),
            ));
            let engine = PostingEngine::new(
                Arc::clone(&store),
                Arc::clone(&directory),
                projector,
                locks,
                Currency::Idr,
            );
            Self {
                store,
                directory,
                engine,
            }
        }

        async fn id(&self, code: &str) -> AccountId {
            self.directory.chart().await.unwrap().by_code(code).unwrap().id
        }
    }

    fn draft(source: &str, debit: AccountId, credit: AccountId) -> JournalDraft {
        JournalDraft {
            entry_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            description: "Cash sale".to_string(),
            reference: Some(source.to_string()),
            source: SourceRef::new(SourceKind::Sale, source),
            lines: vec![
                DraftLine::debit(debit, dec!(250000)),
                DraftLine::credit(credit, dec!(250000)),
            ],
        }
    }

    #[tokio::test]
    async fn test_post_numbers_lines_and_totals() {
        let f = Fixture::new().await;
        let outcome = f
            .engine
            .post(draft("INV-1", f.id("1101").await, f.id("4101").await))
            .await
            .unwrap();

        assert!(!outcome.replayed);
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.entry.entry.status, EntryStatus::Posted);
        assert_eq!(outcome.entry.entry.total_debit, dec!(250000));
        assert_eq!(outcome.entry.entry.total_credit, dec!(250000));
        let numbers: Vec<i32> = outcome.entry.lines.iter().map(|l| l.line_number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_header_posting_rejected_without_writes() {
        let f = Fixture::new().await;
        let result = f
            .engine
            .post(draft("INV-2", f.id("1100").await, f.id("4101").await))
            .await;

        assert!(matches!(result, Err(LedgerError::HeaderAccount(_))));
        assert_eq!(f.store.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_commit_failure_leaves_nothing() {
        let f = Fixture::new().await;
        f.store.fail_commits(true);

        let result = f
            .engine
            .post(draft("INV-3", f.id("1101").await, f.id("4101").await))
            .await;
        assert!(matches!(result, Err(LedgerError::Storage(_))));
        assert_eq!(f.store.entry_count(), 0);
        assert!(f.store.list_snapshots().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_system_source_kinds_rejected() {
        let f = Fixture::new().await;
        let cash = f.id("1101").await;
        let sales = f.id("4101").await;
        let original = f.engine.post(draft("INV-4", cash, sales)).await.unwrap();

        let mut reversal = draft("unused", sales, cash);
        reversal.source = SourceRef::new(SourceKind::Reversal, original.entry.entry.id.to_string());
        assert!(matches!(
            f.engine.post(reversal).await,
            Err(LedgerError::ReservedSourceKind(SourceKind::Reversal))
        ));

        let mut closing = draft("unused", cash, sales);
        closing.source = SourceRef::new(SourceKind::Closing, "2024-03-31");
        assert!(matches!(
            f.engine.post(closing).await,
            Err(LedgerError::ReservedSourceKind(SourceKind::Closing))
        ));
        assert_eq!(f.store.entry_count(), 1);

        let reversed = f
            .engine
            .reverse(original.entry.entry.id, ReverseRequest::default())
            .await
            .unwrap();
        assert!(!reversed.replayed);
        let stored = f.store.find_entry(original.entry.entry.id).await.unwrap().unwrap();
        assert_eq!(stored.entry.status, EntryStatus::Reversed);
    }

    #[tokio::test]
    async fn test_inactive_account_rejected_for_posting() {
        let f = Fixture::new().await;
        let cash = f.id("1101").await;
        let other_income = f.id("4201").await;
        f.directory.deactivate(other_income).await.unwrap();

        let result = f.engine.post(draft("INV-5", cash, other_income)).await;
        assert!(matches!(result, Err(LedgerError::AccountInactive(id)) if id == other_income));
        assert_eq!(f.store.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_reverse_unknown_entry() {
        let f = Fixture::new().await;
        let missing = JournalEntryId::new();
        assert!(matches!(
            f.engine.reverse(missing, ReverseRequest::default()).await,
            Err(LedgerError::EntryNotFound(id)) if id == missing
        ));
    }
}
