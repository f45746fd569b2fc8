//! Period closing engine.
//!
//! A close runs behind a process-wide gate and holds the locks of every
//! temporary account and of retained earnings from the balance computation
//! through the commit. The closing entry and the closed period row are
//! written by a single store commit.

use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::{AccountId, JournalEntryId};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::period::{
    AccountingPeriod, LastClosing, PeriodDateInfo, PeriodStatus, check_close_order,
};
use super::plan::{ClosingLine, ClosingPlan, TemporaryBalance};
use crate::account::{Account, AccountDirectory, AccountType, ChartOfAccounts};
use crate::balance::{AccountLockGuard, AccountLocks, BalanceProjector};
use crate::equation::AccountingEquation;
use crate::ledger::types::PostedEntry;
use crate::ledger::{LedgerError, PostingEngine};
use crate::store::{CommitEffect, LedgerStore};

/// Request to close a period.
#[derive(Debug, Clone, Deserialize)]
pub struct ClosePeriodRequest {
    /// Last day of the period.
    pub period_end: NaiveDate,
    /// First day; defaults to the day after the previous close.
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
}

impl ClosePeriodRequest {
    /// Closes through the given date with defaults for everything else.
    #[must_use]
    pub fn through(period_end: NaiveDate) -> Self {
        Self {
            period_end,
            start_date: None,
            description: None,
        }
    }
}

/// Outcome of a successful close.
#[derive(Debug, Clone, Serialize)]
pub struct ClosingResult {
    /// The closed period.
    pub period: AccountingPeriod,
    /// The closing entry; absent when nothing needed zeroing.
    pub closing_entry: Option<PostedEntry>,
    /// Revenue closed out.
    pub total_revenue: Decimal,
    /// Expense closed out.
    pub total_expense: Decimal,
    /// Revenue minus expense.
    pub net_income: Decimal,
    /// Post-close check failures and cache update failures.
    pub warnings: Vec<String>,
}

/// What a close would do, computed without writing.
#[derive(Debug, Clone, Serialize)]
pub struct ClosingPreview {
    /// First day of the period.
    pub period_start: Option<NaiveDate>,
    /// Last day of the period.
    pub period_end: NaiveDate,
    /// Sum of revenue balances.
    pub total_revenue: Decimal,
    /// Sum of expense balances.
    pub total_expense: Decimal,
    /// Revenue minus expense.
    pub net_income: Decimal,
    /// Lines of the closing entry.
    pub lines: Vec<ClosingLine>,
    /// Whether `close_period` would be accepted now.
    pub can_close: bool,
    /// Why a close would be rejected.
    pub blocked_reason: Option<String>,
}

/// Closes accounting periods into retained earnings.
pub struct ClosingEngine<S> {
    store: Arc<S>,
    directory: Arc<AccountDirectory<S>>,
    projector: Arc<BalanceProjector<S>>,
    posting: Arc<PostingEngine<S>>,
    locks: Arc<AccountLocks>,
    gate: Mutex<()>,
    retained_earnings_code: String,
}

impl<S: LedgerStore> ClosingEngine<S> {
    /// Creates a closing engine.
    pub fn new(
        store: Arc<S>,
        directory: Arc<AccountDirectory<S>>,
        projector: Arc<BalanceProjector<S>>,
        posting: Arc<PostingEngine<S>>,
        locks: Arc<AccountLocks>,
        retained_earnings_code: impl Into<String>,
    ) -> Self {
        Self {
            store,
            directory,
            projector,
            posting,
            locks,
            gate: Mutex::new(()),
            retained_earnings_code: retained_earnings_code.into(),
        }
    }

    /// Closes the period ending on `period_end`.
    ///
    /// # Errors
    ///
    /// - `ClosingConflict` for a duplicate, out-of-order or concurrent close
    /// - `RetainedEarnings` if the configured account is unusable
    /// - `InvalidPeriodRange` if the start date is after the end date
    /// - Posting validation and storage errors; the period stays open
    pub async fn close_period(
        &self,
        request: ClosePeriodRequest,
    ) -> Result<ClosingResult, LedgerError> {
        let Ok(_gate) = self.gate.try_lock() else {
            return Err(LedgerError::ClosingConflict(
                "another period close is in progress".to_string(),
            ));
        };

        let latest = self.store.latest_closed_period().await?;
        check_close_order(request.period_end, latest.as_ref())?;
        let start_date = self
            .resolve_start(&request, latest.as_ref())
            .await?;

        let chart = self.directory.chart().await?;
        let retained = self.retained_earnings(&chart)?;
        let temporary = temporary_accounts(&chart);

        let guard = self
            .locks
            .acquire(
                temporary
                    .iter()
                    .map(|(id, _)| *id)
                    .chain(std::iter::once(retained.id)),
            )
            .await;

        let balances = self
            .temporary_balances(&temporary, request.period_end)
            .await?;
        let plan = ClosingPlan::build(&balances, retained.id);

        let mut period = AccountingPeriod::open(
            start_date,
            request.period_end,
            request.description.clone(),
        );
        period.transition(PeriodStatus::Closing)?;

        let committed = self.commit_close(&period, &plan, &guard).await;
        let (closed, closing_entry, mut warnings) = match committed {
            Ok(done) => done,
            Err(e) => {
                period.transition(PeriodStatus::Open)?;
                warn!(
                    period_end = %request.period_end,
                    error = %e,
                    "Period close failed; period left open"
                );
                return Err(e);
            }
        };

        warnings.extend(self.post_close_checks(&temporary, request.period_end).await);
        drop(guard);

        info!(
            period_id = %closed.id,
            start_date = %closed.start_date,
            end_date = %closed.end_date,
            net_income = %closed.net_income,
            closing_entry_id = ?closed.closing_entry_id,
            "Accounting period closed"
        );

        Ok(ClosingResult {
            total_revenue: plan.total_revenue,
            total_expense: plan.total_expense,
            net_income: plan.net_income,
            period: closed,
            closing_entry,
            warnings,
        })
    }

    /// Computes what closing through `period_end` would post, without writing.
    pub async fn preview(&self, period_end: NaiveDate) -> Result<ClosingPreview, LedgerError> {
        let latest = self.store.latest_closed_period().await?;
        let chart = self.directory.chart().await?;
        let temporary = temporary_accounts(&chart);
        let balances = self.temporary_balances(&temporary, period_end).await?;

        let mut blocked_reason = check_close_order(period_end, latest.as_ref())
            .err()
            .map(|e| e.to_string());
        let retained_id = match self.retained_earnings(&chart) {
            Ok(account) => account.id,
            Err(e) => {
                blocked_reason.get_or_insert_with(|| e.to_string());
                AccountId::default()
            }
        };
        let plan = ClosingPlan::build(&balances, retained_id);

        let request = ClosePeriodRequest::through(period_end);
        let period_start = match self.resolve_start(&request, latest.as_ref()).await {
            Ok(start) => Some(start),
            Err(e) => {
                blocked_reason.get_or_insert_with(|| e.to_string());
                None
            }
        };

        Ok(ClosingPreview {
            period_start,
            period_end,
            total_revenue: plan.total_revenue,
            total_expense: plan.total_expense,
            net_income: plan.net_income,
            lines: plan.lines,
            can_close: blocked_reason.is_none(),
            blocked_reason,
        })
    }

    /// Summary of the latest close.
    pub async fn last_closing(&self) -> Result<LastClosing, LedgerError> {
        let latest = self.store.latest_closed_period().await?;
        Ok(LastClosing::from_latest(latest.as_ref()))
    }

    /// Closed periods ordered by end date.
    pub async fn list_periods(&self) -> Result<Vec<AccountingPeriod>, LedgerError> {
        Ok(self.store.list_periods().await?)
    }

    /// Whether postings on `date` are still accepted, and which closed period
    /// covers it.
    pub async fn period_for_date(&self, date: NaiveDate) -> Result<PeriodDateInfo, LedgerError> {
        let periods = self.store.list_periods().await?;
        Ok(PeriodDateInfo::for_date(date, &periods))
    }

    async fn resolve_start(
        &self,
        request: &ClosePeriodRequest,
        latest: Option<&AccountingPeriod>,
    ) -> Result<NaiveDate, LedgerError> {
        let start = match (request.start_date, latest) {
            (Some(start), _) => start,
            (None, Some(latest)) => latest
                .end_date
                .checked_add_days(Days::new(1))
                .unwrap_or(request.period_end),
            (None, None) => self
                .store
                .earliest_entry_date()
                .await?
                .map_or(request.period_end, |d| d.min(request.period_end)),
        };

        if let Some(latest) = latest {
            if start <= latest.end_date {
                return Err(LedgerError::ClosingConflict(format!(
                    "period start {start} overlaps the period closed through {}",
                    latest.end_date
                )));
            }
        }
        if start > request.period_end {
            return Err(LedgerError::InvalidPeriodRange {
                start,
                end: request.period_end,
            });
        }
        Ok(start)
    }

    fn retained_earnings<'a>(&self, chart: &'a ChartOfAccounts) -> Result<&'a Account, LedgerError> {
        let code = &self.retained_earnings_code;
        let reject = |reason: &str| LedgerError::RetainedEarnings {
            code: code.clone(),
            reason: reason.to_string(),
        };

        let account = chart
            .by_code(code)
            .ok_or_else(|| reject("account does not exist"))?;
        if account.account_type != AccountType::Equity {
            return Err(reject("account is not an equity account"));
        }
        if account.is_header {
            return Err(reject("account is a header"));
        }
        if !account.is_active {
            return Err(reject("account is inactive"));
        }
        Ok(account)
    }

    async fn temporary_balances(
        &self,
        temporary: &[(AccountId, AccountType)],
        through: NaiveDate,
    ) -> Result<Vec<TemporaryBalance>, LedgerError> {
        let mut balances = Vec::with_capacity(temporary.len());
        for (account_id, account_type) in temporary {
            balances.push(TemporaryBalance {
                account_id: *account_id,
                account_type: *account_type,
                balance: self.projector.balance_through(*account_id, through).await?,
            });
        }
        Ok(balances)
    }

    async fn commit_close(
        &self,
        period: &AccountingPeriod,
        plan: &ClosingPlan,
        guard: &AccountLockGuard,
    ) -> Result<(AccountingPeriod, Option<PostedEntry>, Vec<String>), LedgerError> {
        let closed_at = Utc::now();

        if plan.is_empty() {
            let closed = period.closed(plan.total_revenue, plan.total_expense, None, closed_at)?;
            let recorded = self.store.record_closed_period(closed).await?;
            return Ok((recorded, None, Vec::new()));
        }

        let entry_id = JournalEntryId::new();
        let closed = period.closed(
            plan.total_revenue,
            plan.total_expense,
            Some(entry_id),
            closed_at,
        )?;
        let description = period
            .description
            .clone()
            .unwrap_or_else(|| format!("Closing entry for period ending {}", period.end_date));
        let draft = plan.to_draft(period.end_date, &description);

        let totals = self.posting.validate(&draft, true).await?;
        let outcome = self
            .posting
            .commit_locked(
                entry_id,
                draft,
                totals,
                CommitEffect::ClosesPeriod(closed.clone()),
                guard,
            )
            .await?;
        if outcome.replayed {
            return Err(LedgerError::ClosingConflict(format!(
                "a closing entry for {} already exists",
                period.end_date
            )));
        }

        Ok((closed, Some(outcome.entry), outcome.warnings))
    }

    /// Re-checks the closing invariants; failures are reported, not raised.
    async fn post_close_checks(
        &self,
        temporary: &[(AccountId, AccountType)],
        period_end: NaiveDate,
    ) -> Vec<String> {
        let mut warnings = Vec::new();

        match self.temporary_balances(temporary, period_end).await {
            Ok(balances) => {
                for residual in balances.iter().filter(|b| !b.balance.is_zero()) {
                    error!(
                        account_id = %residual.account_id,
                        balance = %residual.balance,
                        "Temporary account not zero after close"
                    );
                    warnings.push(format!(
                        "account {} has balance {} after close",
                        residual.account_id, residual.balance
                    ));
                }
            }
            Err(e) => warnings.push(format!("post-close balance check failed: {e}")),
        }

        let equation = match (self.directory.chart().await, self.store.posted_line_totals().await) {
            (Ok(chart), Ok(totals)) => AccountingEquation::from_totals(&chart, &totals),
            (Err(e), _) => {
                warnings.push(format!("post-close equation check failed: {e}"));
                return warnings;
            }
            (_, Err(e)) => {
                warnings.push(format!("post-close equation check failed: {e}"));
                return warnings;
            }
        };
        if !equation.holds() {
            error!(
                difference = %equation.difference(),
                unknown_accounts = equation.unknown_accounts,
                "Accounting equation violated after close"
            );
            warnings.push(format!(
                "accounting equation off by {} after close",
                equation.difference()
            ));
        }

        warnings
    }
}

/// Revenue and expense leaves, inactive ones included.
fn temporary_accounts(chart: &ChartOfAccounts) -> Vec<(AccountId, AccountType)> {
    chart
        .leaves_of_types(&[AccountType::Revenue, AccountType::Expense])
        .into_iter()
        .map(|a| (a.id, a.account_type))
        .collect()
}
