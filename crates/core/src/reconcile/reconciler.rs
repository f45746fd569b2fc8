//! Drift detection and repair.
//!
//! A run compares every leaf snapshot with the ledger aggregates. Mismatches
//! are re-checked under the account lock, so a posting that committed its
//! lines but has not yet applied its delta is not reported. Confirmed drift
//! is repaired by a recompute and always raised as an alert.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tally_shared::types::{AccountId, ReconcileRunId};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use super::types::{
    AccountRepair, AlertKind, AlertSeverity, DriftAlert, DriftStatus, ReconcileReport,
    ReconcilerSettings, RunTrigger, TriggerOutcome,
};
use crate::account::{Account, AccountDirectory};
use crate::balance::{AccountLocks, BalanceProjector, BalanceSnapshot, Recomputed, Verification};
use crate::equation::AccountingEquation;
use crate::ledger::LedgerError;
use crate::store::{LedgerStore, LineTotals};

const ALERT_CHANNEL_CAPACITY: usize = 256;

/// Detects and heals balance cache drift.
pub struct Reconciler<S> {
    store: Arc<S>,
    directory: Arc<AccountDirectory<S>>,
    projector: Arc<BalanceProjector<S>>,
    locks: Arc<AccountLocks>,
    settings: ReconcilerSettings,
    flight: tokio::sync::Mutex<()>,
    status: Mutex<DriftStatus>,
    alerts: broadcast::Sender<DriftAlert>,
}

/// Clears the running flag even if the run is cancelled or panics.
struct RunningGuard<'a> {
    status: &'a Mutex<DriftStatus>,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .running = false;
    }
}

impl<S: LedgerStore> Reconciler<S> {
    /// Creates a reconciler.
    pub fn new(
        store: Arc<S>,
        directory: Arc<AccountDirectory<S>>,
        projector: Arc<BalanceProjector<S>>,
        locks: Arc<AccountLocks>,
        settings: ReconcilerSettings,
    ) -> Self {
        let (alerts, _) = broadcast::channel(ALERT_CHANNEL_CAPACITY);
        Self {
            store,
            directory,
            projector,
            locks,
            settings,
            flight: tokio::sync::Mutex::new(()),
            status: Mutex::new(DriftStatus::default()),
            alerts,
        }
    }

    /// Reconciler tuning.
    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    /// Subscribes to alerts raised from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DriftAlert> {
        self.alerts.subscribe()
    }

    /// Current status.
    pub fn status(&self) -> DriftStatus {
        self.lock_status().clone()
    }

    /// Records when the next scheduled run is due.
    pub fn set_next_run(&self, next_run_at: Option<DateTime<Utc>>) {
        self.lock_status().next_run_at = next_run_at;
    }

    /// Records a run that failed outside of [`Reconciler::trigger`].
    pub fn record_failure(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut status = self.lock_status();
        status.failed_runs += 1;
        status.last_run_at = Some(Utc::now());
        status.last_error = Some(reason.clone());
        drop(status);

        self.publish(DriftAlert {
            kind: AlertKind::RunFailed,
            severity: AlertSeverity::High,
            account_id: None,
            cached_balance: None,
            actual_balance: None,
            message: format!("reconciler run failed: {reason}"),
            raised_at: Utc::now(),
        });
    }

    /// Runs once unless a run is already in flight.
    pub async fn trigger(&self, trigger: RunTrigger) -> Result<TriggerOutcome, LedgerError> {
        let Ok(_flight) = self.flight.try_lock() else {
            info!(trigger = ?trigger, "Reconciler already running");
            return Ok(TriggerOutcome::AlreadyRunning(self.status()));
        };
        let _running = self.begin_run();

        match self.run(trigger).await {
            Ok(report) => {
                let mut status = self.lock_status();
                status.successful_runs += 1;
                status.last_run_at = Some(report.finished_at);
                status.last_error = None;
                status.last_report = Some(report.clone());
                drop(status);
                Ok(TriggerOutcome::Completed(Box::new(report)))
            }
            Err(e) => {
                error!(trigger = ?trigger, error = %e, "Reconciler run failed");
                self.record_failure(e.to_string());
                Err(e)
            }
        }
    }

    fn begin_run(&self) -> RunningGuard<'_> {
        let mut status = self.lock_status();
        status.running = true;
        status.total_runs += 1;
        RunningGuard {
            status: &self.status,
        }
    }

    async fn run(&self, trigger: RunTrigger) -> Result<ReconcileReport, LedgerError> {
        let run_id = ReconcileRunId::new();
        let started_at = Utc::now();
        let deadline = Instant::now() + self.settings.max_execution;
        info!(run_id = %run_id, trigger = ?trigger, "Reconciler run started");

        let chart = self.directory.chart().await?;
        let snapshots: HashMap<AccountId, BalanceSnapshot> = self
            .store
            .list_snapshots()
            .await?
            .into_iter()
            .map(|s| (s.account_id, s))
            .collect();
        let totals = self.store.posted_line_totals().await?;

        let mut accounts_checked = 0;
        let mut truncated = false;
        let mut repairs = Vec::new();
        let mut alerts = Vec::new();

        for account in chart.leaves() {
            if Instant::now() >= deadline {
                truncated = true;
                break;
            }
            accounts_checked += 1;

            let ledger = totals.get(&account.id).copied().unwrap_or_default();
            if cheap_match(snapshots.get(&account.id), &ledger, account) {
                continue;
            }

            // Re-check under the lock; an in-flight posting may have caught up.
            let guard = self.locks.acquire([account.id]).await;
            let verification = self.projector.verify_held(account.id, &guard).await?;
            drop(guard);

            if let Verification::Repaired(recomputed) = verification {
                let repair = repair_of(account.id, &recomputed);
                let alert = self.drift_alert(account, &repair);
                self.publish(alert.clone());
                alerts.push(alert);
                repairs.push(repair);
            }
        }

        let equation = AccountingEquation::from_totals(&chart, &totals);
        let equation_holds = equation.holds();
        if !equation_holds {
            error!(
                run_id = %run_id,
                assets = %equation.assets,
                liabilities = %equation.liabilities,
                equity = %equation.equity,
                revenue = %equation.revenue,
                expense = %equation.expense,
                unknown_accounts = equation.unknown_accounts,
                "Accounting equation violated"
            );
            let alert = DriftAlert {
                kind: AlertKind::EquationViolation,
                severity: AlertSeverity::Critical,
                account_id: None,
                cached_balance: None,
                actual_balance: None,
                message: format!(
                    "accounting equation off by {} ({} unknown accounts)",
                    equation.difference(),
                    equation.unknown_accounts
                ),
                raised_at: Utc::now(),
            };
            self.publish(alert.clone());
            alerts.push(alert);
        }

        if truncated {
            warn!(
                run_id = %run_id,
                accounts_checked,
                "Reconciler run truncated by its time budget"
            );
        }

        let report = ReconcileReport {
            run_id,
            trigger,
            started_at,
            finished_at: Utc::now(),
            accounts_checked,
            repairs,
            equation: Some(equation),
            equation_holds,
            truncated,
            alerts,
        };
        info!(
            run_id = %run_id,
            accounts_checked = report.accounts_checked,
            repairs = report.repairs.len(),
            equation_holds,
            truncated,
            "Reconciler run finished"
        );
        Ok(report)
    }

    fn drift_alert(&self, account: &Account, repair: &AccountRepair) -> DriftAlert {
        let drift = LedgerError::ConsistencyDrift {
            account_id: repair.account_id,
            cached: repair.cached_balance,
            actual: repair.actual_balance,
        };
        warn!(
            account_id = %account.id,
            code = %account.code,
            cached_line_count = repair.cached_line_count,
            actual_line_count = repair.actual_line_count,
            error = %drift,
            "Balance drift repaired"
        );

        let severity = if repair.drift().abs() > self.settings.alert_threshold {
            AlertSeverity::High
        } else {
            AlertSeverity::Warning
        };
        DriftAlert {
            kind: AlertKind::BalanceDrift,
            severity,
            account_id: Some(account.id),
            cached_balance: Some(repair.cached_balance),
            actual_balance: Some(repair.actual_balance),
            message: format!("account {}: {drift}", account.code),
            raised_at: Utc::now(),
        }
    }

    fn publish(&self, alert: DriftAlert) {
        // No subscribers is fine; alerts are also kept in the report.
        let _ = self.alerts.send(alert);
    }

    fn lock_status(&self) -> std::sync::MutexGuard<'_, DriftStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn cheap_match(snapshot: Option<&BalanceSnapshot>, ledger: &LineTotals, account: &Account) -> bool {
    match snapshot {
        Some(snapshot) => snapshot.matches(ledger, account.normal_side()),
        None => ledger.line_count == 0,
    }
}

fn repair_of(account_id: AccountId, recomputed: &Recomputed) -> AccountRepair {
    AccountRepair {
        account_id,
        cached_balance: recomputed.previous_balance(),
        actual_balance: recomputed.current.balance,
        cached_line_count: recomputed
            .previous
            .as_ref()
            .map_or(0, |p| p.posted_line_count),
        actual_line_count: recomputed.current.posted_line_count,
    }
}
