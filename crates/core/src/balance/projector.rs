//! Balance projector: the only writer of the balance cache.
//!
//! `apply_delta` is the O(1) fast path run on every posting. `recompute` is
//! the authoritative slow path: it rescans the account's posted lines and
//! overwrites the snapshot. Both require the account lock; the `*_held`
//! variants take a guard from a caller that already owns it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tally_shared::types::AccountId;
use tracing::debug;

use super::locks::{AccountLockGuard, AccountLocks};
use super::rollup::rollup_totals;
use super::snapshot::{BalanceDelta, BalanceSnapshot, Freshness};
use crate::account::{Account, AccountDirectory};
use crate::ledger::LedgerError;
use crate::store::LedgerStore;

/// Result of an authoritative recompute.
#[derive(Debug, Clone)]
pub struct Recomputed {
    /// Snapshot written from the ledger.
    pub current: BalanceSnapshot,
    /// Snapshot that was replaced, if any.
    pub previous: Option<BalanceSnapshot>,
}

impl Recomputed {
    /// Returns true if the replaced snapshot disagreed with the ledger.
    #[must_use]
    pub fn drifted(&self) -> bool {
        match &self.previous {
            Some(previous) => {
                previous.balance != self.current.balance
                    || previous.posted_line_count != self.current.posted_line_count
            }
            None => self.current.posted_line_count > 0,
        }
    }

    /// Cached balance before the recompute; zero when there was no snapshot.
    #[must_use]
    pub fn previous_balance(&self) -> Decimal {
        self.previous
            .as_ref()
            .map_or(Decimal::ZERO, |p| p.balance)
    }
}

/// Outcome of checking one account under its lock.
#[derive(Debug, Clone)]
pub enum Verification {
    /// Snapshot matches the ledger; nothing was written.
    Consistent,
    /// Snapshot was rebuilt from the ledger.
    Repaired(Recomputed),
}

/// Best-known cached balance of an account.
#[derive(Debug, Clone, Serialize)]
pub struct CachedBalance {
    /// Account ID.
    pub account_id: AccountId,
    /// Balance on the normal side; for headers the rollup of active children.
    pub balance: Decimal,
    /// Freshness of the underlying snapshot; for headers the stalest leaf.
    /// `None` when no snapshot exists yet.
    pub freshness: Option<Freshness>,
}

/// An account with its cached balance and rollup total.
#[derive(Debug, Clone, Serialize)]
pub struct AccountBalanceView {
    /// The account.
    pub account: Account,
    /// Own balance. Zero for headers.
    pub balance: Decimal,
    /// Own balance for leaves, sum of active children for headers.
    pub rollup_total: Decimal,
    /// Freshness of the leaf snapshot.
    pub freshness: Option<Freshness>,
}

/// Maintains per-account balance snapshots.
pub struct BalanceProjector<S> {
    store: Arc<S>,
    directory: Arc<AccountDirectory<S>>,
    locks: Arc<AccountLocks>,
}

impl<S: LedgerStore> BalanceProjector<S> {
    /// Creates a projector.
    pub fn new(store: Arc<S>, directory: Arc<AccountDirectory<S>>, locks: Arc<AccountLocks>) -> Self {
        Self {
            store,
            directory,
            locks,
        }
    }

    /// Adjusts the cached balance by a posting's delta.
    pub async fn apply_delta(&self, delta: &BalanceDelta) -> Result<BalanceSnapshot, LedgerError> {
        let guard = self.locks.acquire([delta.account_id]).await;
        self.apply_delta_held(delta, &guard).await
    }

    pub(crate) async fn apply_delta_held(
        &self,
        delta: &BalanceDelta,
        guard: &AccountLockGuard,
    ) -> Result<BalanceSnapshot, LedgerError> {
        debug_assert!(guard.covers(delta.account_id));
        let account = self.leaf(delta.account_id).await?;

        let incremented = self
            .store
            .increment_snapshot(delta, account.normal_side(), Utc::now())
            .await?;
        match incremented {
            Some(snapshot) => Ok(snapshot),
            // First posting to the account: build the snapshot from the ledger.
            None => Ok(self.recompute_held(delta.account_id, guard).await?.current),
        }
    }

    /// Rebuilds an account's snapshot from its posted lines.
    pub async fn recompute(&self, account_id: AccountId) -> Result<Recomputed, LedgerError> {
        let guard = self.locks.acquire([account_id]).await;
        self.recompute_held(account_id, &guard).await
    }

    pub(crate) async fn recompute_held(
        &self,
        account_id: AccountId,
        guard: &AccountLockGuard,
    ) -> Result<Recomputed, LedgerError> {
        debug_assert!(guard.covers(account_id));
        let account = self.leaf(account_id).await?;

        let previous = self.store.load_snapshot(account_id).await?;
        let totals = self.store.account_line_totals(account_id, None).await?;
        let version = previous.as_ref().map_or(1, |p| p.version + 1);
        let current = BalanceSnapshot::from_totals(
            account_id,
            account.normal_side(),
            &totals,
            version,
            Utc::now(),
        );
        self.store.save_snapshot(current.clone()).await?;

        debug!(
            account_id = %account_id,
            balance = %current.balance,
            version = current.version,
            "Balance recomputed"
        );
        Ok(Recomputed { current, previous })
    }

    /// Compares the snapshot with the ledger under the lock and repairs it on mismatch.
    pub(crate) async fn verify_held(
        &self,
        account_id: AccountId,
        guard: &AccountLockGuard,
    ) -> Result<Verification, LedgerError> {
        debug_assert!(guard.covers(account_id));
        let account = self.leaf(account_id).await?;

        let snapshot = self.store.load_snapshot(account_id).await?;
        let totals = self.store.account_line_totals(account_id, None).await?;
        let consistent = match &snapshot {
            Some(snapshot) => snapshot.matches(&totals, account.normal_side()),
            None => totals.line_count == 0,
        };
        if consistent {
            return Ok(Verification::Consistent);
        }

        Ok(Verification::Repaired(
            self.recompute_held(account_id, guard).await?,
        ))
    }

    /// Authoritative balance of a leaf through a date. Never touches the cache.
    pub async fn balance_through(
        &self,
        account_id: AccountId,
        date: NaiveDate,
    ) -> Result<Decimal, LedgerError> {
        let account = self.leaf(account_id).await?;
        let totals = self
            .store
            .account_line_totals(account_id, Some(date))
            .await?;
        Ok(totals.balance(account.normal_side()))
    }

    /// Authoritative balance. Leaves are recomputed; headers sum their
    /// recomputed active descendants.
    pub async fn audit_balance(&self, account_id: AccountId) -> Result<Decimal, LedgerError> {
        let chart = self.directory.chart().await?;
        let account = chart
            .get(account_id)
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        if !account.is_header {
            return Ok(self.recompute(account_id).await?.current.balance);
        }

        let mut leaf_balances = HashMap::new();
        let mut pending = vec![account_id];
        while let Some(id) = pending.pop() {
            for child in chart.active_children(id) {
                if child.is_header {
                    pending.push(child.id);
                } else if !leaf_balances.contains_key(&child.id) {
                    let balance = self.recompute(child.id).await?.current.balance;
                    leaf_balances.insert(child.id, balance);
                }
            }
        }
        Ok(rollup_totals(&chart, &leaf_balances)
            .get(&account_id)
            .copied()
            .unwrap_or_default())
    }

    /// Best-known cached balance with its freshness marker.
    pub async fn cached_balance(&self, account_id: AccountId) -> Result<CachedBalance, LedgerError> {
        let chart = self.directory.chart().await?;
        let account = chart
            .get(account_id)
            .ok_or(LedgerError::AccountNotFound(account_id))?;

        if !account.is_header {
            let snapshot = self.store.load_snapshot(account_id).await?;
            return Ok(CachedBalance {
                account_id,
                balance: snapshot.as_ref().map_or(Decimal::ZERO, |s| s.balance),
                freshness: snapshot.as_ref().map(BalanceSnapshot::freshness),
            });
        }

        let views = self.account_balances().await?;
        let mut leaves = HashSet::new();
        let mut pending = vec![account_id];
        while let Some(id) = pending.pop() {
            for child in chart.active_children(id) {
                if child.is_header {
                    pending.push(child.id);
                } else {
                    leaves.insert(child.id);
                }
            }
        }
        let balance = views
            .iter()
            .find(|v| v.account.id == account_id)
            .map_or(Decimal::ZERO, |v| v.rollup_total);
        let freshness = views
            .iter()
            .filter(|v| leaves.contains(&v.account.id))
            .filter_map(|v| v.freshness)
            .min();
        Ok(CachedBalance {
            account_id,
            balance,
            freshness,
        })
    }

    /// Every account ordered by code with cached balances and rollup totals.
    pub async fn account_balances(&self) -> Result<Vec<AccountBalanceView>, LedgerError> {
        let chart = self.directory.chart().await?;
        let snapshots: HashMap<AccountId, BalanceSnapshot> = self
            .store
            .list_snapshots()
            .await?
            .into_iter()
            .map(|s| (s.account_id, s))
            .collect();
        let leaf_balances: HashMap<AccountId, Decimal> = snapshots
            .iter()
            .map(|(id, s)| (*id, s.balance))
            .collect();
        let rollups = rollup_totals(&chart, &leaf_balances);

        Ok(chart
            .sorted()
            .into_iter()
            .map(|account| {
                let snapshot = (!account.is_header)
                    .then(|| snapshots.get(&account.id))
                    .flatten();
                AccountBalanceView {
                    account: account.clone(),
                    balance: snapshot.map_or(Decimal::ZERO, |s| s.balance),
                    rollup_total: rollups.get(&account.id).copied().unwrap_or_default(),
                    freshness: snapshot.map(BalanceSnapshot::freshness),
                }
            })
            .collect())
    }

    async fn leaf(&self, account_id: AccountId) -> Result<Account, LedgerError> {
        let account = self.directory.account(account_id).await?;
        if account.is_header {
            return Err(LedgerError::HeaderAccount(account_id));
        }
        Ok(account)
    }
}
