//! Balance cache types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::AccountId;

use crate::account::Side;
use crate::ledger::types::JournalLine;
use crate::store::LineTotals;

/// Cached running balance of a leaf account.
///
/// Derived from the ledger and rebuildable at any time. `version` increases
/// by one on every write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    /// Account ID.
    pub account_id: AccountId,
    /// Balance on the account's normal side.
    pub balance: Decimal,
    /// Sum of posted debits.
    pub debit_total: Decimal,
    /// Sum of posted credits.
    pub credit_total: Decimal,
    /// Number of posted lines folded into the balance.
    pub posted_line_count: u64,
    /// Write counter.
    pub version: u64,
    /// Time of the last write.
    pub refreshed_at: DateTime<Utc>,
}

impl BalanceSnapshot {
    /// Builds a snapshot from authoritative ledger totals.
    #[must_use]
    pub fn from_totals(
        account_id: AccountId,
        normal_side: Side,
        totals: &LineTotals,
        version: u64,
        refreshed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id,
            balance: totals.balance(normal_side),
            debit_total: totals.debit,
            credit_total: totals.credit,
            posted_line_count: totals.line_count,
            version,
            refreshed_at,
        }
    }

    /// Folds a delta into the snapshot and bumps the version.
    pub fn apply(&mut self, delta: &BalanceDelta, normal_side: Side, at: DateTime<Utc>) {
        self.debit_total += delta.debit;
        self.credit_total += delta.credit;
        self.balance += normal_side.signed(delta.debit, delta.credit);
        self.posted_line_count += delta.line_count;
        self.version += 1;
        self.refreshed_at = at;
    }

    /// Returns true if the snapshot agrees with the ledger totals.
    #[must_use]
    pub fn matches(&self, totals: &LineTotals, normal_side: Side) -> bool {
        self.posted_line_count == totals.line_count
            && self.debit_total == totals.debit
            && self.credit_total == totals.credit
            && self.balance == totals.balance(normal_side)
    }

    /// Freshness marker of this snapshot.
    #[must_use]
    pub fn freshness(&self) -> Freshness {
        Freshness {
            version: self.version,
            refreshed_at: self.refreshed_at,
        }
    }
}

/// Monotonically comparable freshness marker; compares by version first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Freshness {
    /// Snapshot version.
    pub version: u64,
    /// Time of the last write.
    pub refreshed_at: DateTime<Utc>,
}

/// Change to one account produced by one posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceDelta {
    /// Account ID.
    pub account_id: AccountId,
    /// Debit amount added.
    pub debit: Decimal,
    /// Credit amount added.
    pub credit: Decimal,
    /// Number of lines added.
    pub line_count: u64,
}

/// Groups an entry's lines into one delta per account, ordered by account id.
#[must_use]
pub fn compute_deltas(lines: &[JournalLine]) -> Vec<BalanceDelta> {
    let mut grouped: BTreeMap<AccountId, BalanceDelta> = BTreeMap::new();
    for line in lines {
        let delta = grouped.entry(line.account_id).or_insert(BalanceDelta {
            account_id: line.account_id,
            debit: Decimal::ZERO,
            credit: Decimal::ZERO,
            line_count: 0,
        });
        delta.debit += line.debit_amount;
        delta.credit += line.credit_amount;
        delta.line_count += 1;
    }
    grouped.into_values().collect()
}
