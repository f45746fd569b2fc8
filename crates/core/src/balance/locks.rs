//! Per-account async locks.
//!
//! Writers of the same account are serialized; writers of disjoint accounts
//! run in parallel. Locks are always taken in ascending account-id order, so
//! two multi-account writers cannot deadlock.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tally_shared::types::AccountId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of one mutex per account, created on first use.
#[derive(Debug, Default)]
pub struct AccountLocks {
    locks: DashMap<AccountId, Arc<Mutex<()>>>,
}

impl AccountLocks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks every given account, deduplicated and in ascending id order.
    pub async fn acquire<I>(&self, accounts: I) -> AccountLockGuard
    where
        I: IntoIterator<Item = AccountId>,
    {
        let ordered: BTreeSet<AccountId> = accounts.into_iter().collect();
        // Clone the mutexes out first so no map shard is held across an await.
        let mutexes: Vec<(AccountId, Arc<Mutex<()>>)> = ordered
            .into_iter()
            .map(|id| (id, Arc::clone(self.locks.entry(id).or_default().value())))
            .collect();

        let mut guards = Vec::with_capacity(mutexes.len());
        for (id, mutex) in mutexes {
            guards.push((id, mutex.lock_owned().await));
        }
        AccountLockGuard { guards }
    }
}

/// Held account locks; released on drop.
#[derive(Debug)]
pub struct AccountLockGuard {
    guards: Vec<(AccountId, OwnedMutexGuard<()>)>,
}

impl AccountLockGuard {
    /// Returns true if this guard holds the account's lock.
    #[must_use]
    pub fn covers(&self, account_id: AccountId) -> bool {
        self.guards
            .binary_search_by(|(id, _)| id.cmp(&account_id))
            .is_ok()
    }

    /// Locked accounts in acquisition order.
    pub fn accounts(&self) -> impl Iterator<Item = AccountId> + '_ {
        self.guards.iter().map(|(id, _)| *id)
    }
}
