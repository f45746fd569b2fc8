//! In-memory view of the chart of accounts.
//!
//! The chart is loaded once from the store and shared behind an `Arc`; the
//! directory swaps in a fresh copy after every change.

use std::collections::{HashMap, HashSet};

use tally_shared::types::AccountId;

use super::types::{Account, AccountType, NewAccount};
use crate::ledger::LedgerError;

/// Hierarchical chart of accounts indexed by id and code.
#[derive(Debug, Clone, Default)]
pub struct ChartOfAccounts {
    accounts: HashMap<AccountId, Account>,
    by_code: HashMap<String, AccountId>,
    children: HashMap<AccountId, Vec<AccountId>>,
}

impl ChartOfAccounts {
    /// Builds the chart from a flat list of accounts.
    pub fn new(accounts: impl IntoIterator<Item = Account>) -> Self {
        let mut chart = Self::default();
        for account in accounts {
            chart.insert(account);
        }
        chart
    }

    /// Adds or replaces an account.
    pub fn insert(&mut self, account: Account) {
        if let Some(previous) = self.accounts.get(&account.id) {
            self.by_code.remove(&previous.code);
            if let Some(parent) = previous.parent_id {
                if let Some(siblings) = self.children.get_mut(&parent) {
                    siblings.retain(|id| *id != account.id);
                }
            }
        }
        if let Some(parent) = account.parent_id {
            self.children.entry(parent).or_default().push(account.id);
        }
        self.by_code.insert(account.code.clone(), account.id);
        self.accounts.insert(account.id, account);
    }

    /// Looks up an account by id.
    #[must_use]
    pub fn get(&self, id: AccountId) -> Option<&Account> {
        self.accounts.get(&id)
    }

    /// Looks up an account by code.
    #[must_use]
    pub fn by_code(&self, code: &str) -> Option<&Account> {
        self.by_code.get(code).and_then(|id| self.accounts.get(id))
    }

    /// Number of accounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Returns true if the chart has no accounts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// All accounts ordered by code.
    #[must_use]
    pub fn sorted(&self) -> Vec<&Account> {
        let mut accounts: Vec<&Account> = self.accounts.values().collect();
        accounts.sort_by(|a, b| a.code.cmp(&b.code));
        accounts
    }

    /// Direct children of an account, active or not.
    #[must_use]
    pub fn children(&self, id: AccountId) -> Vec<&Account> {
        self.children
            .get(&id)
            .map(|ids| ids.iter().filter_map(|c| self.accounts.get(c)).collect())
            .unwrap_or_default()
    }

    /// Direct active children of an account.
    #[must_use]
    pub fn active_children(&self, id: AccountId) -> Vec<&Account> {
        self.children(id)
            .into_iter()
            .filter(|a| a.is_active)
            .collect()
    }

    /// Leaf accounts of the given types ordered by code, including inactive ones.
    #[must_use]
    pub fn leaves_of_types(&self, types: &[AccountType]) -> Vec<&Account> {
        self.sorted()
            .into_iter()
            .filter(|a| !a.is_header && types.contains(&a.account_type))
            .collect()
    }

    /// All leaf accounts ordered by code.
    #[must_use]
    pub fn leaves(&self) -> Vec<&Account> {
        self.leaves_of_types(&AccountType::ALL)
    }

    /// Chain of parent ids from the direct parent up to the root.
    #[must_use]
    pub fn ancestors(&self, id: AccountId) -> Vec<AccountId> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut current = self.get(id).and_then(|a| a.parent_id);
        while let Some(parent) = current {
            if !seen.insert(parent) {
                break;
            }
            chain.push(parent);
            current = self.get(parent).and_then(|a| a.parent_id);
        }
        chain
    }

    /// Checks that a new account fits into the chart.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::DuplicateAccountCode` if the code is taken, or
    /// `LedgerError::InvalidAccount` if the code is blank or the parent is
    /// missing, not a header, or of a different type.
    pub fn validate_new(&self, new: &NewAccount) -> Result<(), LedgerError> {
        let code = new.code.trim();
        if code.is_empty() {
            return Err(LedgerError::InvalidAccount(
                "account code cannot be empty".to_string(),
            ));
        }
        if new.name.trim().is_empty() {
            return Err(LedgerError::InvalidAccount(
                "account name cannot be empty".to_string(),
            ));
        }
        if self.by_code(code).is_some() {
            return Err(LedgerError::DuplicateAccountCode(code.to_string()));
        }

        if let Some(parent_id) = new.parent_id {
            let parent = self
                .get(parent_id)
                .ok_or(LedgerError::AccountNotFound(parent_id))?;
            if !parent.is_header {
                return Err(LedgerError::InvalidAccount(format!(
                    "parent account {} is not a header",
                    parent.code
                )));
            }
            if parent.account_type != new.account_type {
                return Err(LedgerError::InvalidAccount(format!(
                    "parent account {} is {}, child is {}",
                    parent.code, parent.account_type, new.account_type
                )));
            }
        }

        Ok(())
    }
}
