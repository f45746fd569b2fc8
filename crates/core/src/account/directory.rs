//! Account directory: the read-mostly chart of accounts backed by the store.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use rust_decimal::Decimal;
use tally_shared::types::AccountId;
use tracing::info;

use super::chart::ChartOfAccounts;
use super::seed::SeedAccount;
use super::types::{Account, NewAccount};
use crate::ledger::LedgerError;
use crate::store::LedgerStore;

/// Chart of accounts with a shared in-process copy.
///
/// Readers get an `Arc<ChartOfAccounts>` snapshot; every mutation goes to the
/// store first and then reloads the copy.
pub struct AccountDirectory<S> {
    store: Arc<S>,
    chart: RwLock<Option<Arc<ChartOfAccounts>>>,
}

impl<S: LedgerStore> AccountDirectory<S> {
    /// Creates a directory over the given store. Nothing is loaded until first use.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            chart: RwLock::new(None),
        }
    }

    /// Reloads the chart from the store.
    pub async fn load(&self) -> Result<Arc<ChartOfAccounts>, LedgerError> {
        let accounts = self.store.list_accounts().await?;
        let chart = Arc::new(ChartOfAccounts::new(accounts));
        *self.chart.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&chart));
        Ok(chart)
    }

    /// Returns the current chart, loading it on first use.
    pub async fn chart(&self) -> Result<Arc<ChartOfAccounts>, LedgerError> {
        let cached = self
            .chart
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match cached {
            Some(chart) => Ok(chart),
            None => self.load().await,
        }
    }

    /// Looks up a single account.
    pub async fn account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.chart()
            .await?
            .get(id)
            .cloned()
            .ok_or(LedgerError::AccountNotFound(id))
    }

    /// Adds an account to the chart.
    pub async fn create_account(&self, new: NewAccount) -> Result<Account, LedgerError> {
        let chart = self.chart().await?;
        chart.validate_new(&new)?;

        let account = Account {
            id: AccountId::new(),
            code: new.code.trim().to_string(),
            name: new.name.trim().to_string(),
            account_type: new.account_type,
            parent_id: new.parent_id,
            is_header: new.is_header,
            is_active: true,
        };
        self.store.insert_account(account.clone()).await?;
        self.load().await?;

        info!(
            account_id = %account.id,
            code = %account.code,
            account_type = %account.account_type,
            "Account created"
        );
        Ok(account)
    }

    /// Deactivates an account so it no longer accepts postings.
    ///
    /// Headers must have no active children and leaves must have a zero
    /// balance in the ledger.
    pub async fn deactivate(&self, id: AccountId) -> Result<Account, LedgerError> {
        let chart = self.chart().await?;
        let account = chart.get(id).ok_or(LedgerError::AccountNotFound(id))?;
        if !account.is_active {
            return Ok(account.clone());
        }

        if account.is_header {
            if !chart.active_children(id).is_empty() {
                return Err(LedgerError::InvalidAccount(format!(
                    "header account {} still has active children",
                    account.code
                )));
            }
        } else {
            let totals = self.store.account_line_totals(id, None).await?;
            if totals.balance(account.normal_side()) != Decimal::ZERO {
                return Err(LedgerError::InvalidAccount(format!(
                    "account {} has a non-zero balance",
                    account.code
                )));
            }
        }

        let updated = self.store.set_account_active(id, false).await?;
        self.load().await?;
        info!(account_id = %id, code = %updated.code, "Account deactivated");
        Ok(updated)
    }

    /// Inserts every seed account whose code is not in the chart yet.
    ///
    /// Returns the number of accounts created. Running it twice is a no-op.
    pub async fn seed(&self, seeds: &[SeedAccount]) -> Result<usize, LedgerError> {
        let chart = self.chart().await?;
        let mut ids: HashMap<&str, AccountId> = HashMap::new();
        let mut created = 0;

        for seed in seeds {
            if let Some(existing) = chart.by_code(seed.code) {
                ids.insert(seed.code, existing.id);
                continue;
            }

            let parent_id = match seed.parent_code {
                Some(code) => Some(
                    ids.get(code)
                        .copied()
                        .or_else(|| chart.by_code(code).map(|a| a.id))
                        .ok_or_else(|| {
                            LedgerError::InvalidAccount(format!(
                                "seed parent {code} for {} is missing",
                                seed.code
                            ))
                        })?,
                ),
                None => None,
            };

            let account = Account {
                id: AccountId::new(),
                code: seed.code.to_string(),
                name: seed.name.to_string(),
                account_type: seed.account_type,
                parent_id,
                is_header: seed.is_header,
                is_active: true,
            };
            self.store.insert_account(account.clone()).await?;
            ids.insert(seed.code, account.id);
            created += 1;
        }

        self.load().await?;
        info!(created, "Chart of accounts seeded");
        Ok(created)
    }
}
