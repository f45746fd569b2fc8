//! Ledger facade wiring the components over one store.

use std::sync::Arc;

use tally_shared::config::{LedgerConfig, ReconcilerConfig};
use tally_shared::types::Currency;

use crate::account::AccountDirectory;
use crate::balance::{AccountLocks, BalanceProjector};
use crate::closing::ClosingEngine;
use crate::ledger::PostingEngine;
use crate::reconcile::{Reconciler, ReconcilerJob, ReconcilerSettings};
use crate::store::LedgerStore;

/// Ledger settings.
#[derive(Debug, Clone)]
pub struct LedgerSettings {
    /// Currency every amount is denominated in.
    pub currency: Currency,
    /// Code of the retained earnings account.
    pub retained_earnings_code: String,
    /// Reconciler tuning.
    pub reconciler: ReconcilerSettings,
}

impl LedgerSettings {
    /// Builds settings from the application configuration.
    #[must_use]
    pub fn from_config(ledger: &LedgerConfig, reconciler: &ReconcilerConfig) -> Self {
        Self {
            currency: ledger.currency,
            retained_earnings_code: ledger.retained_earnings_code.clone(),
            reconciler: ReconcilerSettings::from(reconciler),
        }
    }
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self::from_config(&LedgerConfig::default(), &ReconcilerConfig::default())
    }
}

/// The ledger: every component sharing one store and one set of account locks.
pub struct Ledger<S> {
    store: Arc<S>,
    directory: Arc<AccountDirectory<S>>,
    projector: Arc<BalanceProjector<S>>,
    posting: Arc<PostingEngine<S>>,
    closing: Arc<ClosingEngine<S>>,
    reconciler: Arc<Reconciler<S>>,
}

impl<S> Clone for Ledger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            directory: Arc::clone(&self.directory),
            projector: Arc::clone(&self.projector),
            posting: Arc::clone(&self.posting),
            closing: Arc::clone(&self.closing),
            reconciler: Arc::clone(&self.reconciler),
        }
    }
}

impl<S: LedgerStore> Ledger<S> {
    /// Wires the ledger over a store.
    pub fn new(store: S, settings: LedgerSettings) -> Self {
        let store = Arc::new(store);
        let locks = Arc::new(AccountLocks::new());
        let directory = Arc::new(AccountDirectory::new(Arc::clone(&store)));
        let projector = Arc::new(BalanceProjector::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            Arc::clone(&locks),
        ));
        let posting = Arc::new(PostingEngine::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            Arc::clone(&projector),
            Arc::clone(&locks),
            settings.currency,
        ));
        let closing = Arc::new(ClosingEngine::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            Arc::clone(&projector),
            Arc::clone(&posting),
            Arc::clone(&locks),
            settings.retained_earnings_code,
        ));
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            Arc::clone(&projector),
            locks,
            settings.reconciler,
        ));

        Self {
            store,
            directory,
            projector,
            posting,
            closing,
            reconciler,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Account directory.
    pub fn directory(&self) -> &AccountDirectory<S> {
        &self.directory
    }

    /// Balance projector.
    pub fn projector(&self) -> &BalanceProjector<S> {
        &self.projector
    }

    /// Posting engine.
    pub fn posting(&self) -> &PostingEngine<S> {
        &self.posting
    }

    /// Period closing engine.
    pub fn closing(&self) -> &ClosingEngine<S> {
        &self.closing
    }

    /// Reconciler.
    pub fn reconciler(&self) -> &Arc<Reconciler<S>> {
        &self.reconciler
    }

    /// Periodic job driving the reconciler.
    pub fn reconciler_job(&self) -> ReconcilerJob<S> {
        ReconcilerJob::new(Arc::clone(&self.reconciler))
    }
}
