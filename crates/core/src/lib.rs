//! Core double-entry ledger for Tally.
//!
//! This crate contains the ledger engines with no web or database
//! dependencies. Persistence goes through the [`store::LedgerStore`] trait.
//!
//! # Modules
//!
//! - `account` - Chart of accounts and the account directory
//! - `ledger` - Journal types, validation and the posting engine
//! - `balance` - Balance snapshots, account locks and the projector
//! - `closing` - Accounting periods and the closing engine
//! - `reconcile` - Drift detection, repair and the periodic job
//! - `store` - Persistence seam and the in-memory store
//! - `service` - The `Ledger` facade

pub mod account;
pub mod balance;
pub mod closing;
pub mod equation;
pub mod ledger;
pub mod reconcile;
pub mod service;
pub mod store;

pub use service::{Ledger, LedgerSettings};
